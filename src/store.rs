//! Sled-backed storage shared by all services.
//!
//! One tree per record type plus a few index trees. Records are CBOR encoded.
//! State transitions go through sled transactions over the trees they touch,
//! the `tx_*` helpers below are the in-transaction counterparts of the plain
//! reads and writes.
use std::path::Path;
use std::sync::Arc;

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Tree;
use tracing::debug;

use crate::error::{Entity, MarketError, MarketResult};

const USERS_TREE: &str = "users";
const EXTERNAL_IDS_TREE: &str = "users_by_external_id";
const LISTINGS_TREE: &str = "listings";
const VERIFICATIONS_TREE: &str = "verifications";
const SALES_TREE: &str = "sales";
const OPEN_SALES_TREE: &str = "open_sale_by_listing";
const LISTING_SALES_TREE: &str = "last_sale_by_listing";
const PROFILES_TREE: &str = "seller_profiles";
const REVIEWS_TREE: &str = "reviews";
const FAVOURITES_TREE: &str = "favourites";
const SHIPMENTS_TREE: &str = "shipments";
const SHIPMENT_LEGS_TREE: &str = "shipment_by_sale_leg";

pub type TxResult<T> = ConflictableTransactionResult<T, MarketError>;

#[derive(Debug, Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    pub(crate) users: Tree,
    /// external id -> user id
    pub(crate) external_ids: Tree,
    pub(crate) listings: Tree,
    /// keyed by listing id, the relation is 1:1
    pub(crate) verifications: Tree,
    pub(crate) sales: Tree,
    /// listing id -> id of its sale that is not cancelled
    pub(crate) open_sales: Tree,
    /// listing id -> id of its latest sale, never cleared
    pub(crate) listing_sales: Tree,
    pub(crate) profiles: Tree,
    pub(crate) reviews: Tree,
    /// `user/listing` -> favourite
    pub(crate) favourites: Tree,
    pub(crate) shipments: Tree,
    /// `sale/direction` -> shipment id
    pub(crate) shipment_legs: Tree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> MarketResult<Self> {
        Ok(Self {
            users: instance.open_tree(USERS_TREE)?,
            external_ids: instance.open_tree(EXTERNAL_IDS_TREE)?,
            listings: instance.open_tree(LISTINGS_TREE)?,
            verifications: instance.open_tree(VERIFICATIONS_TREE)?,
            sales: instance.open_tree(SALES_TREE)?,
            open_sales: instance.open_tree(OPEN_SALES_TREE)?,
            listing_sales: instance.open_tree(LISTING_SALES_TREE)?,
            profiles: instance.open_tree(PROFILES_TREE)?,
            reviews: instance.open_tree(REVIEWS_TREE)?,
            favourites: instance.open_tree(FAVOURITES_TREE)?,
            shipments: instance.open_tree(SHIPMENTS_TREE)?,
            shipment_legs: instance.open_tree(SHIPMENT_LEGS_TREE)?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> MarketResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening marketplace store");
        Self::new(Arc::new(sled::open(path)?))
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.instance.flush()?;
        Ok(())
    }

    pub(crate) fn get<T>(&self, tree: &Tree, key: &str) -> MarketResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn require<T>(&self, tree: &Tree, entity: Entity, key: &str) -> MarketResult<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.get(tree, key)?
            .ok_or_else(|| MarketError::not_found(entity, key))
    }

    pub(crate) fn put<T>(&self, tree: &Tree, key: &str, value: &T) -> MarketResult<()>
    where
        T: minicbor::Encode<()>,
    {
        tree.insert(key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Decode every record in a tree that matches the predicate.
    pub(crate) fn scan<T>(&self, tree: &Tree, keep: impl Fn(&T) -> bool) -> MarketResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut records = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item?;
            let record: T = decode(&bytes)?;
            if keep(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Decode every record stored under keys starting with `prefix`.
    pub(crate) fn scan_prefix<T>(&self, tree: &Tree, prefix: &str) -> MarketResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut records = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            records.push(decode(&bytes)?);
        }
        Ok(records)
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> MarketResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> MarketResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

/// Abort the surrounding transaction with `err`.
pub(crate) fn reject<T>(err: MarketError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Lift a fallible check into the surrounding transaction.
pub(crate) fn tx_check<T>(result: MarketResult<T>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

pub(crate) fn tx_get<T>(tree: &TransactionalTree, key: &str) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => tx_check(decode(&bytes)).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn tx_require<T>(tree: &TransactionalTree, entity: Entity, key: &str) -> TxResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx_get(tree, key)? {
        Some(record) => Ok(record),
        None => reject(MarketError::not_found(entity, key)),
    }
}

pub(crate) fn tx_put<T>(tree: &TransactionalTree, key: &str, value: &T) -> TxResult<()>
where
    T: minicbor::Encode<()>,
{
    let bytes = tx_check(encode(value))?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

/// Read a plain string index entry, such as a user id stored under an external id.
pub(crate) fn tx_get_ref(tree: &TransactionalTree, key: &str) -> TxResult<Option<String>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(value) => Ok(Some(value)),
            Err(err) => reject(MarketError::Internal(format!("corrupt index entry {key}: {err}"))),
        },
        None => Ok(None),
    }
}

pub(crate) fn tx_put_ref(tree: &TransactionalTree, key: &str, value: &str) -> TxResult<()> {
    tree.insert(key.as_bytes(), value.as_bytes())?;
    Ok(())
}

impl Store {
    pub(crate) fn get_ref(&self, tree: &Tree, key: &str) -> MarketResult<Option<String>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|err| MarketError::Internal(format!("corrupt index entry {key}: {err}"))),
            None => Ok(None),
        }
    }

    /// Values of an index tree under `prefix`, as strings.
    pub(crate) fn scan_refs(&self, tree: &Tree, prefix: &str) -> MarketResult<Vec<String>> {
        let mut refs = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            let value = String::from_utf8(bytes.to_vec())
                .map_err(|err| MarketError::Internal(format!("corrupt index entry: {err}")))?;
            refs.push(value);
        }
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sled::Transactional;
    use tempfile::tempdir;

    #[derive(minicbor::Encode, minicbor::Decode, Debug, PartialEq)]
    struct Sample {
        #[n(0)]
        name: String,
        #[n(1)]
        count: u64,
    }

    #[test]
    fn aborted_transaction_writes_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = Store::open(dir.path().join("abort.db"))?;

        let result: Result<(), MarketError> = (&store.listings, &store.sales)
            .transaction(|(listings, sales)| -> TxResult<()> {
                tx_put(listings, "a", &Sample { name: "a".into(), count: 1 })?;
                tx_put(sales, "b", &Sample { name: "b".into(), count: 2 })?;
                reject(MarketError::Conflict("stop".into()))
            })
            .map_err(MarketError::from);

        assert!(matches!(result, Err(MarketError::Conflict(_))));
        assert!(store.get::<Sample>(&store.listings, "a")?.is_none());
        assert!(store.get::<Sample>(&store.sales, "b")?.is_none());
        Ok(())
    }

    #[test]
    fn scan_prefix_only_returns_owned_records() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = Store::open(dir.path().join("prefix.db"))?;

        store.put(&store.favourites, "u1/l1", &Sample { name: "x".into(), count: 1 })?;
        store.put(&store.favourites, "u1/l2", &Sample { name: "y".into(), count: 2 })?;
        store.put(&store.favourites, "u2/l1", &Sample { name: "z".into(), count: 3 })?;

        let owned: Vec<Sample> = store.scan_prefix(&store.favourites, "u1/")?;
        assert_eq!(owned.len(), 2);
        Ok(())
    }
}
