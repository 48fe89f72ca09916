//! Listings a user saved for later.
use sled::Transactional;
use tracing::info;

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::listing::Listing;
use crate::store::{Store, TxResult, reject, tx_put, tx_require};
use crate::types::TimeStamp;
use crate::utils::pair_key;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Favourite {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub listing_id: String,
    #[n(2)]
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone)]
pub struct FavouriteService {
    store: Store,
}

impl FavouriteService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn add_favourite(&self, caller: &User, listing_id: &str) -> MarketResult<Favourite> {
        let key = pair_key(&caller.id, listing_id);
        let store = &self.store;

        let favourite = (&store.listings, &store.favourites).transaction(
            |(listings, favourites)| -> TxResult<Favourite> {
                tx_require::<Listing>(listings, Entity::Listing, listing_id)?;
                if favourites.get(key.as_bytes())?.is_some() {
                    return reject(MarketError::Conflict(format!(
                        "listing {listing_id} is already a favourite"
                    )));
                }
                let favourite = Favourite {
                    user_id: caller.id.clone(),
                    listing_id: listing_id.to_string(),
                    created_at: TimeStamp::now(),
                };
                tx_put(favourites, &key, &favourite)?;
                Ok(favourite)
            },
        )?;

        info!(user_id = %caller.id, listing_id, "favourite added");
        Ok(favourite)
    }

    /// Returns whether there was anything to remove.
    pub fn remove_favourite(&self, caller: &User, listing_id: &str) -> MarketResult<bool> {
        let removed = self
            .store
            .favourites
            .remove(pair_key(&caller.id, listing_id).as_bytes())?
            .is_some();
        if removed {
            info!(user_id = %caller.id, listing_id, "favourite removed");
        }
        Ok(removed)
    }

    pub fn is_favourite(&self, caller: &User, listing_id: &str) -> MarketResult<bool> {
        Ok(self
            .store
            .favourites
            .contains_key(pair_key(&caller.id, listing_id).as_bytes())?)
    }

    /// The caller's saved listings, newest favourite first. Listings deleted
    /// since they were saved are skipped.
    pub fn favourites(&self, caller: &User) -> MarketResult<Vec<(Favourite, Listing)>> {
        let mut saved: Vec<Favourite> = self
            .store
            .scan_prefix(&self.store.favourites, &pair_key(&caller.id, ""))?;
        saved.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut result = Vec::with_capacity(saved.len());
        for favourite in saved {
            if let Some(listing) = self
                .store
                .get::<Listing>(&self.store.listings, &favourite.listing_id)?
            {
                result.push((favourite, listing));
            }
        }
        Ok(result)
    }
}
