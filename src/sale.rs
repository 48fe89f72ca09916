//! Purchases and their progression to payout or refund.
//!
//! A sale snapshots the listing's seller and price when it is created and is
//! never deleted. Funds are held in escrow from the start; completion pays the
//! seller out, cancellation refunds the buyer.
use sled::Transactional;
use tracing::{info, warn};

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::listing::Listing;
use crate::reputation::{SellerProfile, tx_update_profile};
use crate::settlement::{Settlement, SettlementPolicy};
use crate::store::{
    Store, TxResult, reject, tx_check, tx_get, tx_get_ref, tx_put, tx_put_ref, tx_require,
};
use crate::types::{FinancialStatus, ListingStatus, SaleStatus, TimeStamp, VerificationStatus};
use crate::utils::{SALE_HRP, new_uuid_to_bech32};
use crate::verification::Verification;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub listing_id: String,
    #[n(2)]
    pub buyer_id: String,
    #[n(3)]
    pub seller_id: String,
    #[n(4)]
    pub sale_price_cents: u64,
    #[n(5)]
    pub courier_costs_cents: u64,
    #[n(6)]
    pub commission_cents: u64,
    #[n(7)]
    pub seller_payout_cents: u64,
    #[n(8)]
    pub status: SaleStatus,
    #[n(9)]
    pub financial_status: FinancialStatus,
    #[n(10)]
    pub created_at: TimeStamp,
    #[n(11)]
    pub completed_at: Option<TimeStamp>,
}

impl Sale {
    /// Buyer, seller and admins may see a sale.
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_admin() || self.buyer_id == user.id || self.seller_id == user.id
    }

    /// The party on the other side of the sale from `user_id`, if `user_id` took part.
    pub fn counterparty_of(&self, user_id: &str) -> Option<&str> {
        if self.buyer_id == user_id {
            Some(&self.seller_id)
        } else if self.seller_id == user_id {
            Some(&self.buyer_id)
        } else {
            None
        }
    }

    pub fn settlement(&self) -> Settlement {
        Settlement {
            sale_price_cents: self.sale_price_cents,
            commission_cents: self.commission_cents,
            seller_payout_cents: self.seller_payout_cents,
            courier_costs_cents: self.courier_costs_cents,
        }
    }
}

impl SaleStatus {
    /// Legal moves for the admin-driven sale lifecycle.
    pub fn can_advance_to(&self, next: SaleStatus) -> bool {
        use SaleStatus::*;
        match (*self, next) {
            (Initiated, PendingVerification | Confirmed) => true,
            (PendingVerification, Confirmed) => true,
            (Initiated | PendingVerification | Confirmed, Dispatched) => true,
            (Dispatched, Delivered) | (Delivered, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

pub(crate) fn visible_sale(sale: Sale, caller: &User) -> MarketResult<Sale> {
    if !sale.is_visible_to(caller) {
        return Err(MarketError::Forbidden(format!(
            "sale {} is only visible to its buyer, seller and admins",
            sale.id
        )));
    }
    Ok(sale)
}

fn require_admin(caller: &User) -> MarketResult<()> {
    if !caller.is_admin() {
        return Err(MarketError::Forbidden("only admins can progress sales".into()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SaleService {
    store: Store,
    policy: SettlementPolicy,
}

impl SaleService {
    pub fn new(store: Store, policy: SettlementPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &SettlementPolicy {
        &self.policy
    }

    /// Buy a live listing.
    ///
    /// The listing status check, the verification snapshot and the sale insert
    /// share one transaction, and the listing is marked as having an open sale,
    /// so concurrent purchases of the same listing produce a single sale.
    pub fn purchase(
        &self,
        caller: &User,
        listing_id: &str,
        courier_costs_cents: Option<u64>,
    ) -> MarketResult<Sale> {
        let sale_id = new_uuid_to_bech32(SALE_HRP)?;
        let courier_costs_cents = courier_costs_cents.unwrap_or(0);
        let store = &self.store;

        let result = (
            &store.listings,
            &store.verifications,
            &store.sales,
            &store.open_sales,
            &store.listing_sales,
        )
            .transaction(
                |(listings, verifications, sales, open_sales, listing_sales)| -> TxResult<Sale> {
                    let listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
                    if listing.is_owned_by(caller) {
                        return reject(MarketError::Forbidden("cannot purchase own listing".into()));
                    }
                    if listing.status != ListingStatus::Live {
                        return reject(MarketError::InvalidState(format!(
                            "listing {listing_id} is not for sale, it is {:?}",
                            listing.status
                        )));
                    }
                    if let Some(open_sale) = tx_get_ref(open_sales, listing_id)? {
                        return reject(MarketError::InvalidState(format!(
                            "listing {listing_id} is not for sale, sale {open_sale} is in progress"
                        )));
                    }

                    let verified = tx_get::<Verification>(verifications, listing_id)?
                        .is_some_and(|v| v.status == VerificationStatus::Verified);
                    let split =
                        tx_check(self.policy.settle(listing.price_cents, courier_costs_cents))?;

                    let sale = Sale {
                        id: sale_id.clone(),
                        listing_id: listing.id.clone(),
                        buyer_id: caller.id.clone(),
                        seller_id: listing.seller_id.clone(),
                        sale_price_cents: split.sale_price_cents,
                        courier_costs_cents: split.courier_costs_cents,
                        commission_cents: split.commission_cents,
                        seller_payout_cents: split.seller_payout_cents,
                        status: if verified {
                            SaleStatus::Confirmed
                        } else {
                            SaleStatus::PendingVerification
                        },
                        financial_status: FinancialStatus::HeldInEscrow,
                        created_at: TimeStamp::now(),
                        completed_at: None,
                    };
                    tx_put(sales, &sale.id, &sale)?;
                    tx_put_ref(open_sales, listing_id, &sale.id)?;
                    tx_put_ref(listing_sales, listing_id, &sale.id)?;
                    Ok(sale)
                },
            );

        let sale = match result {
            Ok(sale) => sale,
            Err(err) => {
                let err = MarketError::from(err);
                warn!(listing_id, buyer_id = %caller.id, error = %err, "purchase refused");
                return Err(err);
            }
        };

        info!(
            sale_id = %sale.id,
            listing_id,
            buyer_id = %sale.buyer_id,
            status = ?sale.status,
            price = sale.sale_price_cents,
            commission = sale.commission_cents,
            payout = sale.seller_payout_cents,
            "sale created, funds held in escrow"
        );
        Ok(sale)
    }

    /// Move a sale along its lifecycle. Completion pays out and counts towards
    /// the seller's total sales; cancellation refunds and reopens the listing.
    pub fn advance_sale(
        &self,
        caller: &User,
        sale_id: &str,
        next: SaleStatus,
    ) -> MarketResult<Sale> {
        require_admin(caller)?;
        let store = &self.store;

        let trees = (&store.sales, &store.open_sales, &store.profiles);
        let (sale, previous, profile) = trees.transaction(
            |(sales, open_sales, profiles)| -> TxResult<(Sale, SaleStatus, Option<SellerProfile>)> {
                let mut sale: Sale = tx_require(sales, Entity::Sale, sale_id)?;
                let previous = sale.status;
                if !previous.can_advance_to(next) {
                    return reject(MarketError::InvalidState(format!(
                        "sale {sale_id} cannot move from {previous:?} to {next:?}"
                    )));
                }

                sale.status = next;
                let mut profile = None;
                match next {
                    SaleStatus::Completed => {
                        sale.financial_status = FinancialStatus::PaidOut;
                        sale.completed_at = Some(TimeStamp::now());
                        profile = Some(tx_update_profile(profiles, &sale.seller_id, |p| {
                            p.total_sales += 1
                        })?);
                    }
                    SaleStatus::Cancelled => {
                        sale.financial_status = FinancialStatus::Refunded;
                        let open_sale = tx_get_ref(open_sales, &sale.listing_id)?;
                        if open_sale.as_deref() == Some(sale.id.as_str()) {
                            open_sales.remove(sale.listing_id.as_bytes())?;
                        }
                    }
                    _ => {}
                }
                tx_put(sales, &sale.id, &sale)?;
                Ok((sale, previous, profile))
            },
        )?;

        info!(
            sale_id,
            from = ?previous,
            to = ?sale.status,
            financial_status = ?sale.financial_status,
            admin_id = %caller.id,
            "sale transitioned"
        );
        if let Some(profile) = profile {
            info!(
                seller_id = %profile.user_id,
                total_sales = profile.total_sales,
                "seller payout released"
            );
        }
        Ok(sale)
    }

    /// HELD_IN_ESCROW -> SETTLED once the buyer has the item.
    pub fn settle_funds(&self, caller: &User, sale_id: &str) -> MarketResult<Sale> {
        require_admin(caller)?;
        let sale = self.store.sales.transaction(|sales| -> TxResult<Sale> {
            let mut sale: Sale = tx_require(sales, Entity::Sale, sale_id)?;
            if sale.status != SaleStatus::Delivered {
                return reject(MarketError::InvalidState(format!(
                    "sale {sale_id} is {:?}, funds settle after delivery",
                    sale.status
                )));
            }
            if sale.financial_status != FinancialStatus::HeldInEscrow {
                return reject(MarketError::InvalidState(format!(
                    "sale {sale_id} funds are {:?}, not held in escrow",
                    sale.financial_status
                )));
            }
            sale.financial_status = FinancialStatus::Settled;
            tx_put(sales, &sale.id, &sale)?;
            Ok(sale)
        })?;

        info!(sale_id, admin_id = %caller.id, "escrow settled");
        Ok(sale)
    }

    pub fn get_sale(&self, caller: &User, sale_id: &str) -> MarketResult<Sale> {
        let sale: Sale = self.store.require(&self.store.sales, Entity::Sale, sale_id)?;
        visible_sale(sale, caller)
    }

    /// Sales where the caller is the buyer, newest first.
    pub fn purchases(&self, caller: &User) -> MarketResult<Vec<Sale>> {
        self.sales_where(|s| s.buyer_id == caller.id)
    }

    /// Sales where the caller is the seller, newest first.
    pub fn sales(&self, caller: &User) -> MarketResult<Vec<Sale>> {
        self.sales_where(|s| s.seller_id == caller.id)
    }

    /// Every sale, newest first. Admin only.
    pub fn all_sales(&self, caller: &User) -> MarketResult<Vec<Sale>> {
        require_admin(caller)?;
        self.sales_where(|_| true)
    }

    fn sales_where(&self, keep: impl Fn(&Sale) -> bool) -> MarketResult<Vec<Sale>> {
        let mut sales = self.store.scan(&self.store.sales, keep)?;
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sales)
    }
}
