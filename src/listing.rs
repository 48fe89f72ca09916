//! Listing lifecycle.
//!
//! ```text
//! DRAFT -> SUBMITTED -> (UNDER_ADMIN_REVIEW) -> APPROVED -> LIVE
//!                                            \-> REJECTED -> DRAFT (revise)
//! ```
//!
//! Approval is two-step: an admin approves, then the owner or an admin
//! publishes. Only `LIVE` listings can be bought.
use sled::Transactional;
use tracing::{debug, info};

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::store::{Store, TxResult, reject, tx_check, tx_get_ref, tx_put, tx_require};
use crate::types::{ListingStatus, TimeStamp};
use crate::utils::{LISTING_HRP, new_uuid_to_bech32, non_blank};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 5_000;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub seller_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub price_cents: u64,
    #[n(5)]
    pub seller_location: Option<String>,
    #[n(6)]
    pub status: ListingStatus,
    #[n(7)]
    pub rejection_feedback: Option<String>,
    #[n(8)]
    pub created_at: TimeStamp,
    #[n(9)]
    pub updated_at: TimeStamp,
}

impl Listing {
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.seller_id == user.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price_cents: u64,
    pub seller_location: Option<String>,
    /// Skip the draft stage
    pub submit: bool,
}

/// Partial edit of a listing. `None` leaves a field untouched; for the
/// location, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<u64>,
    pub seller_location: Option<Option<String>>,
}

fn validate_title(title: &str) -> MarketResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(MarketError::InvalidArgument("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(MarketError::InvalidArgument(format!(
            "title is longer than {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> MarketResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(MarketError::InvalidArgument("description is required".into()));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(MarketError::InvalidArgument(format!(
            "description is longer than {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(description.to_string())
}

fn validate_price(price_cents: u64) -> MarketResult<u64> {
    if price_cents == 0 {
        return Err(MarketError::InvalidArgument("price must be a positive number of cents".into()));
    }
    Ok(price_cents)
}

impl ListingUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price_cents.is_none()
            && self.seller_location.is_none()
    }

    fn apply_to(&self, listing: &mut Listing) -> MarketResult<()> {
        if self.is_empty() {
            return Err(MarketError::InvalidArgument("update contains no fields".into()));
        }
        if let Some(title) = &self.title {
            listing.title = validate_title(title)?;
        }
        if let Some(description) = &self.description {
            listing.description = validate_description(description)?;
        }
        if let Some(price) = self.price_cents {
            listing.price_cents = validate_price(price)?;
        }
        if let Some(location) = &self.seller_location {
            listing.seller_location = non_blank(location.as_deref());
        }
        listing.updated_at = TimeStamp::now();
        Ok(())
    }
}

/// Owners edit drafts, admins edit anything.
fn check_mutable(caller: &User, listing: &Listing) -> MarketResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    if !listing.is_owned_by(caller) {
        return Err(MarketError::Forbidden(format!(
            "listing {} belongs to another seller",
            listing.id
        )));
    }
    if listing.status != ListingStatus::Draft {
        return Err(MarketError::InvalidState(format!(
            "listing {} is {:?}, only drafts can be changed",
            listing.id, listing.status
        )));
    }
    Ok(())
}

fn require_admin(caller: &User, action: &str) -> MarketResult<()> {
    if !caller.is_admin() {
        return Err(MarketError::Forbidden(format!("only admins can {action} listings")));
    }
    Ok(())
}

fn require_owner_or_admin(caller: &User, listing: &Listing) -> MarketResult<()> {
    if caller.is_admin() || listing.is_owned_by(caller) {
        return Ok(());
    }
    Err(MarketError::Forbidden(format!(
        "listing {} belongs to another seller",
        listing.id
    )))
}

#[derive(Debug, Clone)]
pub struct ListingService {
    store: Store,
}

impl ListingService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create_listing(&self, caller: &User, new_listing: NewListing) -> MarketResult<Listing> {
        if !caller.can_sell() {
            return Err(MarketError::Forbidden("only sellers can create listings".into()));
        }
        let title = validate_title(&new_listing.title)?;
        let description = validate_description(&new_listing.description)?;
        let price_cents = validate_price(new_listing.price_cents)?;

        let now = TimeStamp::now();
        let listing = Listing {
            id: new_uuid_to_bech32(LISTING_HRP)?,
            seller_id: caller.id.clone(),
            title,
            description,
            price_cents,
            seller_location: non_blank(new_listing.seller_location.as_deref()),
            status: if new_listing.submit {
                ListingStatus::Submitted
            } else {
                ListingStatus::Draft
            },
            rejection_feedback: None,
            created_at: now,
            updated_at: now,
        };
        self.store.put(&self.store.listings, &listing.id, &listing)?;

        info!(
            listing_id = %listing.id,
            seller_id = %listing.seller_id,
            status = ?listing.status,
            "listing created"
        );
        Ok(listing)
    }

    pub fn get_listing(&self, listing_id: &str) -> MarketResult<Listing> {
        self.store.require(&self.store.listings, Entity::Listing, listing_id)
    }

    pub fn update_listing(
        &self,
        caller: &User,
        listing_id: &str,
        update: ListingUpdate,
    ) -> MarketResult<Listing> {
        let listing = self.store.listings.transaction(|listings| -> TxResult<Listing> {
            let mut listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
            tx_check(check_mutable(caller, &listing))?;
            tx_check(update.apply_to(&mut listing))?;
            tx_put(listings, &listing.id, &listing)?;
            Ok(listing)
        })?;

        info!(listing_id, editor_id = %caller.id, "listing updated");
        Ok(listing)
    }

    /// Remove a listing and its verification. Listings that were ever sold stay,
    /// sales reference them.
    pub fn delete_listing(&self, caller: &User, listing_id: &str) -> MarketResult<()> {
        let store = &self.store;
        (&store.listings, &store.verifications, &store.listing_sales).transaction(
            |(listings, verifications, listing_sales)| -> TxResult<()> {
                let listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
                tx_check(check_mutable(caller, &listing))?;
                if let Some(sale_id) = tx_get_ref(listing_sales, listing_id)? {
                    return reject(MarketError::InvalidState(format!(
                        "listing {listing_id} is referenced by sale {sale_id}"
                    )));
                }
                listings.remove(listing_id.as_bytes())?;
                verifications.remove(listing_id.as_bytes())?;
                Ok(())
            },
        )?;

        info!(listing_id, editor_id = %caller.id, "listing deleted");
        Ok(())
    }

    /// DRAFT -> SUBMITTED, by the owning seller.
    pub fn submit_listing(&self, caller: &User, listing_id: &str) -> MarketResult<Listing> {
        self.transition(
            caller,
            listing_id,
            &[ListingStatus::Draft],
            ListingStatus::Submitted,
            |caller, listing| {
                if !caller.can_sell() || !listing.is_owned_by(caller) {
                    return Err(MarketError::Forbidden(format!(
                        "only the owning seller can submit listing {}",
                        listing.id
                    )));
                }
                listing.rejection_feedback = None;
                Ok(())
            },
        )
    }

    /// REJECTED -> DRAFT, so the seller can edit and resubmit.
    pub fn revise_listing(&self, caller: &User, listing_id: &str) -> MarketResult<Listing> {
        self.transition(
            caller,
            listing_id,
            &[ListingStatus::Rejected],
            ListingStatus::Draft,
            |caller, listing| require_owner_or_admin(caller, listing),
        )
    }

    /// Any status short of LIVE -> UNDER_ADMIN_REVIEW, by an admin. A rejected
    /// listing can be pulled back in for a second look.
    pub fn mark_under_review(&self, caller: &User, listing_id: &str) -> MarketResult<Listing> {
        self.transition(
            caller,
            listing_id,
            &[
                ListingStatus::Draft,
                ListingStatus::Submitted,
                ListingStatus::Rejected,
                ListingStatus::Approved,
            ],
            ListingStatus::UnderAdminReview,
            |caller, _| require_admin(caller, "review"),
        )
    }

    pub fn approve_listing(&self, caller: &User, listing_id: &str) -> MarketResult<Listing> {
        self.transition(
            caller,
            listing_id,
            &[ListingStatus::Submitted, ListingStatus::UnderAdminReview],
            ListingStatus::Approved,
            |caller, _| require_admin(caller, "approve"),
        )
    }

    /// Reject with optional feedback for the seller, kept until resubmission.
    pub fn reject_listing(
        &self,
        caller: &User,
        listing_id: &str,
        feedback: Option<&str>,
    ) -> MarketResult<Listing> {
        let feedback = non_blank(feedback);
        self.transition(
            caller,
            listing_id,
            &[ListingStatus::Submitted, ListingStatus::UnderAdminReview],
            ListingStatus::Rejected,
            |caller, listing| {
                require_admin(caller, "reject")?;
                listing.rejection_feedback = feedback.clone();
                Ok(())
            },
        )
    }

    /// APPROVED -> LIVE. From here the listing can be bought.
    pub fn publish_listing(&self, caller: &User, listing_id: &str) -> MarketResult<Listing> {
        self.transition(
            caller,
            listing_id,
            &[ListingStatus::Approved],
            ListingStatus::Live,
            |caller, listing| require_owner_or_admin(caller, listing),
        )
    }

    pub fn listings_by_seller(&self, seller_id: &str) -> MarketResult<Vec<Listing>> {
        let mut listings = self
            .store
            .scan(&self.store.listings, |l: &Listing| l.seller_id == seller_id)?;
        newest_first(&mut listings);
        Ok(listings)
    }

    /// LIVE listings that can still be bought, newest first. A listing with an
    /// open or completed sale stays LIVE but is off the market.
    pub fn live_listings(&self) -> MarketResult<Vec<Listing>> {
        let mut listings = Vec::new();
        for listing in self
            .store
            .scan(&self.store.listings, |l: &Listing| l.status == ListingStatus::Live)?
        {
            if !self.has_open_sale(&listing.id)? {
                listings.push(listing);
            }
        }
        newest_first(&mut listings);
        debug!(count = listings.len(), "live listings loaded");
        Ok(listings)
    }

    /// Whether a purchase of the listing would be accepted right now.
    pub fn is_available(&self, listing_id: &str) -> MarketResult<bool> {
        let listing: Listing = self
            .store
            .require(&self.store.listings, Entity::Listing, listing_id)?;
        Ok(listing.status == ListingStatus::Live && !self.has_open_sale(listing_id)?)
    }

    fn has_open_sale(&self, listing_id: &str) -> MarketResult<bool> {
        Ok(self
            .store
            .get_ref(&self.store.open_sales, listing_id)?
            .is_some())
    }

    /// Listings waiting on an admin decision.
    pub fn pending_review(&self, caller: &User) -> MarketResult<Vec<Listing>> {
        require_admin(caller, "review")?;
        let mut listings = self.store.scan(&self.store.listings, |l: &Listing| {
            matches!(l.status, ListingStatus::Submitted | ListingStatus::UnderAdminReview)
        })?;
        newest_first(&mut listings);
        Ok(listings)
    }

    /// Single-record status change. `guard` runs on the current record before
    /// the status check and may adjust other fields.
    fn transition(
        &self,
        caller: &User,
        listing_id: &str,
        from: &[ListingStatus],
        to: ListingStatus,
        guard: impl Fn(&User, &mut Listing) -> MarketResult<()>,
    ) -> MarketResult<Listing> {
        let (listing, previous) =
            self.store
                .listings
                .transaction(|listings| -> TxResult<(Listing, ListingStatus)> {
                    let mut listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
                    let previous = listing.status;
                    tx_check(guard(caller, &mut listing))?;
                    if !from.contains(&previous) {
                        return reject(MarketError::InvalidState(format!(
                            "listing {listing_id} cannot move from {previous:?} to {to:?}"
                        )));
                    }
                    listing.status = to;
                    listing.updated_at = TimeStamp::now();
                    tx_put(listings, &listing.id, &listing)?;
                    Ok((listing, previous))
                })?;

        info!(
            listing_id,
            from = ?previous,
            to = ?to,
            actor_id = %caller.id,
            "listing transitioned"
        );
        Ok(listing)
    }
}

fn newest_first(listings: &mut [Listing]) {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
