//! Physical inspection of listed items.
//!
//! One verification per listing, stored under the listing id and created on
//! first request. A failed inspection counts against the seller in the same
//! transaction that records the failure.
use sled::Transactional;
use tracing::{debug, info};

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::listing::Listing;
use crate::reputation::{SellerProfile, tx_update_profile};
use crate::store::{Store, TxResult, reject, tx_get, tx_put, tx_require};
use crate::types::{TimeStamp, VerificationStatus};
use crate::utils::{VERIFICATION_HRP, new_uuid_to_bech32, non_blank};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub listing_id: String,
    #[n(2)]
    pub status: VerificationStatus,
    #[n(3)]
    pub inspector_notes: Option<String>,
    #[n(4)]
    pub verified_at: Option<TimeStamp>,
    #[n(5)]
    pub created_at: TimeStamp,
}

fn require_admin(caller: &User) -> MarketResult<()> {
    if !caller.is_admin() {
        return Err(MarketError::Forbidden("only admins can inspect items".into()));
    }
    Ok(())
}

fn ensure_from(
    verification: &Verification,
    from: &[VerificationStatus],
    to: VerificationStatus,
) -> TxResult<()> {
    if from.contains(&verification.status) {
        return Ok(());
    }
    reject(MarketError::InvalidState(format!(
        "verification of listing {} cannot move from {:?} to {:?}",
        verification.listing_id, verification.status, to
    )))
}

#[derive(Debug, Clone)]
pub struct VerificationService {
    store: Store,
}

impl VerificationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Ask for an inspection. A repeated request puts the record back to
    /// `AWAITING_ITEM`; earlier notes and verified-at are kept.
    pub fn request_verification(
        &self,
        caller: &User,
        listing_id: &str,
    ) -> MarketResult<Verification> {
        let fresh_id = new_uuid_to_bech32(VERIFICATION_HRP)?;
        let store = &self.store;

        let verification = (&store.listings, &store.verifications).transaction(
            |(listings, verifications)| -> TxResult<Verification> {
                let listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
                if !caller.is_admin() && !listing.is_owned_by(caller) {
                    return reject(MarketError::Forbidden(format!(
                        "only the seller of listing {listing_id} can request verification"
                    )));
                }

                let now = TimeStamp::now();
                let verification = match tx_get::<Verification>(verifications, listing_id)? {
                    Some(mut existing) => {
                        existing.status = VerificationStatus::AwaitingItem;
                        existing.created_at = now;
                        existing
                    }
                    None => Verification {
                        id: fresh_id.clone(),
                        listing_id: listing_id.to_string(),
                        status: VerificationStatus::AwaitingItem,
                        inspector_notes: None,
                        verified_at: None,
                        created_at: now,
                    },
                };
                tx_put(verifications, listing_id, &verification)?;
                Ok(verification)
            },
        )?;

        info!(listing_id, verification_id = %verification.id, "verification requested");
        Ok(verification)
    }

    /// AWAITING_ITEM -> IN_INSPECTION, once the item has arrived.
    pub fn start_inspection(&self, caller: &User, listing_id: &str) -> MarketResult<Verification> {
        require_admin(caller)?;
        let verification =
            self.store
                .verifications
                .transaction(|verifications| -> TxResult<Verification> {
                    let mut verification: Verification =
                        tx_require(verifications, Entity::Verification, listing_id)?;
                    ensure_from(
                        &verification,
                        &[VerificationStatus::AwaitingItem],
                        VerificationStatus::InInspection,
                    )?;
                    verification.status = VerificationStatus::InInspection;
                    tx_put(verifications, listing_id, &verification)?;
                    Ok(verification)
                })?;

        info!(listing_id, admin_id = %caller.id, "inspection started");
        Ok(verification)
    }

    /// IN_INSPECTION -> VERIFIED.
    pub fn mark_verified(
        &self,
        caller: &User,
        listing_id: &str,
        inspector_notes: Option<&str>,
    ) -> MarketResult<Verification> {
        require_admin(caller)?;
        let notes = non_blank(inspector_notes);

        let verification =
            self.store
                .verifications
                .transaction(|verifications| -> TxResult<Verification> {
                    let mut verification: Verification =
                        tx_require(verifications, Entity::Verification, listing_id)?;
                    ensure_from(
                        &verification,
                        &[VerificationStatus::InInspection],
                        VerificationStatus::Verified,
                    )?;
                    verification.status = VerificationStatus::Verified;
                    verification.verified_at = Some(TimeStamp::now());
                    if notes.is_some() {
                        verification.inspector_notes = notes.clone();
                    }
                    tx_put(verifications, listing_id, &verification)?;
                    Ok(verification)
                })?;

        info!(listing_id, admin_id = %caller.id, "item verified");
        Ok(verification)
    }

    /// AWAITING_ITEM | IN_INSPECTION -> FAILED. The seller's failed
    /// verification count goes up in the same transaction.
    pub fn mark_failed(
        &self,
        caller: &User,
        listing_id: &str,
        inspector_notes: Option<&str>,
    ) -> MarketResult<Verification> {
        require_admin(caller)?;
        let notes = non_blank(inspector_notes);
        let store = &self.store;

        let trees = (&store.listings, &store.verifications, &store.profiles);
        let (verification, profile) = trees.transaction(
            |(listings, verifications, profiles)| -> TxResult<(Verification, SellerProfile)> {
                let listing: Listing = tx_require(listings, Entity::Listing, listing_id)?;
                let mut verification: Verification =
                    tx_require(verifications, Entity::Verification, listing_id)?;
                ensure_from(
                    &verification,
                    &[VerificationStatus::AwaitingItem, VerificationStatus::InInspection],
                    VerificationStatus::Failed,
                )?;
                verification.status = VerificationStatus::Failed;
                if notes.is_some() {
                    verification.inspector_notes = notes.clone();
                }
                tx_put(verifications, listing_id, &verification)?;

                let profile = tx_update_profile(profiles, &listing.seller_id, |p| {
                    p.failed_verifications += 1
                })?;
                Ok((verification, profile))
            },
        )?;

        info!(
            listing_id,
            seller_id = %profile.user_id,
            failed_verifications = profile.failed_verifications,
            "item failed verification"
        );
        Ok(verification)
    }

    pub fn get_verification(&self, listing_id: &str) -> MarketResult<Option<Verification>> {
        self.store.get(&self.store.verifications, listing_id)
    }

    /// A missing record reads as `NOT_REQUESTED`.
    pub fn status_of(&self, listing_id: &str) -> MarketResult<VerificationStatus> {
        Ok(self
            .get_verification(listing_id)?
            .map(|v| v.status)
            .unwrap_or_default())
    }

    /// Buyer-facing badge: only a `VERIFIED` record counts.
    pub fn is_verified(&self, listing_id: &str) -> MarketResult<bool> {
        let verified = self.status_of(listing_id)? == VerificationStatus::Verified;
        debug!(listing_id, verified, "verification projected");
        Ok(verified)
    }

    /// Inspections an admin still has to act on, oldest request first.
    pub fn pending_verifications(&self, caller: &User) -> MarketResult<Vec<Verification>> {
        require_admin(caller)?;
        let mut pending = self
            .store
            .scan(&self.store.verifications, |v: &Verification| v.status.is_pending())?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}
