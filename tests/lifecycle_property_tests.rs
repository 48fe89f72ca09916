//! Property-based tests for the status gates of the listing, verification
//! and sale lifecycles
//!
//! Each case runs against its own sled database, so the case counts are
//! kept small.

mod common;

use common::Fixture;
use marketplace_core::{
    ListingStatus, ListingUpdate, MarketError, Role, SaleStatus, VerificationStatus,
};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

fn listing_status_strategy() -> impl Strategy<Value = ListingStatus> {
    prop::sample::select(ListingStatus::ALL.to_vec())
}

fn verification_status_strategy() -> impl Strategy<Value = VerificationStatus> {
    prop::sample::select(VerificationStatus::ALL.to_vec())
}

fn price_strategy() -> impl Strategy<Value = u64> {
    1u64..=5_000_000
}

/// Drive the verification of `listing_id` to `status` through the public operations.
fn verify_to(fx: &Fixture, listing_id: &str, status: VerificationStatus) -> anyhow::Result<()> {
    let verification = fx.market.verification();
    if status == VerificationStatus::NotRequested {
        return Ok(());
    }
    verification.request_verification(&fx.seller, listing_id)?;
    match status {
        VerificationStatus::NotRequested | VerificationStatus::AwaitingItem => {}
        VerificationStatus::InInspection => {
            verification.start_inspection(&fx.admin, listing_id)?;
        }
        VerificationStatus::Verified => {
            verification.start_inspection(&fx.admin, listing_id)?;
            verification.mark_verified(&fx.admin, listing_id, None)?;
        }
        VerificationStatus::Failed => {
            verification.mark_failed(&fx.admin, listing_id, None)?;
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// A purchase succeeds exactly when the listing is LIVE
    #[test]
    fn only_live_listings_can_be_bought(
        status in listing_status_strategy(),
        price in price_strategy(),
    ) {
        let fx = Fixture::new("status_gate").unwrap();
        let listing = fx.listing_in(status, price).unwrap();

        let result = fx.market.sales().purchase(&fx.buyer, &listing.id, None);
        if status == ListingStatus::Live {
            let sale = result.unwrap();
            prop_assert_eq!(sale.sale_price_cents, price);
            prop_assert_eq!(sale.commission_cents + sale.seller_payout_cents, price);
        } else {
            prop_assert!(matches!(result, Err(MarketError::InvalidState(_))));
            prop_assert!(fx.market.sales().purchases(&fx.buyer).unwrap().is_empty());
        }
    }

    /// Sellers can never buy their own listing, whatever its status
    #[test]
    fn own_listing_purchase_is_forbidden(status in listing_status_strategy()) {
        let fx = Fixture::new("self_purchase").unwrap();
        let listing = fx.listing_in(status, 1_000).unwrap();

        let result = fx.market.sales().purchase(&fx.seller, &listing.id, None);
        prop_assert!(matches!(result, Err(MarketError::Forbidden(_))));
    }

    /// The owner may edit a listing only while it is a draft; admins always may
    #[test]
    fn only_drafts_are_editable_by_their_owner(
        status in listing_status_strategy(),
        price in price_strategy(),
    ) {
        let fx = Fixture::new("draft_only").unwrap();
        let listing = fx.listing_in(status, 1_000).unwrap();
        let update = ListingUpdate { price_cents: Some(price), ..ListingUpdate::default() };

        let by_owner = fx.market.listings().update_listing(&fx.seller, &listing.id, update.clone());
        if status == ListingStatus::Draft {
            prop_assert_eq!(by_owner.unwrap().price_cents, price);
        } else {
            prop_assert!(matches!(by_owner, Err(MarketError::InvalidState(_))));
            let stored = fx.market.listings().get_listing(&listing.id).unwrap();
            prop_assert_eq!(stored.price_cents, 1_000);
        }

        let by_admin = fx.market.listings().update_listing(&fx.admin, &listing.id, update).unwrap();
        prop_assert_eq!(by_admin.price_cents, price);

        let other = fx.user("other_seller", Role::Seller).unwrap();
        let by_other = fx.market.listings().update_listing(
            &other,
            &listing.id,
            ListingUpdate { title: Some("Mine now".into()), ..ListingUpdate::default() },
        );
        prop_assert!(matches!(by_other, Err(MarketError::Forbidden(_))));
    }

    /// Only a VERIFIED record shows as verified and confirms a sale at creation
    #[test]
    fn verification_projection(status in verification_status_strategy()) {
        let fx = Fixture::new("projection").unwrap();
        let listing = fx.live_listing(8_000).unwrap();
        verify_to(&fx, &listing.id, status).unwrap();

        let verified = status == VerificationStatus::Verified;
        prop_assert_eq!(fx.market.verification().status_of(&listing.id).unwrap(), status);
        prop_assert_eq!(fx.market.verification().is_verified(&listing.id).unwrap(), verified);

        let sale = fx.market.sales().purchase(&fx.buyer, &listing.id, None).unwrap();
        let expected = if verified {
            SaleStatus::Confirmed
        } else {
            SaleStatus::PendingVerification
        };
        prop_assert_eq!(sale.status, expected);
    }

    /// At most one review per (sale, reviewer), whatever rating is attempted
    #[test]
    fn one_review_per_sale_and_reviewer(first in 1u8..=5, second in 0u8..=7) {
        let fx = Fixture::new("review_unique").unwrap();
        let listing = fx.live_listing(2_000).unwrap();
        let sales = fx.market.sales();
        let sale = sales.purchase(&fx.buyer, &listing.id, None).unwrap();
        for next in [SaleStatus::Dispatched, SaleStatus::Delivered, SaleStatus::Completed] {
            sales.advance_sale(&fx.admin, &sale.id, next).unwrap();
        }

        fx.market.reviews().create_review(&fx.buyer, &sale.id, first, None).unwrap();
        let again = fx.market.reviews().create_review(&fx.buyer, &sale.id, second, None);
        if (1..=5).contains(&second) {
            prop_assert!(matches!(again, Err(MarketError::Conflict(_))));
        } else {
            prop_assert!(matches!(again, Err(MarketError::InvalidArgument(_))));
        }
        prop_assert_eq!(fx.market.reviews().reviews_of_sale(&sale.id).unwrap().len(), 1);

        // the other party still has its own review to give
        let reviews = fx.market.reviews();
        let by_seller = reviews.create_review(&fx.seller, &sale.id, second.clamp(1, 5), None);
        prop_assert_eq!(by_seller.unwrap().reviewee_id, fx.buyer.id.clone());
        prop_assert_eq!(fx.market.reviews().reviews_of_sale(&sale.id).unwrap().len(), 2);
        prop_assert_eq!(
            fx.market.reputation().profile(&fx.seller.id).unwrap().rating().hundredths(),
            u32::from(first) * 100
        );
    }

    /// Admins can pull any listing short of LIVE into review, rejected ones included
    #[test]
    fn admin_review_reaches_every_status_before_live(status in listing_status_strategy()) {
        let fx = Fixture::new("under_review").unwrap();
        let listing = fx.listing_in(status, 1_500).unwrap();

        let by_seller = fx.market.listings().mark_under_review(&fx.seller, &listing.id);
        prop_assert!(matches!(by_seller, Err(MarketError::Forbidden(_))));

        let by_admin = fx.market.listings().mark_under_review(&fx.admin, &listing.id);
        if matches!(status, ListingStatus::Live | ListingStatus::UnderAdminReview) {
            prop_assert!(matches!(by_admin, Err(MarketError::InvalidState(_))));
        } else {
            prop_assert_eq!(by_admin.unwrap().status, ListingStatus::UnderAdminReview);
        }
    }
}
