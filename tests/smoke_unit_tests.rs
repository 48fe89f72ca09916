//! Smoke screen unit tests for marketplace components
//!
//! These tests span the codebase and check behaviour in isolation from the
//! integration scenarios. They mostly cover the happy path.

use chrono::{Datelike, TimeZone, Utc};
use marketplace_core::{
    MarketError, Rating, SellerProfile, TimeStamp,
    error::Entity,
    settlement::{CourierPolicy, Rounding, SettlementPolicy},
    utils::{LISTING_HRP, SALE_HRP, USER_HRP, new_uuid_to_bech32, non_blank, pair_key},
};

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids carry the prefix of the record they name
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32(LISTING_HRP).unwrap();
        assert!(encoded.starts_with("listing_1"));
        assert!(encoded.len() > 20);
    }

    #[test]
    fn generates_unique_ids() {
        let ids: Vec<_> = (0..3).map(|_| new_uuid_to_bech32(SALE_HRP).unwrap()).collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn different_hrps_produce_different_encodings() {
        let user_id = new_uuid_to_bech32(USER_HRP).unwrap();
        let sale_id = new_uuid_to_bech32(SALE_HRP).unwrap();
        assert!(user_id.starts_with("user_"));
        assert!(sale_id.starts_with("sale_"));
    }

    #[test]
    fn pair_keys_group_by_owner() {
        assert!(pair_key("user_a", "listing_b").starts_with(&pair_key("user_a", "")));
        assert!(!pair_key("user_ab", "listing_b").starts_with(&pair_key("user_a", "")));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  Leeds ")), Some("Leeds".to_string()));
        assert_eq!(non_blank(Some("\t")), None);
        assert_eq!(non_blank(None), None);
    }
}

// TYPES MODULE TESTS
mod types_tests {
    use super::*;

    #[test]
    fn timestamp_now_is_current() {
        let diff = (Utc::now() - TimeStamp::now().to_datetime_utc())
            .num_seconds()
            .abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_cbor_keeps_nanoseconds() {
        let original = TimeStamp::from(Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap());
        let encoded = minicbor::to_vec(original).unwrap();
        let decoded: TimeStamp = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
        assert_eq!(decoded.to_datetime_utc().year(), 2024);
    }
}

// SETTLEMENT MODULE TESTS
mod settlement_tests {
    use super::*;

    #[test]
    fn ten_thousand_cents_splits_two_thousand_eight_thousand() {
        let split = SettlementPolicy::default().settle(10_000, 0).unwrap();
        assert_eq!(split.commission_cents, 2_000);
        assert_eq!(split.seller_payout_cents, 8_000);
    }

    #[test]
    fn half_cent_rounds_up_by_default() {
        // 20% of 2.53 is 0.506
        assert_eq!(SettlementPolicy::default().commission_for(253), 51);
        let floor =
            SettlementPolicy::new(2_000, Rounding::Floor, CourierPolicy::BuyerBorne).unwrap();
        assert_eq!(floor.commission_for(253), 50);
    }

    #[test]
    fn seller_borne_courier_comes_out_of_payout() {
        let policy =
            SettlementPolicy::new(2_000, Rounding::HalfUp, CourierPolicy::SellerBorne).unwrap();
        let split = policy.settle(10_000, 500).unwrap();
        assert_eq!(split.seller_payout_cents, 7_500);
        assert!(matches!(
            policy.settle(1_000, 900),
            Err(MarketError::InvalidArgument(_))
        ));
    }
}

// REPUTATION MODULE TESTS
mod reputation_tests {
    use super::*;

    #[test]
    fn rating_displays_two_decimals() {
        assert_eq!(Rating::from_hundredths(425).to_string(), "4.25");
        assert_eq!(Rating::from_hundredths(500).to_string(), "5.00");
    }

    #[test]
    fn new_profile_has_no_rating() {
        let profile = SellerProfile::new("user_1");
        assert_eq!(profile.rating(), Rating::ZERO);
        assert_eq!(profile.failed_verifications, 0);
    }
}

// ERROR MODULE TESTS
mod error_tests {
    use super::*;

    #[test]
    fn every_kind_has_a_stable_code() {
        let errors = [
            MarketError::Unauthenticated,
            MarketError::not_found(Entity::Review, "r"),
            MarketError::Forbidden("f".into()),
            MarketError::InvalidState("s".into()),
            MarketError::InvalidArgument("a".into()),
            MarketError::Conflict("c".into()),
            MarketError::Internal("i".into()),
        ];
        let codes: Vec<_> = errors.iter().map(MarketError::kind).collect();
        assert_eq!(
            codes,
            [
                "UNAUTHENTICATED",
                "NOT_FOUND",
                "FORBIDDEN",
                "INVALID_STATE",
                "INVALID_ARGUMENT",
                "CONFLICT",
                "INTERNAL"
            ]
        );
        assert_eq!(MarketError::InvalidArgument("a".into()).status_code(), 400);
    }
}
