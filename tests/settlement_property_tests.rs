//! Property-based tests for the commission and payout split
//!
//! The split is pure integer arithmetic, so these run against the policy
//! directly over the whole range of prices a listing can carry.

use marketplace_core::settlement::BPS_DENOMINATOR;
use marketplace_core::{CourierPolicy, MarketError, Rounding, SettlementPolicy};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

fn rounding_strategy() -> impl Strategy<Value = Rounding> {
    prop::bool::ANY.prop_map(|b| if b { Rounding::HalfUp } else { Rounding::Floor })
}

fn courier_strategy() -> impl Strategy<Value = CourierPolicy> {
    prop::bool::ANY.prop_map(|b| {
        if b {
            CourierPolicy::BuyerBorne
        } else {
            CourierPolicy::SellerBorne
        }
    })
}

fn policy_strategy() -> impl Strategy<Value = SettlementPolicy> {
    (0u32..=BPS_DENOMINATOR, rounding_strategy(), courier_strategy()).prop_map(
        |(bps, rounding, courier)| {
            SettlementPolicy::new(bps, rounding, courier).expect("bps within range")
        },
    )
}

proptest! {
    /// commission + payout == price for the default policy, any positive price
    #[test]
    fn default_split_always_balances(price in 1u64..=1_000_000_000_000) {
        let split = SettlementPolicy::default().settle(price, 0).unwrap();
        prop_assert_eq!(split.commission_cents + split.seller_payout_cents, price);
        prop_assert!(split.commission_cents <= price);
    }

    /// The default 20% commission is within half a cent of the exact value
    #[test]
    fn default_commission_is_twenty_percent_rounded(price in 1u64..=1_000_000_000) {
        let commission = SettlementPolicy::default().commission_for(price);
        let diff = (commission * 5).abs_diff(price);
        // |c - p/5| <= 1/2  <=>  |5c - p| <= 5/2
        prop_assert!(diff * 2 <= 5, "price {} commission {}", price, commission);
    }

    /// Whatever the policy, either the split balances or it was refused for
    /// a seller-borne courier cost the payout cannot cover
    #[test]
    fn any_policy_balances_or_refuses(
        policy in policy_strategy(),
        price in 1u64..=10_000_000,
        courier in 0u64..=10_000_000,
    ) {
        match policy.settle(price, courier) {
            Ok(split) => {
                prop_assert!(split.balances(policy.courier()));
                prop_assert_eq!(split.courier_costs_cents, courier);
            }
            Err(err) => {
                prop_assert_eq!(policy.courier(), CourierPolicy::SellerBorne);
                prop_assert!(matches!(err, MarketError::InvalidArgument(_)));
                prop_assert!(courier > price - policy.commission_for(price));
            }
        }
    }

    /// Floor never takes more than half-up at the same rate
    #[test]
    fn floor_never_exceeds_half_up(bps in 0u32..=BPS_DENOMINATOR, price in 1u64..=10_000_000) {
        let floor = SettlementPolicy::new(bps, Rounding::Floor, CourierPolicy::BuyerBorne).unwrap();
        let half_up =
            SettlementPolicy::new(bps, Rounding::HalfUp, CourierPolicy::BuyerBorne).unwrap();
        let (f, h) = (floor.commission_for(price), half_up.commission_for(price));
        prop_assert!(f <= h && h - f <= 1);
    }

    /// Commission never decreases as the price goes up
    #[test]
    fn commission_is_monotonic(policy in policy_strategy(), price in 1u64..=10_000_000) {
        prop_assert!(policy.commission_for(price) <= policy.commission_for(price + 1));
    }
}
