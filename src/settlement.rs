//! Commission and payout arithmetic. Integer cents only.
use crate::error::{MarketError, MarketResult};

pub const DEFAULT_COMMISSION_BPS: u32 = 2_000; // 20%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// How a fractional cent of commission is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    #[default]
    HalfUp,
    Floor,
}

/// Who pays for the courier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourierPolicy {
    /// Tracked on the sale, does not touch the seller payout
    #[default]
    BuyerBorne,
    /// Deducted from the seller payout after commission
    SellerBorne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPolicy {
    commission_bps: u32,
    rounding: Rounding,
    courier: CourierPolicy,
}

/// The money split recorded on a sale at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub sale_price_cents: u64,
    pub commission_cents: u64,
    pub seller_payout_cents: u64,
    pub courier_costs_cents: u64,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            commission_bps: DEFAULT_COMMISSION_BPS,
            rounding: Rounding::default(),
            courier: CourierPolicy::default(),
        }
    }
}

impl SettlementPolicy {
    pub fn new(
        commission_bps: u32,
        rounding: Rounding,
        courier: CourierPolicy,
    ) -> MarketResult<Self> {
        if commission_bps > BPS_DENOMINATOR {
            return Err(MarketError::InvalidArgument(format!(
                "commission of {commission_bps} bps exceeds 100%"
            )));
        }
        Ok(Self {
            commission_bps,
            rounding,
            courier,
        })
    }

    pub fn commission_bps(&self) -> u32 {
        self.commission_bps
    }
    pub fn rounding(&self) -> Rounding {
        self.rounding
    }
    pub fn courier(&self) -> CourierPolicy {
        self.courier
    }

    /// Commission on the sale price alone. Never exceeds the price.
    pub fn commission_for(&self, sale_price_cents: u64) -> u64 {
        let gross = u128::from(sale_price_cents) * u128::from(self.commission_bps);
        let denominator = u128::from(BPS_DENOMINATOR);
        let commission = match self.rounding {
            Rounding::HalfUp => (gross + denominator / 2) / denominator,
            Rounding::Floor => gross / denominator,
        };
        // bps <= denominator keeps this within the price
        commission as u64
    }

    /// Split a sale price into commission and payout.
    ///
    /// Under [`CourierPolicy::SellerBorne`] a courier cost larger than what is left after
    /// commission is rejected rather than clamped, so the split always balances.
    pub fn settle(
        &self,
        sale_price_cents: u64,
        courier_costs_cents: u64,
    ) -> MarketResult<Settlement> {
        let commission_cents = self.commission_for(sale_price_cents);
        let remainder = sale_price_cents - commission_cents;

        let seller_payout_cents = match self.courier {
            CourierPolicy::BuyerBorne => remainder,
            CourierPolicy::SellerBorne => {
                remainder.checked_sub(courier_costs_cents).ok_or_else(|| {
                    MarketError::InvalidArgument(format!(
                        "courier costs of {courier_costs_cents} cents exceed \
                         the seller payout of {remainder} cents"
                    ))
                })?
            }
        };

        Ok(Settlement {
            sale_price_cents,
            commission_cents,
            seller_payout_cents,
            courier_costs_cents,
        })
    }
}

impl Settlement {
    /// Everything the seller does not receive, plus the payout, adds back to the price.
    pub fn balances(&self, courier: CourierPolicy) -> bool {
        let deducted = match courier {
            CourierPolicy::BuyerBorne => 0,
            CourierPolicy::SellerBorne => self.courier_costs_cents,
        };
        u128::from(self.commission_cents)
            + u128::from(self.seller_payout_cents)
            + u128::from(deducted)
            == u128::from(self.sale_price_cents)
    }
}
