//! Seller profiles: tier, rating and the counters other services feed.
use std::fmt;

use sled::transaction::TransactionalTree;
use tracing::info;

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::review::Review;
use crate::store::{Store, TxResult, tx_get, tx_put};
use crate::types::{SellerTier, TimeStamp};

/// Average review score in hundredths, so 4.25 stars is `Rating(425)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Rating(u32);

impl Rating {
    pub const ZERO: Rating = Rating(0);

    pub fn from_hundredths(hundredths: u32) -> Self {
        Rating(hundredths)
    }
    pub fn hundredths(&self) -> u32 {
        self.0
    }

    /// Arithmetic mean rounded half up to two decimals. No scores gives zero.
    pub fn mean(scores: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = scores
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), s| (sum + u64::from(s), count + 1));
        Rating::from_totals(sum, count)
    }

    /// Mean of `count` scores adding up to `sum`.
    pub fn from_totals(sum: u64, count: u64) -> Self {
        if count == 0 {
            return Rating::ZERO;
        }
        Rating(((sum * 100 + count / 2) / count) as u32)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SellerProfile {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub tier: SellerTier,
    #[n(2)]
    rating_hundredths: u32,
    #[n(3)]
    pub total_sales: u64,
    #[n(4)]
    pub failed_verifications: u64,
    #[n(5)]
    pub created_at: TimeStamp,
    #[n(6)]
    rating_sum: u64,
    #[n(7)]
    rating_count: u64,
}

impl SellerProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: SellerTier::default(),
            rating_hundredths: 0,
            total_sales: 0,
            failed_verifications: 0,
            created_at: TimeStamp::now(),
            rating_sum: 0,
            rating_count: 0,
        }
    }
    pub fn rating(&self) -> Rating {
        Rating(self.rating_hundredths)
    }
    /// Number of reviews the rating is the mean of.
    pub fn rating_count(&self) -> u64 {
        self.rating_count
    }

    /// Fold one more score into the running mean.
    pub(crate) fn add_rating(&mut self, score: u8) {
        self.rating_sum += u64::from(score);
        self.rating_count += 1;
        self.rating_hundredths = self.mean_of_totals();
    }

    fn reset_rating(&mut self, sum: u64, count: u64) {
        self.rating_sum = sum;
        self.rating_count = count;
        self.rating_hundredths = self.mean_of_totals();
    }

    fn mean_of_totals(&self) -> u32 {
        Rating::from_totals(self.rating_sum, self.rating_count).hundredths()
    }
}

/// Load-or-create a profile inside a transaction and apply `update` to it.
pub(crate) fn tx_update_profile(
    profiles: &TransactionalTree,
    seller_id: &str,
    update: impl Fn(&mut SellerProfile),
) -> TxResult<SellerProfile> {
    let mut profile = tx_get::<SellerProfile>(profiles, seller_id)?
        .unwrap_or_else(|| SellerProfile::new(seller_id));
    update(&mut profile);
    tx_put(profiles, seller_id, &profile)?;
    Ok(profile)
}

#[derive(Debug, Clone)]
pub struct ReputationService {
    store: Store,
}

impl ReputationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Current profile, or the defaults a new seller starts with.
    pub fn profile(&self, seller_id: &str) -> MarketResult<SellerProfile> {
        Ok(self
            .store
            .get(&self.store.profiles, seller_id)?
            .unwrap_or_else(|| SellerProfile::new(seller_id)))
    }

    /// Count a failed inspection outside a verification transaction, such as
    /// one recorded by hand.
    pub fn record_failed_verification(&self, seller_id: &str) -> MarketResult<SellerProfile> {
        let profile = self.update(seller_id, |p| p.failed_verifications += 1)?;
        info!(seller_id, failed = profile.failed_verifications, "failed verification recorded");
        Ok(profile)
    }

    pub fn record_completed_sale(&self, seller_id: &str) -> MarketResult<SellerProfile> {
        let profile = self.update(seller_id, |p| p.total_sales += 1)?;
        info!(seller_id, total_sales = profile.total_sales, "completed sale recorded");
        Ok(profile)
    }

    /// Rebuild the seller's rating totals from every stored review they
    /// received. Reviews keep the totals current as they are written, so this
    /// is only needed to repair a profile; running it again is always safe.
    pub fn recompute_rating(&self, seller_id: &str) -> MarketResult<Rating> {
        let received: Vec<Review> = self
            .store
            .scan(&self.store.reviews, |r: &Review| r.reviewee_id == seller_id)?;
        let sum = received.iter().map(|r| u64::from(r.rating)).sum();
        let count = received.len() as u64;

        let rating = self.update(seller_id, |p| p.reset_rating(sum, count))?.rating();
        info!(seller_id, %rating, reviews = count, "seller rating recomputed");
        Ok(rating)
    }

    /// Explicit administrative tier change.
    pub fn promote_tier(
        &self,
        caller: &User,
        seller_id: &str,
        tier: SellerTier,
    ) -> MarketResult<SellerProfile> {
        if !caller.is_admin() {
            return Err(MarketError::Forbidden("only admins can change seller tiers".into()));
        }
        self.store
            .require::<User>(&self.store.users, Entity::User, seller_id)?;

        let profile = self.update(seller_id, |p| p.tier = tier)?;
        info!(seller_id, tier = ?tier, admin_id = %caller.id, "seller tier changed");
        Ok(profile)
    }

    fn update(
        &self,
        seller_id: &str,
        update: impl Fn(&mut SellerProfile),
    ) -> MarketResult<SellerProfile> {
        Ok(self
            .store
            .profiles
            .transaction(|profiles| tx_update_profile(profiles, seller_id, &update))?)
    }
}
