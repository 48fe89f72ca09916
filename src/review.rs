//! Reviews between the two parties of a completed sale.
use sled::Transactional;
use tracing::info;

use crate::error::{Entity, MarketError, MarketResult};
use crate::identity::User;
use crate::reputation::tx_update_profile;
use crate::sale::Sale;
use crate::store::{Store, TxResult, reject, tx_get, tx_put, tx_require};
use crate::types::{SaleStatus, TimeStamp};
use crate::utils::{non_blank, pair_digest};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_COMMENT_CHARS: usize = 1_000;

// key is the digest of (sale, reviewer), so a second review lands on the same key
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Review {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub sale_id: String,
    #[n(2)]
    pub reviewer_id: String,
    #[n(3)]
    pub reviewee_id: String,
    #[n(4)]
    pub rating: u8,
    #[n(5)]
    pub comment: Option<String>,
    #[n(6)]
    pub created_at: TimeStamp,
}

impl Review {
    pub fn id_for(sale_id: &str, reviewer_id: &str) -> String {
        pair_digest(sale_id, reviewer_id)
    }
}

fn validate(rating: u8, comment: Option<&str>) -> MarketResult<Option<String>> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(MarketError::InvalidArgument(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )));
    }
    let comment = non_blank(comment);
    if comment
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return Err(MarketError::InvalidArgument(format!(
            "comment is longer than {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(comment)
}

#[derive(Debug, Clone)]
pub struct ReviewService {
    store: Store,
}

impl ReviewService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Review the other party of a completed sale, once per sale.
    ///
    /// A review of the seller folds its score into the seller's rating in the
    /// same transaction that stores the review.
    pub fn create_review(
        &self,
        caller: &User,
        sale_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> MarketResult<Review> {
        let comment = validate(rating, comment)?;
        let review_id = Review::id_for(sale_id, &caller.id);
        let store = &self.store;

        let review = (&store.sales, &store.reviews, &store.profiles).transaction(
            |(sales, reviews, profiles)| -> TxResult<Review> {
                let sale: Sale = tx_require(sales, Entity::Sale, sale_id)?;
                let Some(reviewee_id) = sale.counterparty_of(&caller.id) else {
                    return reject(MarketError::Forbidden(format!(
                        "only the buyer or seller of sale {sale_id} can review it"
                    )));
                };
                if sale.status != SaleStatus::Completed {
                    return reject(MarketError::InvalidState(format!(
                        "sale {sale_id} is {:?}, only completed sales can be reviewed",
                        sale.status
                    )));
                }
                if tx_get::<Review>(reviews, &review_id)?.is_some() {
                    return reject(MarketError::Conflict(format!(
                        "review already exists for sale {sale_id}"
                    )));
                }

                let review = Review {
                    id: review_id.clone(),
                    sale_id: sale.id.clone(),
                    reviewer_id: caller.id.clone(),
                    reviewee_id: reviewee_id.to_string(),
                    rating,
                    comment: comment.clone(),
                    created_at: TimeStamp::now(),
                };
                tx_put(reviews, &review.id, &review)?;
                if review.reviewee_id == sale.seller_id {
                    tx_update_profile(profiles, &sale.seller_id, |p| p.add_rating(rating))?;
                }
                Ok(review)
            },
        )?;

        info!(sale_id, reviewer_id = %review.reviewer_id, rating, "review created");
        Ok(review)
    }

    /// Reviews a user received, newest first.
    pub fn reviews_for(&self, reviewee_id: &str) -> MarketResult<Vec<Review>> {
        let mut reviews = self
            .store
            .scan(&self.store.reviews, |r: &Review| r.reviewee_id == reviewee_id)?;
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    pub fn reviews_of_sale(&self, sale_id: &str) -> MarketResult<Vec<Review>> {
        self.store
            .scan(&self.store.reviews, |r: &Review| r.sale_id == sale_id)
    }
}
