//! Shared fixture for the integration tests.
//!
//! Sled locks its database directory, so every test gets its own database
//! under a temp dir that is removed when the fixture drops.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Context;
use marketplace_core::{
    Listing, ListingStatus, Marketplace, NewListing, Role, SettlementPolicy, User, UserIdentity,
};
use tempfile::{TempDir, tempdir};

pub struct Fixture {
    pub market: Marketplace,
    pub admin: User,
    pub seller: User,
    pub buyer: User,
    _dir: TempDir,
}

impl Fixture {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        Self::with_policy(name, SettlementPolicy::default())
    }

    pub fn with_policy(name: &str, policy: SettlementPolicy) -> anyhow::Result<Self> {
        let dir = tempdir()?;
        let db = sled::open(dir.path().join(format!("{name}.db")))?;
        let market = Marketplace::new(Arc::new(db), policy)?;

        let admin = provision(&market, "admin", Role::Admin)?;
        let seller = provision(&market, "seller", Role::Seller)?;
        let buyer = provision(&market, "buyer", Role::Buyer)?;

        Ok(Self { market, admin, seller, buyer, _dir: dir })
    }

    pub fn user(&self, name: &str, role: Role) -> anyhow::Result<User> {
        provision(&self.market, name, role)
    }

    pub fn draft(&self, price_cents: u64) -> anyhow::Result<Listing> {
        let listing = self
            .market
            .listings()
            .create_listing(
                &self.seller,
                NewListing {
                    title: "Mid-century armchair".into(),
                    description: "Teak frame, original upholstery".into(),
                    price_cents,
                    seller_location: Some("Leeds".into()),
                    submit: false,
                },
            )
            .context("creating draft listing")?;
        Ok(listing)
    }

    /// A fresh listing of the seller's, driven to `status` through the public
    /// operations.
    pub fn listing_in(&self, status: ListingStatus, price_cents: u64) -> anyhow::Result<Listing> {
        let listings = self.market.listings();
        let draft = self.draft(price_cents)?;
        if status == ListingStatus::Draft {
            return Ok(draft);
        }

        let id = draft.id;
        let submitted = listings.submit_listing(&self.seller, &id)?;
        let listing = match status {
            ListingStatus::Draft | ListingStatus::Submitted => submitted,
            ListingStatus::UnderAdminReview => listings.mark_under_review(&self.admin, &id)?,
            ListingStatus::Rejected => {
                listings.reject_listing(&self.admin, &id, Some("blurry photos"))?
            }
            ListingStatus::Approved => listings.approve_listing(&self.admin, &id)?,
            ListingStatus::Live => {
                listings.approve_listing(&self.admin, &id)?;
                listings.publish_listing(&self.seller, &id)?
            }
        };
        assert_eq!(listing.status, status);
        Ok(listing)
    }

    pub fn live_listing(&self, price_cents: u64) -> anyhow::Result<Listing> {
        self.listing_in(ListingStatus::Live, price_cents)
    }
}

pub fn provision(market: &Marketplace, name: &str, role: Role) -> anyhow::Result<User> {
    let identity = UserIdentity::new(format!("idp|{name}"))
        .set_email(format!("{name}@example.com"))
        .set_name(name, "Tester");
    let user = market
        .identity()
        .provision(&identity, role)
        .with_context(|| format!("provisioning {name}"))?;
    Ok(user)
}
