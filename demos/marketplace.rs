//! Walks one listing from draft to a completed, reviewed sale.
//!
//! Configuration comes from the environment (see `MarketConfig`); by default
//! the database lands in a temp dir. Run with `RUST_LOG=debug` for more.

use anyhow::Context;
use marketplace_core::{
    MarketConfig, Marketplace, NewListing, Role, SaleStatus, ShipmentDirection, UserIdentity,
    VerificationStatus,
};

fn main() -> anyhow::Result<()> {
    let mut config = MarketConfig::from_env().context("reading configuration")?;
    let scratch = tempfile::tempdir()?;
    if std::env::var_os("MARKET_DB_PATH").is_none() {
        config.db_path = scratch.path().join("marketplace.db");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    let market = Marketplace::from_config(&config)?;
    let identity = market.identity();

    let admin = identity.provision(
        &UserIdentity::new("idp|admin").set_email("ops@example.com"),
        Role::Admin,
    )?;
    let seller = identity.provision(
        &UserIdentity::new("idp|seller")
            .set_email("sam@example.com")
            .set_name("Sam", "Seller"),
        Role::Seller,
    )?;
    let buyer = identity.resolve_or_create(
        &UserIdentity::new("idp|buyer").set_email("bea@example.com"),
    )?;

    let listings = market.listings();
    let listing = listings.create_listing(
        &seller,
        NewListing {
            title: "Vintage film camera".into(),
            description: "Fully working, new light seals".into(),
            price_cents: 10_000,
            seller_location: Some("Bristol".into()),
            submit: true,
        },
    )?;
    listings.approve_listing(&admin, &listing.id)?;
    listings.publish_listing(&seller, &listing.id)?;

    let verification = market.verification();
    verification.request_verification(&seller, &listing.id)?;
    verification.start_inspection(&admin, &listing.id)?;
    verification.mark_verified(&admin, &listing.id, Some("shutter speeds within tolerance"))?;
    assert_eq!(verification.status_of(&listing.id)?, VerificationStatus::Verified);

    let sales = market.sales();
    let sale = sales.purchase(&buyer, &listing.id, Some(795))?;
    println!(
        "sale {} is {:?}: price {} commission {} payout {}",
        sale.id, sale.status, sale.sale_price_cents, sale.commission_cents, sale.seller_payout_cents
    );

    let courier = market.courier();
    for (direction, tracking, cost) in [
        (ShipmentDirection::SellerToHub, "HUB-001", 395),
        (ShipmentDirection::HubToBuyer, "OUT-001", 400),
    ] {
        courier.create_shipment(&admin, &sale.id, direction, Some(tracking), cost)?;
    }

    sales.advance_sale(&admin, &sale.id, SaleStatus::Dispatched)?;
    sales.advance_sale(&admin, &sale.id, SaleStatus::Delivered)?;
    sales.settle_funds(&admin, &sale.id)?;
    let sale = sales.advance_sale(&admin, &sale.id, SaleStatus::Completed)?;
    println!("sale {} finished as {:?}", sale.id, sale.financial_status);

    market.reviews().create_review(&buyer, &sale.id, 5, Some("exactly as described"))?;
    let profile = market.reputation().profile(&seller.id)?;
    println!(
        "{} now has {} sale(s), rated {}",
        seller.display_name,
        profile.total_sales,
        profile.rating()
    );

    market.flush()?;
    Ok(())
}
