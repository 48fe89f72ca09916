pub mod config;
pub mod courier;
pub mod error;
pub mod favourite;
pub mod identity;
pub mod listing;
pub mod reputation;
pub mod review;
pub mod sale;
pub mod service;
pub mod settlement;
pub mod store;
pub mod types;
pub mod utils;
pub mod verification;

pub use config::{ConfigError, MarketConfig};
pub use courier::CourierShipment;
pub use error::{Entity, MarketError, MarketResult};
pub use favourite::Favourite;
pub use identity::{User, UserIdentity, WebhookOutcome};
pub use listing::{Listing, ListingUpdate, NewListing};
pub use reputation::{Rating, SellerProfile};
pub use review::Review;
pub use sale::Sale;
pub use service::Marketplace;
pub use settlement::{CourierPolicy, Rounding, Settlement, SettlementPolicy};
pub use types::{
    CourierStatus, FinancialStatus, ListingStatus, Role, SaleStatus, SellerTier, ShipmentDirection,
    TimeStamp, VerificationStatus,
};
pub use verification::Verification;
