//! Runtime configuration read from the environment.
//!
//! `MARKET_DB_PATH`, `MARKET_COMMISSION_BPS`, `MARKET_COMMISSION_ROUNDING`
//! (`half_up` | `floor`), `MARKET_COURIER_COSTS` (`buyer` | `seller`) and
//! `RUST_LOG`. A `.env` file in the working directory is honoured.
use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::settlement::{CourierPolicy, DEFAULT_COMMISSION_BPS, Rounding, SettlementPolicy};

pub const DEFAULT_DB_PATH: &str = "marketplace.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue { name, reason: reason.into() }
    }
}

impl Rounding {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "half_up" | "half-up" | "halfup" => Ok(Rounding::HalfUp),
            "floor" => Ok(Rounding::Floor),
            other => Err(ConfigError::invalid(
                "MARKET_COMMISSION_ROUNDING",
                format!("'{other}', expected half_up or floor"),
            )),
        }
    }
}

impl CourierPolicy {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "buyer" | "buyer_borne" => Ok(CourierPolicy::BuyerBorne),
            "seller" | "seller_borne" => Ok(CourierPolicy::SellerBorne),
            other => Err(ConfigError::invalid(
                "MARKET_COURIER_COSTS",
                format!("'{other}', expected buyer or seller"),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Directory of the sled database
    pub db_path: PathBuf,
    pub settlement: SettlementPolicy,
    /// Filter directive for the tracing subscriber (RUST_LOG)
    pub log_level: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            settlement: SettlementPolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("MARKET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let commission_bps = match lookup("MARKET_COMMISSION_BPS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                ConfigError::invalid(
                    "MARKET_COMMISSION_BPS",
                    format!("'{raw}' is not a whole number"),
                )
            })?,
            None => DEFAULT_COMMISSION_BPS,
        };

        let rounding = lookup("MARKET_COMMISSION_ROUNDING")
            .map(|s| Rounding::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let courier = lookup("MARKET_COURIER_COSTS")
            .map(|s| CourierPolicy::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let settlement = SettlementPolicy::new(commission_bps, rounding, courier)
            .map_err(|err| ConfigError::invalid("MARKET_COMMISSION_BPS", err.to_string()))?;

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(MarketConfig { db_path, settlement, log_level })
    }
}
