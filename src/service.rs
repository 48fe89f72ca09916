//! Service layer entry point composing the marketplace workflows over one store
use std::sync::Arc;

use tracing::info;

use crate::config::MarketConfig;
use crate::courier::CourierService;
use crate::error::MarketResult;
use crate::favourite::FavouriteService;
use crate::identity::IdentityDirectory;
use crate::listing::ListingService;
use crate::reputation::ReputationService;
use crate::review::ReviewService;
use crate::sale::SaleService;
use crate::settlement::SettlementPolicy;
use crate::store::Store;
use crate::verification::VerificationService;

#[derive(Debug, Clone)]
pub struct Marketplace {
    store: Store,
    identity: IdentityDirectory,
    listings: ListingService,
    verification: VerificationService,
    sales: SaleService,
    reputation: ReputationService,
    reviews: ReviewService,
    favourites: FavouriteService,
    courier: CourierService,
}

impl Marketplace {
    pub fn new(instance: Arc<sled::Db>, policy: SettlementPolicy) -> MarketResult<Self> {
        Ok(Self::with_store(Store::new(instance)?, policy))
    }

    /// Open the database named by the configuration.
    pub fn from_config(config: &MarketConfig) -> MarketResult<Self> {
        let store = Store::open(&config.db_path)?;
        info!(
            db_path = %config.db_path.display(),
            commission_bps = config.settlement.commission_bps(),
            rounding = ?config.settlement.rounding(),
            courier = ?config.settlement.courier(),
            "marketplace opened"
        );
        Ok(Self::with_store(store, config.settlement))
    }

    pub fn with_store(store: Store, policy: SettlementPolicy) -> Self {
        let reputation = ReputationService::new(store.clone());
        Self {
            identity: IdentityDirectory::new(store.clone()),
            listings: ListingService::new(store.clone()),
            verification: VerificationService::new(store.clone()),
            sales: SaleService::new(store.clone(), policy),
            reviews: ReviewService::new(store.clone()),
            favourites: FavouriteService::new(store.clone()),
            courier: CourierService::new(store.clone()),
            reputation,
            store,
        }
    }

    pub fn identity(&self) -> &IdentityDirectory {
        &self.identity
    }

    pub fn listings(&self) -> &ListingService {
        &self.listings
    }

    pub fn verification(&self) -> &VerificationService {
        &self.verification
    }

    pub fn sales(&self) -> &SaleService {
        &self.sales
    }

    pub fn reputation(&self) -> &ReputationService {
        &self.reputation
    }

    pub fn reviews(&self) -> &ReviewService {
        &self.reviews
    }

    pub fn favourites(&self) -> &FavouriteService {
        &self.favourites
    }

    pub fn courier(&self) -> &CourierService {
        &self.courier
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.store.flush()
    }
}
