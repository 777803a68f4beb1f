pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use chrono::Duration;
use std::sync::Arc;

use config::Config;
use services::{
    AvailabilityResolver, GroupPurchaseEngine, IdentityProvider, JwtIdentity, PurchaseEngine,
    ReservationManager,
};
use store::{CatalogStore, GroupStore, InventoryStore, MemoryCatalog, MemoryStore};

// Shared state for every request handler
pub struct AppState {
    pub config: Config,
    pub inventory: Arc<dyn InventoryStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub availability: AvailabilityResolver,
    pub reservations: ReservationManager,
    pub purchases: PurchaseEngine,
    pub groups: GroupPurchaseEngine,
}

impl AppState {
    /// Wires the engines over the given stores. The same store object usually
    /// backs both `inventory` and `groups` so group commits share its transactions.
    pub fn new(
        config: Config,
        inventory: Arc<dyn InventoryStore>,
        groups: Arc<dyn GroupStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Arc<Self> {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(JwtIdentity::new(&config.jwt.secret, config.jwt.expires_in_hours));
        let ttl = Duration::minutes(config.reservation.ttl_minutes);

        let purchases = PurchaseEngine::new(inventory.clone(), catalog.clone());
        Arc::new(Self {
            availability: AvailabilityResolver::new(inventory.clone(), catalog.clone()),
            reservations: ReservationManager::new(inventory.clone(), catalog.clone(), ttl),
            groups: GroupPurchaseEngine::new(groups, purchases.clone()),
            purchases,
            identity,
            inventory,
            config,
        })
    }

    /// Fully in-process instance over a caller-owned catalog.
    pub fn in_memory(config: Config, catalog: Arc<MemoryCatalog>) -> Arc<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store, catalog)
    }
}
