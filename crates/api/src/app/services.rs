//! Infrastructure wiring: picks the store backend and builds the service.

use std::sync::Arc;

use anyhow::Context;

use wardstock_infra::{
    AppConfig, InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StockService,
    StoreBackend,
};

/// Store handle shared by every request.
pub type SharedStore = Arc<dyn InventoryStore>;

/// Application services shared by all handlers.
pub struct AppServices {
    pub stock: StockService<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore) -> Self {
        Self {
            stock: StockService::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()))
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match &config.store {
        StoreBackend::InMemory => {
            tracing::info!("using in-memory stores");
            Ok(AppServices::in_memory())
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresInventoryStore::connect(database_url, *max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store
                .migrate()
                .await
                .context("failed to apply database schema")?;
            tracing::info!(max_connections, "using Postgres stores");
            Ok(AppServices::new(Arc::new(store)))
        }
    }
}
