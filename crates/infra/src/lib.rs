//! Infrastructure layer: stores, operation handlers, configuration.

pub mod config;
pub mod service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError, StoreBackend};
pub use service::{EntryView, ServiceError, StockAudit, StockService};
pub use store::{
    InMemoryInventoryStore, InventoryStore, LedgerFilter, LedgerTotals, Page, Pagination,
    PostgresInventoryStore, StoreError,
};
