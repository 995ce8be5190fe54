//! Storage boundary for items and the two stock ledgers.
//!
//! Stores are dumb about business rules: they persist what they are given and
//! commit [`Reconciliation`]s atomically (guards, ledger write and counter
//! deltas succeed or fail together).

pub mod in_memory;
pub mod postgres;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use wardstock_core::{DomainError, EntryId, ItemId};
use wardstock_inventory::{Item, LedgerEntry, LedgerKind, Reconciliation};

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::{LedgerFilter, Page, Pagination};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the write for a domain reason (duplicate name,
    /// insufficient stock at commit time, record vanished concurrently).
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// The backend itself failed.
    #[error("store error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// Ledger sums for one item, used to audit the denormalized counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub added: i64,
    pub used: i64,
}

impl LedgerTotals {
    pub fn net(&self) -> i64 {
        self.added.saturating_sub(self.used)
    }
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Insert a new item. Duplicate names are rejected with `Conflict`.
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Items whose name contains `search` (case-insensitive), ordered by name.
    async fn list_items(&self, search: Option<&str>) -> Result<Vec<Item>, StoreError>;

    /// Write the editable fields (name, picture, threshold) of `item`.
    ///
    /// `current_stock` is never written from here; the returned item carries
    /// the stored counter. `None` when the item does not exist.
    async fn update_item(&self, item: &Item) -> Result<Option<Item>, StoreError>;

    /// Remove an item, returning it. Ledger entries are left in place.
    async fn delete_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Items at or below their reorder threshold, lowest stock first.
    async fn list_low_stock(&self) -> Result<Vec<Item>, StoreError>;

    async fn get_entry(&self, kind: LedgerKind, id: EntryId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Entries newest first (creation time, then id, descending).
    async fn list_entries(
        &self,
        kind: LedgerKind,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<Page<LedgerEntry>, StoreError>;

    async fn count_entries(&self, kind: LedgerKind, filter: &LedgerFilter) -> Result<u64, StoreError>;

    async fn ledger_totals(&self, item_id: ItemId) -> Result<LedgerTotals, StoreError>;

    /// Atomically check that a corrected or deleted entry is unchanged since
    /// `plan` was computed, check guards, apply the ledger mutation and apply
    /// every stock delta of `plan`. A delta that would overflow the counter
    /// rejects the whole commit.
    async fn commit(&self, plan: &Reconciliation) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        (**self).insert_item(item).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(id).await
    }

    async fn list_items(&self, search: Option<&str>) -> Result<Vec<Item>, StoreError> {
        (**self).list_items(search).await
    }

    async fn update_item(&self, item: &Item) -> Result<Option<Item>, StoreError> {
        (**self).update_item(item).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).delete_item(id).await
    }

    async fn list_low_stock(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_low_stock().await
    }

    async fn get_entry(&self, kind: LedgerKind, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).get_entry(kind, id).await
    }

    async fn list_entries(
        &self,
        kind: LedgerKind,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        (**self).list_entries(kind, filter, pagination).await
    }

    async fn count_entries(&self, kind: LedgerKind, filter: &LedgerFilter) -> Result<u64, StoreError> {
        (**self).count_entries(kind, filter).await
    }

    async fn ledger_totals(&self, item_id: ItemId) -> Result<LedgerTotals, StoreError> {
        (**self).ledger_totals(item_id).await
    }

    async fn commit(&self, plan: &Reconciliation) -> Result<(), StoreError> {
        (**self).commit(plan).await
    }
}
