//! Operation handlers for items and the two stock ledgers.
//!
//! `StockService` is the application-level orchestration between HTTP
//! handlers and an [`InventoryStore`]:
//!
//! ```text
//! request
//!   ↓
//! 1. Load the records the operation refers to (NotFound early)
//!   ↓
//! 2. Validate input (pure domain constructors)
//!   ↓
//! 3. Plan the reconciliation (pure, wardstock-inventory)
//!   ↓
//! 4. Commit atomically (store re-checks guards under lock)
//! ```
//!
//! Authorization happens before a handler reaches this layer.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use wardstock_core::{DomainError, EntryId, ItemId, UserId};
use wardstock_inventory::{
    EntryCorrection, Item, ItemPatch, LedgerEntry, LedgerKind, NewItem, Quantity, Reconciliation,
};

use crate::store::{InventoryStore, LedgerFilter, Page, Pagination, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("not enough stock available (available: {available}, requested: {requested})")]
    InsufficientStock { available: i64, requested: i64 },
    #[error("{0}")]
    Store(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(_) => ServiceError::NotFound(value.to_string()),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::InvalidArgument(msg)
            }
            DomainError::InsufficientStock {
                available,
                requested,
            } => ServiceError::InsufficientStock {
                available,
                requested,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(domain) => domain.into(),
            backend @ StoreError::Backend { .. } => ServiceError::Store(backend.to_string()),
        }
    }
}

/// A ledger entry with the name of the item it refers to.
///
/// `item_name` is `None` when the item has been deleted since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub entry: LedgerEntry,
    pub item_name: Option<String>,
}

/// Counter-versus-ledger comparison for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockAudit {
    pub item_id: ItemId,
    pub current_stock: i64,
    pub ledger_stock: i64,
    pub consistent: bool,
}

#[derive(Debug, Clone)]
pub struct StockService<S> {
    store: S,
}

impl<S> StockService<S>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // ---- items ----

    pub async fn create_item(&self, new: NewItem) -> Result<Item, ServiceError> {
        let item = Item::create(new, Utc::now())?;
        self.store.insert_item(&item).await?;
        tracing::info!(item_id = %item.id, name = %item.name, "item created");
        Ok(item)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, ServiceError> {
        self.store
            .get_item(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Item").into())
    }

    /// All items, optionally narrowed to names containing `search`.
    pub async fn list_items(&self, search: Option<&str>) -> Result<Vec<Item>, ServiceError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        Ok(self.store.list_items(search).await?)
    }

    pub async fn update_item(&self, id: ItemId, patch: ItemPatch) -> Result<Item, ServiceError> {
        let current = self.get_item(id).await?;
        let next = current.patched(patch, Utc::now())?;
        let stored = self
            .store
            .update_item(&next)
            .await?
            .ok_or_else(|| ServiceError::from(DomainError::not_found("Item")))?;
        tracing::info!(item_id = %id, "item updated");
        Ok(stored)
    }

    /// Delete an item. Ledger entries referring to it are kept.
    pub async fn delete_item(&self, id: ItemId) -> Result<Item, ServiceError> {
        let removed = self
            .store
            .delete_item(id)
            .await?
            .ok_or_else(|| ServiceError::from(DomainError::not_found("Item")))?;
        tracing::info!(item_id = %id, name = %removed.name, "item deleted");
        Ok(removed)
    }

    pub async fn list_low_stock(&self) -> Result<Vec<Item>, ServiceError> {
        Ok(self.store.list_low_stock().await?)
    }

    /// Recompute an item's stock from both ledgers and compare with its counter.
    pub async fn audit_item(&self, id: ItemId) -> Result<StockAudit, ServiceError> {
        let item = self.get_item(id).await?;
        let totals = self.store.ledger_totals(id).await?;
        let ledger_stock = totals.net();

        if ledger_stock != item.current_stock {
            tracing::warn!(
                item_id = %id,
                current_stock = item.current_stock,
                ledger_stock,
                "stock counter drifted from ledger totals"
            );
        }

        Ok(StockAudit {
            item_id: id,
            current_stock: item.current_stock,
            ledger_stock,
            consistent: ledger_stock == item.current_stock,
        })
    }

    // ---- ledgers ----

    /// Record stock in (`Addition`) or stock out (`Usage`) against an item.
    pub async fn record_entry(
        &self,
        kind: LedgerKind,
        item_id: ItemId,
        quantity: i64,
        actor: UserId,
    ) -> Result<EntryView, ServiceError> {
        let item = self.get_item(item_id).await?;
        let quantity = Quantity::new(quantity)?;

        let entry = LedgerEntry::record(kind, item_id, quantity, actor, Utc::now());
        let plan = Reconciliation::record(entry);
        self.store.commit(&plan).await?;

        let entry = plan.entry().clone();
        tracing::info!(
            kind = kind.as_str(),
            entry_id = %entry.id,
            item_id = %item_id,
            delta = entry.signed_quantity(),
            "ledger entry recorded"
        );
        Ok(EntryView {
            entry,
            item_name: Some(item.name),
        })
    }

    /// Admin correction of an entry's quantity and/or item reference.
    pub async fn correct_entry(
        &self,
        kind: LedgerKind,
        entry_id: EntryId,
        quantity: Option<i64>,
        item_id: Option<ItemId>,
    ) -> Result<EntryView, ServiceError> {
        let before = self.load_entry(kind, entry_id).await?;
        let correction = EntryCorrection {
            quantity: quantity.map(Quantity::new).transpose()?,
            item_id,
        };
        if let Some(target) = item_id {
            self.get_item(target).await?;
        }

        let plan = Reconciliation::correct(before, correction, Utc::now())?;
        self.store.commit(&plan).await?;

        tracing::info!(
            kind = kind.as_str(),
            entry_id = %entry_id,
            deltas = ?plan.deltas,
            "ledger entry corrected"
        );
        self.view(plan.entry().clone()).await
    }

    /// Delete an entry and reverse its contribution to the item's stock.
    pub async fn remove_entry(&self, kind: LedgerKind, entry_id: EntryId) -> Result<LedgerEntry, ServiceError> {
        let entry = self.load_entry(kind, entry_id).await?;
        let plan = Reconciliation::remove(entry);
        self.store.commit(&plan).await?;

        tracing::info!(
            kind = kind.as_str(),
            entry_id = %entry_id,
            deltas = ?plan.deltas,
            "ledger entry deleted"
        );
        Ok(plan.entry().clone())
    }

    pub async fn get_entry(&self, kind: LedgerKind, entry_id: EntryId) -> Result<EntryView, ServiceError> {
        let entry = self.load_entry(kind, entry_id).await?;
        self.view(entry).await
    }

    /// Newest-first page of entries matching `filter`.
    pub async fn list_entries(
        &self,
        kind: LedgerKind,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<Page<EntryView>, ServiceError> {
        let page = self.store.list_entries(kind, filter, pagination).await?;

        let mut views = Vec::with_capacity(page.items.len());
        for entry in &page.items {
            views.push(self.view(entry.clone()).await?);
        }
        Ok(Page {
            items: views,
            total: page.total,
            pagination: page.pagination,
        })
    }

    pub async fn count_entries(&self, kind: LedgerKind, filter: &LedgerFilter) -> Result<u64, ServiceError> {
        Ok(self.store.count_entries(kind, filter).await?)
    }

    async fn load_entry(&self, kind: LedgerKind, entry_id: EntryId) -> Result<LedgerEntry, ServiceError> {
        self.store
            .get_entry(kind, entry_id)
            .await?
            .ok_or_else(|| DomainError::not_found(kind.record_label()).into())
    }

    async fn view(&self, entry: LedgerEntry) -> Result<EntryView, ServiceError> {
        let item_name = self.store.get_item(entry.item_id).await?.map(|i| i.name);
        Ok(EntryView { entry, item_name })
    }
}
