use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use wardstock_core::{DomainError, EntryId, ItemId};
use wardstock_inventory::{Item, LedgerEntry, LedgerKind, LedgerMutation, Reconciliation, StockDelta};

use super::{InventoryStore, LedgerFilter, LedgerTotals, Page, Pagination, StoreError};

const DUPLICATE_NAME: &str = "Item with this name already exists";

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    ledgers: HashMap<LedgerKind, BTreeMap<EntryId, LedgerEntry>>,
}

impl State {
    fn name_taken(&self, name: &str, except: Option<ItemId>) -> bool {
        self.items
            .values()
            .any(|i| i.name == name && Some(i.id) != except)
    }

    fn ledger(&self, kind: LedgerKind) -> impl Iterator<Item = &LedgerEntry> {
        self.ledgers.get(&kind).into_iter().flat_map(|l| l.values())
    }

    fn apply_mutation(&mut self, mutation: &LedgerMutation) -> Result<(), StoreError> {
        match mutation {
            LedgerMutation::Insert(entry) => {
                self.ledgers
                    .entry(entry.kind)
                    .or_default()
                    .insert(entry.id, entry.clone());
            }
            LedgerMutation::Update { after, .. } => {
                let slot = self
                    .ledgers
                    .get_mut(&after.kind)
                    .and_then(|l| l.get_mut(&after.id))
                    .ok_or_else(|| DomainError::not_found(after.kind.record_label()))?;
                *slot = after.clone();
            }
            LedgerMutation::Delete(entry) => {
                self.ledgers
                    .get_mut(&entry.kind)
                    .and_then(|l| l.remove(&entry.id))
                    .ok_or_else(|| DomainError::not_found(entry.kind.record_label()))?;
            }
        }
        Ok(())
    }

    fn stored_entry(&self, mutation: &LedgerMutation) -> Option<&LedgerEntry> {
        let entry = match mutation {
            LedgerMutation::Insert(e) | LedgerMutation::Delete(e) => e,
            LedgerMutation::Update { before, .. } => before,
        };
        self.ledgers.get(&entry.kind).and_then(|l| l.get(&entry.id))
    }

    /// Counters after every delta of `deltas`, without writing them. Deltas
    /// against a missing item are skipped.
    fn project_stock(&self, deltas: &[StockDelta]) -> Result<HashMap<ItemId, i64>, StoreError> {
        let mut projected: HashMap<ItemId, i64> = HashMap::new();
        for delta in deltas {
            let Some(item) = self.items.get(&delta.item_id) else {
                tracing::warn!(
                    item_id = %delta.item_id,
                    delta = delta.delta,
                    "stock delta targets a missing item; skipped"
                );
                continue;
            };
            let current = projected
                .get(&delta.item_id)
                .copied()
                .unwrap_or(item.current_stock);
            projected.insert(delta.item_id, delta.applied_to(current)?);
        }
        Ok(projected)
    }
}

/// In-memory inventory store.
///
/// Intended for tests/dev. A single lock serializes every commit, which makes
/// reconciliation trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::backend(operation, "lock poisoned"))
    }

    fn write(&self, operation: &'static str) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::backend(operation, "lock poisoned"))
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        let mut state = self.write("insert_item")?;
        if state.name_taken(&item.name, None) {
            return Err(DomainError::conflict(DUPLICATE_NAME).into());
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read("get_item")?.items.get(&id).cloned())
    }

    async fn list_items(&self, search: Option<&str>) -> Result<Vec<Item>, StoreError> {
        let needle = search.map(str::to_lowercase);
        let state = self.read("list_items")?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| {
                needle
                    .as_deref()
                    .is_none_or(|n| i.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn update_item(&self, item: &Item) -> Result<Option<Item>, StoreError> {
        let mut state = self.write("update_item")?;
        if !state.items.contains_key(&item.id) {
            return Ok(None);
        }
        if state.name_taken(&item.name, Some(item.id)) {
            return Err(DomainError::conflict(DUPLICATE_NAME).into());
        }

        let Some(stored) = state.items.get_mut(&item.id) else {
            return Ok(None);
        };
        stored.name = item.name.clone();
        stored.picture_path = item.picture_path.clone();
        stored.reorder_threshold = item.reorder_threshold;
        stored.updated_at = item.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.write("delete_item")?.items.remove(&id))
    }

    async fn list_low_stock(&self) -> Result<Vec<Item>, StoreError> {
        let state = self.read("list_low_stock")?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| i.is_low_stock())
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.current_stock
                .cmp(&b.current_stock)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn get_entry(&self, kind: LedgerKind, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let state = self.read("get_entry")?;
        Ok(state.ledgers.get(&kind).and_then(|l| l.get(&id)).cloned())
    }

    async fn list_entries(
        &self,
        kind: LedgerKind,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let state = self.read("list_entries")?;
        let mut matching: Vec<&LedgerEntry> = state
            .ledger(kind)
            .filter(|e| filter.matches(e.item_id, e.created_by))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(pagination.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            pagination,
        })
    }

    async fn count_entries(&self, kind: LedgerKind, filter: &LedgerFilter) -> Result<u64, StoreError> {
        let state = self.read("count_entries")?;
        Ok(state
            .ledger(kind)
            .filter(|e| filter.matches(e.item_id, e.created_by))
            .count() as u64)
    }

    async fn ledger_totals(&self, item_id: ItemId) -> Result<LedgerTotals, StoreError> {
        let state = self.read("ledger_totals")?;
        let sum = |kind| {
            state
                .ledger(kind)
                .filter(|e| e.item_id == item_id)
                .fold(0i64, |acc, e| acc.saturating_add(e.quantity.get()))
        };
        Ok(LedgerTotals {
            added: sum(LedgerKind::Addition),
            used: sum(LedgerKind::Usage),
        })
    }

    async fn commit(&self, plan: &Reconciliation) -> Result<(), StoreError> {
        let mut state = self.write("commit")?;

        plan.check_current(state.stored_entry(&plan.mutation))?;
        for item_id in plan.required_items() {
            if !state.items.contains_key(&item_id) {
                return Err(DomainError::not_found("Item").into());
            }
        }
        for guard in &plan.guards {
            let available = state
                .items
                .get(&guard.item_id)
                .map(|i| i.current_stock)
                .ok_or_else(|| DomainError::not_found("Item"))?;
            guard.check(available)?;
        }

        let projected = state.project_stock(&plan.deltas)?;

        state.apply_mutation(&plan.mutation)?;

        let now = Utc::now();
        for (item_id, stock) in projected {
            if let Some(item) = state.items.get_mut(&item_id) {
                item.current_stock = stock;
                item.updated_at = now;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wardstock_core::UserId;
    use wardstock_inventory::{EntryCorrection, NewItem, Quantity};

    fn item(name: &str) -> Item {
        Item::create(
            NewItem {
                name: name.to_string(),
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn entry(kind: LedgerKind, item_id: ItemId, n: i64) -> LedgerEntry {
        LedgerEntry::record(kind, item_id, Quantity::new(n).unwrap(), UserId::new(), Utc::now())
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let store = InMemoryInventoryStore::new();
        store.insert_item(&item("Gauze")).await.unwrap();

        let err = store.insert_item(&item("Gauze")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_guard_leaves_state_untouched() {
        let store = InMemoryInventoryStore::new();
        let gauze = item("Gauze");
        store.insert_item(&gauze).await.unwrap();

        let err = store
            .commit(&Reconciliation::record(entry(LedgerKind::Usage, gauze.id, 1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected(DomainError::InsufficientStock { available: 0, requested: 1 })
        ));

        let count = store
            .count_entries(LedgerKind::Usage, &LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.get_item(gauze.id).await.unwrap().unwrap().current_stock, 0);
    }

    #[tokio::test]
    async fn update_item_never_writes_the_counter() {
        let store = InMemoryInventoryStore::new();
        let gauze = item("Gauze");
        store.insert_item(&gauze).await.unwrap();
        store
            .commit(&Reconciliation::record(entry(LedgerKind::Addition, gauze.id, 7)))
            .await
            .unwrap();

        let mut edited = gauze.clone();
        edited.name = "Sterile gauze".to_string();
        edited.current_stock = 999;
        let stored = store.update_item(&edited).await.unwrap().unwrap();

        assert_eq!(stored.name, "Sterile gauze");
        assert_eq!(stored.current_stock, 7);
    }

    #[tokio::test]
    async fn deltas_for_deleted_items_are_skipped() {
        let store = InMemoryInventoryStore::new();
        let gauze = item("Gauze");
        store.insert_item(&gauze).await.unwrap();
        let added = entry(LedgerKind::Addition, gauze.id, 3);
        store.commit(&Reconciliation::record(added.clone())).await.unwrap();
        store.delete_item(gauze.id).await.unwrap();

        store.commit(&Reconciliation::remove(added.clone())).await.unwrap();
        assert!(store.get_entry(LedgerKind::Addition, added.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn plans_built_from_the_same_entry_commit_once() {
        let store = InMemoryInventoryStore::new();
        let gauze = item("Gauze");
        store.insert_item(&gauze).await.unwrap();
        let added = entry(LedgerKind::Addition, gauze.id, 5);
        store.commit(&Reconciliation::record(added.clone())).await.unwrap();

        let correction = |n| EntryCorrection {
            quantity: Some(Quantity::new(n).unwrap()),
            item_id: None,
        };
        let to_eight = Reconciliation::correct(added.clone(), correction(8), Utc::now()).unwrap();
        let to_ten = Reconciliation::correct(added.clone(), correction(10), Utc::now()).unwrap();
        let removal = Reconciliation::remove(added.clone());

        store.commit(&to_eight).await.unwrap();
        for stale in [&to_ten, &removal] {
            let err = store.commit(stale).await.unwrap_err();
            assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
        }

        let stored = store.get_item(gauze.id).await.unwrap().unwrap();
        let totals = store.ledger_totals(gauze.id).await.unwrap();
        assert_eq!(stored.current_stock, 8);
        assert_eq!(totals.net(), 8);
    }

    #[tokio::test]
    async fn counter_overflow_is_rejected_without_poisoning() {
        let store = InMemoryInventoryStore::new();
        let gauze = item("Gauze");
        store.insert_item(&gauze).await.unwrap();
        store
            .commit(&Reconciliation::record(entry(LedgerKind::Addition, gauze.id, i64::MAX)))
            .await
            .unwrap();

        let err = store
            .commit(&Reconciliation::record(entry(LedgerKind::Addition, gauze.id, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Validation(_))));

        let stored = store.get_item(gauze.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, i64::MAX);
        let count = store
            .count_entries(LedgerKind::Addition, &LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_sorted() {
        let store = InMemoryInventoryStore::new();
        for name in ["Syringe 5ml", "Gauze", "syringe 10ml"] {
            store.insert_item(&item(name)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_items(Some("SYRINGE"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Syringe 5ml", "syringe 10ml"]);
    }
}
