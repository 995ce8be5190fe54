//! Postgres-backed inventory store.
//!
//! ## Atomic reconciliation
//!
//! [`PostgresInventoryStore::commit`] runs in one transaction:
//! 1. Lock every affected item row (`SELECT ... FOR UPDATE`, ordered by id)
//! 2. Lock the corrected or deleted entry row and compare it with the entry
//!    the plan was computed from (`Conflict` on mismatch)
//! 3. Check required items and stock guards against the locked counters
//! 4. Project the new counters with overflow checks
//! 5. Write the ledger mutation, then the projected counters
//!
//! Items are always locked before the entry, and in id order, so concurrent
//! commits touching the same rows do not deadlock.
//!
//! ## Error mapping
//!
//! | SQLx error | Code | StoreError |
//! |------------|------|------------|
//! | Database (unique violation on `items.name`) | `23505` | `Rejected(Conflict)` |
//! | Database (numeric value out of range) | `22003` | `Rejected(Validation)` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use wardstock_core::{DomainError, EntryId, ItemId, UserId};
use wardstock_inventory::{Item, LedgerEntry, LedgerKind, LedgerMutation, Quantity, Reconciliation};

use super::{InventoryStore, LedgerFilter, LedgerTotals, Page, Pagination, StoreError};

const SCHEMA: &str = include_str!("schema.sql");

const ITEM_COLUMNS: &str =
    "id, name, picture_path, reorder_threshold, current_stock, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, kind, item_id, quantity, created_by, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Lock the rows of `ids` and return their counters. Missing ids are absent.
    async fn lock_items(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
    ) -> Result<HashMap<ItemId, i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, current_stock FROM items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("commit.lock_items", e))?;

        rows.iter()
            .map(|row| -> Result<(ItemId, i64), sqlx::Error> {
                let id: Uuid = row.try_get("id")?;
                let stock: i64 = row.try_get("current_stock")?;
                Ok((ItemId::from_uuid(id), stock))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|e| map_sqlx_error("commit.lock_items", e))
    }

    /// Lock the stored row of the entry a correction or delete was planned
    /// from. Inserts lock nothing.
    async fn lock_entry(
        tx: &mut Transaction<'_, Postgres>,
        mutation: &LedgerMutation,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let entry = match mutation {
            LedgerMutation::Insert(_) => return Ok(None),
            LedgerMutation::Update { before, .. } => before,
            LedgerMutation::Delete(entry) => entry,
        };
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1 AND kind = $2 FOR UPDATE"
        ))
        .bind(entry.id.as_uuid())
        .bind(entry.kind.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("commit.lock_entry", e))?;

        row.map(|r| decode_entry("commit.lock_entry", &r)).transpose()
    }

    async fn write_mutation(
        tx: &mut Transaction<'_, Postgres>,
        mutation: &LedgerMutation,
    ) -> Result<(), StoreError> {
        let (affected, entry) = match mutation {
            LedgerMutation::Insert(entry) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO ledger_entries
                        (id, kind, item_id, quantity, created_by, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(entry.id.as_uuid())
                .bind(entry.kind.as_str())
                .bind(entry.item_id.as_uuid())
                .bind(entry.quantity.get())
                .bind(entry.created_by.as_uuid())
                .bind(entry.created_at)
                .bind(entry.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("commit.insert_entry", e))?;
                (result.rows_affected(), entry)
            }
            LedgerMutation::Update { after, .. } => {
                let result = sqlx::query(
                    r#"
                    UPDATE ledger_entries
                    SET item_id = $3, quantity = $4, updated_at = $5
                    WHERE id = $1 AND kind = $2
                    "#,
                )
                .bind(after.id.as_uuid())
                .bind(after.kind.as_str())
                .bind(after.item_id.as_uuid())
                .bind(after.quantity.get())
                .bind(after.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("commit.update_entry", e))?;
                (result.rows_affected(), after)
            }
            LedgerMutation::Delete(entry) => {
                let result = sqlx::query("DELETE FROM ledger_entries WHERE id = $1 AND kind = $2")
                    .bind(entry.id.as_uuid())
                    .bind(entry.kind.as_str())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("commit.delete_entry", e))?;
                (result.rows_affected(), entry)
            }
        };

        if affected == 0 {
            return Err(DomainError::not_found(entry.kind.record_label()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items
                (id, name, picture_path, reorder_threshold, current_stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.picture_path)
        .bind(item.reorder_threshold)
        .bind(item.current_stock)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_item_write_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.map(|r| decode_item("get_item", &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self, search: Option<&str>) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE ($1::text IS NULL OR strpos(lower(name), lower($1)) > 0)
            ORDER BY name COLLATE "C", id
            "#
        ))
        .bind(search)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(|r| decode_item("list_items", r)).collect()
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn update_item(&self, item: &Item) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE items
            SET name = $2, picture_path = $3, reorder_threshold = $4, updated_at = $5
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.picture_path)
        .bind(item.reorder_threshold)
        .bind(item.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_item_write_error("update_item", e))?;

        row.map(|r| decode_item("update_item", &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn delete_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM items WHERE id = $1 RETURNING {ITEM_COLUMNS}"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        row.map(|r| decode_item("delete_item", &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_low_stock(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE current_stock <= reorder_threshold
            ORDER BY current_stock ASC, name COLLATE "C"
            "#
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock", e))?;

        rows.iter().map(|r| decode_item("list_low_stock", r)).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_entry(&self, kind: LedgerKind, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1 AND kind = $2"
        ))
        .bind(id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entry", e))?;

        row.map(|r| decode_entry("get_entry", &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_entries(
        &self,
        kind: LedgerKind,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let total = self.count_entries(kind, filter).await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE kind = $1
              AND ($2::uuid IS NULL OR item_id = $2)
              AND ($3::uuid IS NULL OR created_by = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(kind.as_str())
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.created_by.map(|u| *u.as_uuid()))
        .bind(i64::try_from(pagination.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(pagination.offset).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;

        let items = rows
            .iter()
            .map(|r| decode_entry("list_entries", r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            pagination,
        })
    }

    #[instrument(skip(self), err)]
    async fn count_entries(&self, kind: LedgerKind, filter: &LedgerFilter) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM ledger_entries
            WHERE kind = $1
              AND ($2::uuid IS NULL OR item_id = $2)
              AND ($3::uuid IS NULL OR created_by = $3)
            "#,
        )
        .bind(kind.as_str())
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.created_by.map(|u| *u.as_uuid()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_entries", e))?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), err)]
    async fn ledger_totals(&self, item_id: ItemId) -> Result<LedgerTotals, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(quantity) FILTER (WHERE kind = 'addition'), 0)::BIGINT AS added,
                COALESCE(SUM(quantity) FILTER (WHERE kind = 'usage'), 0)::BIGINT AS used
            FROM ledger_entries
            WHERE item_id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_totals", e))?;

        Ok(LedgerTotals {
            added: row
                .try_get("added")
                .map_err(|e| map_sqlx_error("ledger_totals", e))?,
            used: row
                .try_get("used")
                .map_err(|e| map_sqlx_error("ledger_totals", e))?,
        })
    }

    #[instrument(
        skip(self, plan),
        fields(entry_id = %plan.entry().id, kind = plan.entry().kind.as_str()),
        err
    )]
    async fn commit(&self, plan: &Reconciliation) -> Result<(), StoreError> {
        let mut ids: Vec<Uuid> = plan
            .required_items()
            .into_iter()
            .chain(plan.deltas.iter().map(|d| d.item_id))
            .map(|id| *id.as_uuid())
            .collect();
        ids.sort();
        ids.dedup();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("commit.begin", e))?;

        let stock = Self::lock_items(&mut tx, &ids).await?;
        let stored = Self::lock_entry(&mut tx, &plan.mutation).await?;
        plan.check_current(stored.as_ref())?;

        for item_id in plan.required_items() {
            if !stock.contains_key(&item_id) {
                return Err(DomainError::not_found("Item").into());
            }
        }
        for guard in &plan.guards {
            let available = stock
                .get(&guard.item_id)
                .copied()
                .ok_or_else(|| DomainError::not_found("Item"))?;
            guard.check(available)?;
        }

        let mut projected: HashMap<ItemId, i64> = HashMap::new();
        for delta in &plan.deltas {
            let Some(current) = stock.get(&delta.item_id).copied() else {
                tracing::warn!(
                    item_id = %delta.item_id,
                    delta = delta.delta,
                    "stock delta targets a missing item; skipped"
                );
                continue;
            };
            let current = projected.get(&delta.item_id).copied().unwrap_or(current);
            projected.insert(delta.item_id, delta.applied_to(current)?);
        }

        Self::write_mutation(&mut tx, &plan.mutation).await?;

        let now = Utc::now();
        for (item_id, current_stock) in projected {
            sqlx::query("UPDATE items SET current_stock = $2, updated_at = $3 WHERE id = $1")
                .bind(item_id.as_uuid())
                .bind(current_stock)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("commit.apply_delta", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit.commit", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003") => {
            DomainError::validation("stock counter out of range").into()
        }
        sqlx::Error::Database(db_err) => StoreError::backend(
            operation,
            format!(
                "database error ({}): {}",
                db_err.code().as_deref().unwrap_or("unknown"),
                db_err.message()
            ),
        ),
        sqlx::Error::PoolClosed => StoreError::backend(operation, "connection pool closed"),
        other => StoreError::backend(operation, other.to_string()),
    }
}

/// Item writes turn the `items.name` unique violation into a conflict.
fn map_item_write_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        return DomainError::conflict("Item with this name already exists").into();
    }
    map_sqlx_error(operation, err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    name: String,
    picture_path: String,
    reorder_threshold: i64,
    current_stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            picture_path: row.try_get("picture_path")?,
            reorder_threshold: row.try_get("reorder_threshold")?,
            current_stock: row.try_get("current_stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId::from_uuid(row.id),
            name: row.name,
            picture_path: row.picture_path,
            reorder_threshold: row.reorder_threshold,
            current_stock: row.current_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct EntryRow {
    id: Uuid,
    kind: String,
    item_id: Uuid,
    quantity: i64,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = String;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "addition" => LedgerKind::Addition,
            "usage" => LedgerKind::Usage,
            other => return Err(format!("unknown ledger kind {other:?}")),
        };
        let quantity = Quantity::new(row.quantity).map_err(|e| e.to_string())?;

        Ok(LedgerEntry {
            id: EntryId::from_uuid(row.id),
            kind,
            item_id: ItemId::from_uuid(row.item_id),
            quantity,
            created_by: UserId::from_uuid(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_item(operation: &'static str, row: &PgRow) -> Result<Item, StoreError> {
    ItemRow::from_row(row)
        .map(Item::from)
        .map_err(|e| StoreError::backend(operation, format!("failed to decode item row: {e}")))
}

fn decode_entry(operation: &'static str, row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let raw = EntryRow::from_row(row)
        .map_err(|e| StoreError::backend(operation, format!("failed to decode entry row: {e}")))?;
    LedgerEntry::try_from(raw)
        .map_err(|e| StoreError::backend(operation, format!("invalid entry row: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, quantity: i64) -> EntryRow {
        let now = Utc::now();
        EntryRow {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            item_id: Uuid::now_v7(),
            quantity,
            created_by: Uuid::now_v7(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn entry_rows_decode_kind_and_quantity() {
        let entry = LedgerEntry::try_from(row("usage", 4)).unwrap();
        assert_eq!(entry.kind, LedgerKind::Usage);
        assert_eq!(entry.signed_quantity(), -4);
    }

    #[test]
    fn corrupt_entry_rows_are_rejected() {
        assert!(LedgerEntry::try_from(row("transfer", 1)).is_err());
        assert!(LedgerEntry::try_from(row("addition", 0)).is_err());
    }

    #[test]
    fn schema_declares_both_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS items"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS ledger_entries"));
    }
}
