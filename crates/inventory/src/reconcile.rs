//! Stock-counter reconciliation.
//!
//! Every ledger mutation that changes the net quantity attributed to an item
//! is planned here together with the signed deltas it implies. A store commits
//! the whole [`Reconciliation`] as one unit: guards first, then the ledger
//! write, then the deltas.

use chrono::{DateTime, Utc};

use wardstock_core::{DomainError, DomainResult, ItemId};

use crate::ledger::{EntryCorrection, LedgerEntry, LedgerKind};

/// Signed change to one item's `current_stock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockDelta {
    pub item_id: ItemId,
    pub delta: i64,
}

impl StockDelta {
    /// The counter after this delta. Rejected when it would leave the `i64` range.
    pub fn applied_to(&self, current: i64) -> DomainResult<i64> {
        current
            .checked_add(self.delta)
            .ok_or_else(|| DomainError::validation("stock counter out of range"))
    }
}

/// Precondition `current_stock >= required` on one item, checked at commit time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockGuard {
    pub item_id: ItemId,
    pub required: i64,
}

impl StockGuard {
    pub fn check(&self, available: i64) -> DomainResult<()> {
        if available < self.required {
            return Err(DomainError::insufficient_stock(available, self.required));
        }
        Ok(())
    }
}

/// The ledger write half of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerMutation {
    Insert(LedgerEntry),
    Update { before: LedgerEntry, after: LedgerEntry },
    Delete(LedgerEntry),
}

/// A ledger mutation paired with the counter updates that keep
/// `current_stock == Σ additions − Σ usage` for every affected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub mutation: LedgerMutation,
    pub guards: Vec<StockGuard>,
    pub deltas: Vec<StockDelta>,
}

impl Reconciliation {
    /// A new entry: `+q` for additions, `−q` (guarded by `q`) for usage.
    pub fn record(entry: LedgerEntry) -> Self {
        let item_id = entry.item_id;
        let quantity = entry.quantity.get();

        let guards = match entry.kind {
            LedgerKind::Usage => vec![StockGuard { item_id, required: quantity }],
            LedgerKind::Addition => Vec::new(),
        };
        let deltas = vec![StockDelta {
            item_id,
            delta: entry.signed_quantity(),
        }];

        Self {
            mutation: LedgerMutation::Insert(entry),
            guards,
            deltas,
        }
    }

    /// An admin correction of quantity and/or item reference.
    ///
    /// Same item: one delta of `sign × (new − old)`, skipped when zero; usage
    /// growth is guarded by the increase. Moved to another item: the old
    /// contribution is reversed on the old item and the new one applied on the
    /// new item (usage guarded by the full new quantity).
    pub fn correct(
        before: LedgerEntry,
        correction: EntryCorrection,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let after = before.corrected(correction, now)?;
        let sign = before.kind.sign();

        let mut guards = Vec::new();
        let mut deltas = Vec::new();

        if after.item_id == before.item_id {
            let diff = after.quantity.get() - before.quantity.get();
            if before.kind == LedgerKind::Usage && diff > 0 {
                guards.push(StockGuard {
                    item_id: after.item_id,
                    required: diff,
                });
            }
            if diff != 0 {
                deltas.push(StockDelta {
                    item_id: after.item_id,
                    delta: sign * diff,
                });
            }
        } else {
            if before.kind == LedgerKind::Usage {
                guards.push(StockGuard {
                    item_id: after.item_id,
                    required: after.quantity.get(),
                });
            }
            deltas.push(StockDelta {
                item_id: before.item_id,
                delta: -before.signed_quantity(),
            });
            deltas.push(StockDelta {
                item_id: after.item_id,
                delta: after.signed_quantity(),
            });
        }

        Ok(Self {
            mutation: LedgerMutation::Update { before, after },
            guards,
            deltas,
        })
    }

    /// Deleting an entry reverses its contribution.
    pub fn remove(entry: LedgerEntry) -> Self {
        let deltas = vec![StockDelta {
            item_id: entry.item_id,
            delta: -entry.signed_quantity(),
        }];

        Self {
            mutation: LedgerMutation::Delete(entry),
            guards: Vec::new(),
            deltas,
        }
    }

    /// The entry as it stands after the mutation (or as it was, for deletes).
    pub fn entry(&self) -> &LedgerEntry {
        match &self.mutation {
            LedgerMutation::Insert(e) | LedgerMutation::Delete(e) => e,
            LedgerMutation::Update { after, .. } => after,
        }
    }

    /// Compare the stored entry with the one this plan was computed from.
    ///
    /// Corrections and deletes are planned from a read taken before the
    /// commit; if the entry's item or quantity changed since, the deltas are
    /// stale and the commit must not proceed. Inserts have nothing to compare.
    pub fn check_current(&self, stored: Option<&LedgerEntry>) -> DomainResult<()> {
        let expected = match &self.mutation {
            LedgerMutation::Insert(_) => return Ok(()),
            LedgerMutation::Update { before, .. } => before,
            LedgerMutation::Delete(entry) => entry,
        };
        match stored {
            None => Err(DomainError::not_found(expected.kind.record_label())),
            Some(s) if s.item_id != expected.item_id || s.quantity != expected.quantity => Err(
                DomainError::conflict(format!(
                    "{} was modified concurrently; reload and retry",
                    expected.kind.record_label()
                )),
            ),
            Some(_) => Ok(()),
        }
    }

    /// Items whose stock must exist for the commit to proceed.
    ///
    /// Deltas against an item deleted after the entry was written are skipped
    /// by stores; guarded items and freshly referenced items are required.
    pub fn required_items(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.guards.iter().map(|g| g.item_id).collect();
        match &self.mutation {
            LedgerMutation::Insert(e) => ids.push(e.item_id),
            LedgerMutation::Update { before, after } if before.item_id != after.item_id => {
                ids.push(after.item_id)
            }
            _ => {}
        }
        ids.sort();
        ids.dedup();
        ids
    }
}
