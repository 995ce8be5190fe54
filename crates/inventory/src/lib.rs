//! Ward supply domain: items, stock ledgers, and counter reconciliation.
//!
//! This crate contains business rules implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage). Stores receive a
//! [`Reconciliation`] and commit it; they never decide deltas themselves.

pub mod item;
pub mod ledger;
pub mod reconcile;

pub use item::{DEFAULT_PICTURE_PATH, DEFAULT_REORDER_THRESHOLD, Item, ItemPatch, NewItem};
pub use ledger::{EntryCorrection, LedgerEntry, LedgerKind, Quantity, net_stock};
pub use reconcile::{LedgerMutation, Reconciliation, StockDelta, StockGuard};
