use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wardstock_core::{DomainError, DomainResult, Entity, EntryId, ItemId, UserId, ValueObject};

/// Which ledger an entry belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// "Stock in": quantity added to an item.
    Addition,
    /// "Stock out": quantity consumed from an item.
    Usage,
}

impl LedgerKind {
    /// Direction an entry of this kind moves `current_stock`.
    pub fn sign(self) -> i64 {
        match self {
            LedgerKind::Addition => 1,
            LedgerKind::Usage => -1,
        }
    }

    /// Human label used in error messages ("stock record", "stock usage record").
    pub fn record_label(self) -> &'static str {
        match self {
            LedgerKind::Addition => "stock record",
            LedgerKind::Usage => "stock usage record",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Addition => "addition",
            LedgerKind::Usage => "usage",
        }
    }
}

/// A strictly positive entry quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

/// One stock addition or stock usage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: LedgerKind,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin correction of an existing entry. At least one field must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCorrection {
    pub quantity: Option<Quantity>,
    pub item_id: Option<ItemId>,
}

impl LedgerEntry {
    pub fn record(
        kind: LedgerKind,
        item_id: ItemId,
        quantity: Quantity,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            kind,
            item_id,
            quantity,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Signed contribution of this entry to its item's stock.
    pub fn signed_quantity(&self) -> i64 {
        self.kind.sign() * self.quantity.get()
    }

    /// The entry as it reads after `correction`; id, author and creation time are kept.
    pub fn corrected(&self, correction: EntryCorrection, now: DateTime<Utc>) -> DomainResult<Self> {
        if correction.quantity.is_none() && correction.item_id.is_none() {
            return Err(DomainError::validation(
                "nothing to update: provide quantity and/or item",
            ));
        }

        Ok(Self {
            item_id: correction.item_id.unwrap_or(self.item_id),
            quantity: correction.quantity.unwrap_or(self.quantity),
            updated_at: now,
            ..self.clone()
        })
    }
}

impl Entity for LedgerEntry {
    type Id = EntryId;

    fn id(&self) -> EntryId {
        self.id
    }
}

/// Stock implied by a set of entries for one item: Σ additions − Σ usage.
pub fn net_stock<'a>(item_id: ItemId, entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
    entries
        .into_iter()
        .filter(|e| e.item_id == item_id)
        .map(LedgerEntry::signed_quantity)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(Quantity::new(1).is_ok());
        assert!(matches!(Quantity::new(0), Err(DomainError::Validation(_))));
        assert!(matches!(Quantity::new(-4), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quantity_deserialization_is_validated() {
        let ok: Quantity = serde_json::from_str("7").unwrap();
        assert_eq!(ok.get(), 7);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn correction_requires_a_field_and_keeps_identity() {
        let entry = LedgerEntry::record(
            LedgerKind::Usage,
            ItemId::new(),
            qty(4),
            UserId::new(),
            Utc::now(),
        );

        assert!(matches!(
            entry.corrected(EntryCorrection::default(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let fixed = entry
            .corrected(
                EntryCorrection {
                    quantity: Some(qty(9)),
                    item_id: None,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(fixed.id, entry.id);
        assert_eq!(fixed.item_id, entry.item_id);
        assert_eq!(fixed.created_by, entry.created_by);
        assert_eq!(fixed.created_at, entry.created_at);
        assert_eq!(fixed.quantity.get(), 9);
    }

    #[test]
    fn net_stock_sums_signed_quantities_for_one_item() {
        let item = ItemId::new();
        let other = ItemId::new();
        let user = UserId::new();
        let now = Utc::now();
        let entries = vec![
            LedgerEntry::record(LedgerKind::Addition, item, qty(15), user, now),
            LedgerEntry::record(LedgerKind::Usage, item, qty(12), user, now),
            LedgerEntry::record(LedgerKind::Addition, other, qty(100), user, now),
        ];

        assert_eq!(net_stock(item, &entries), 3);
        assert_eq!(net_stock(other, &entries), 100);
    }
}
