use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wardstock_core::{DomainError, DomainResult, Entity, ItemId};

/// Picture shown for items created without one.
pub const DEFAULT_PICTURE_PATH: &str = "https://eurzpxkjndcnhmdsggvs.supabase.co/storage/v1/object/public/picc-inventory-images/default-supply-image.png";

/// Stock level at or below which an item is reported as low stock, unless set.
pub const DEFAULT_REORDER_THRESHOLD: i64 = 10;

/// A trackable supply type.
///
/// `current_stock` is denormalized: it always equals the sum of additions
/// minus the sum of usage recorded against this item. Only a committed
/// [`crate::Reconciliation`] changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub picture_path: String,
    pub reorder_threshold: i64,
    pub current_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub picture_path: Option<String>,
    pub reorder_threshold: Option<i64>,
}

/// Admin edit of an item. Stock only moves through reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub picture_path: Option<String>,
    pub reorder_threshold: Option<i64>,
}

impl Item {
    /// Validate input and build a fresh item with zero stock.
    pub fn create(new: NewItem, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = validate_name(&new.name)?;
        let reorder_threshold = match new.reorder_threshold {
            Some(t) => validate_threshold(t)?,
            None => DEFAULT_REORDER_THRESHOLD,
        };

        Ok(Self {
            id: ItemId::new(),
            name,
            picture_path: picture_or_default(new.picture_path),
            reorder_threshold,
            current_stock: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Return a copy with the patch applied. Stock is carried over untouched.
    pub fn patched(&self, patch: ItemPatch, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = validate_name(&name)?;
        }
        if let Some(path) = patch.picture_path {
            next.picture_path = picture_or_default(Some(path));
        }
        if let Some(t) = patch.reorder_threshold {
            next.reorder_threshold = validate_threshold(t)?;
        }
        next.updated_at = now;
        Ok(next)
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_threshold
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> ItemId {
        self.id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn validate_threshold(threshold: i64) -> DomainResult<i64> {
    if threshold < 0 {
        return Err(DomainError::validation("reorderThreshold cannot be negative"));
    }
    Ok(threshold)
}

fn picture_or_default(path: Option<String>) -> String {
    match path {
        Some(p) if !p.trim().is_empty() => p,
        _ => DEFAULT_PICTURE_PATH.to_string(),
    }
}
