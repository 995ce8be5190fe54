//! Read-side query parameters: ledger filters and pagination.

use serde::Serialize;

use wardstock_core::{ItemId, UserId};

/// Default page size when the caller gives none (or garbage).
pub const DEFAULT_LIMIT: u64 = 10;
/// Upper bound on page size.
pub const MAX_LIMIT: u64 = 1000;

/// Filter criteria for ledger listings and counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub item_id: Option<ItemId>,
    pub created_by: Option<UserId>,
}

impl LedgerFilter {
    pub fn matches(&self, item_id: ItemId, created_by: UserId) -> bool {
        self.item_id.is_none_or(|i| i == item_id) && self.created_by.is_none_or(|u| u == created_by)
    }
}

/// Resolved pagination window.
///
/// Supports both page-based (`page`, `limit`) and explicit skip-based
/// (`skip`, `limit`) addressing; `skip` wins when both are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
    /// Whether the caller asked for a page (and so expects the paged envelope).
    pub paged: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::from_params(None, None, None)
    }
}

impl Pagination {
    /// Resolve raw query values. Missing, zero or negative values fall back to
    /// defaults: page 1, limit 10.
    pub fn from_params(page: Option<i64>, limit: Option<i64>, skip: Option<i64>) -> Self {
        let paged = page.is_some();
        let page = page.filter(|p| *p >= 1).map(|p| p as u64).unwrap_or(1);
        let limit = limit
            .filter(|l| *l >= 1)
            .map(|l| (l as u64).min(MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);
        let offset = match skip.filter(|s| *s >= 0) {
            Some(s) => s as u64,
            None => (page - 1).saturating_mul(limit),
        };

        Self {
            page,
            limit,
            offset,
            paged,
        }
    }

    /// Override whether the paged envelope was asked for (e.g. `page=abc`
    /// still asks for it, even though the value falls back to 1).
    pub fn with_paged(self, paged: bool) -> Self {
        Self { paged, ..self }
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

/// One page of results plus the totals needed to render pagers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.pagination.total_pages(self.total)
    }
}
