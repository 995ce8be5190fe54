use serde::Deserialize;
use serde_json::{Value, json};

use wardstock_core::{ItemId, UserId};
use wardstock_infra::{EntryView, LedgerFilter, Page, Pagination, StockAudit};
use wardstock_inventory::{Item, ItemPatch, LedgerEntry, NewItem};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub name: String,
    pub picture_path: Option<String>,
    pub reorder_threshold: Option<i64>,
}

impl From<CreateItemRequest> for NewItem {
    fn from(body: CreateItemRequest) -> Self {
        NewItem {
            name: body.name,
            picture_path: body.picture_path,
            reorder_threshold: body.reorder_threshold,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub picture_path: Option<String>,
    pub reorder_threshold: Option<i64>,
}

impl From<UpdateItemRequest> for ItemPatch {
    fn from(body: UpdateItemRequest) -> Self {
        ItemPatch {
            name: body.name,
            picture_path: body.picture_path,
            reorder_threshold: body.reorder_threshold,
        }
    }
}

/// Body of `POST /stock` and `POST /stockUsage`.
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub item: String,
    pub quantity: i64,
}

/// Body of `PUT /stock/{id}` and `PUT /stockUsage/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEntryRequest {
    pub item: Option<String>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemSearchQuery {
    pub search: Option<String>,
}

/// Ledger listing query. Values stay raw strings so garbage falls back to
/// defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub item: Option<String>,
    pub user: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl LedgerQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_params(
            lenient_int(self.page.as_deref()),
            lenient_int(self.limit.as_deref()),
            lenient_int(self.skip.as_deref()),
        )
        .with_paged(self.page.is_some())
    }

    /// Filter from `item` and (when `honor_user`) `user`. Unparseable ids
    /// are reported as `Err(field)`.
    pub fn filter(&self, honor_user: bool) -> Result<LedgerFilter, &'static str> {
        let item_id = parse_opt::<ItemId>(self.item.as_deref()).map_err(|_| "item")?;
        let created_by = if honor_user {
            parse_opt::<UserId>(self.user.as_deref()).map_err(|_| "user")?
        } else {
            None
        };
        Ok(LedgerFilter {
            item_id,
            created_by,
        })
    }
}

fn lenient_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_opt<T: std::str::FromStr>(raw: Option<&str>) -> Result<Option<T>, T::Err> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn item_to_json(item: &Item) -> Value {
    json!({
        "id": item.id.to_string(),
        "name": item.name,
        "picturePath": item.picture_path,
        "reorderThreshold": item.reorder_threshold,
        "currentStock": item.current_stock,
        "dateCreated": item.created_at.to_rfc3339(),
        "lastUpdated": item.updated_at.to_rfc3339(),
    })
}

pub fn items_to_json(items: &[Item]) -> Value {
    Value::Array(items.iter().map(item_to_json).collect())
}

pub fn entry_to_json(entry: &LedgerEntry, item_name: Option<&str>) -> Value {
    json!({
        "id": entry.id.to_string(),
        "item": {
            "id": entry.item_id.to_string(),
            "name": item_name,
        },
        "quantity": entry.quantity.get(),
        "createdBy": entry.created_by.to_string(),
        "dateAdded": entry.created_at.to_rfc3339(),
        "lastUpdated": entry.updated_at.to_rfc3339(),
    })
}

pub fn view_to_json(view: &EntryView) -> Value {
    entry_to_json(&view.entry, view.item_name.as_deref())
}

/// Paged envelope when the caller asked for a page, plain array otherwise.
pub fn page_to_json(page: &Page<EntryView>) -> Value {
    let items: Vec<Value> = page.items.iter().map(view_to_json).collect();
    if !page.pagination.paged {
        return Value::Array(items);
    }

    json!({
        "items": items,
        "totalItems": page.total,
        "page": page.pagination.page,
        "limit": page.pagination.limit,
        "totalPages": page.total_pages(),
    })
}

pub fn audit_to_json(audit: &StockAudit) -> Value {
    json!({
        "itemId": audit.item_id.to_string(),
        "currentStock": audit.current_stock,
        "ledgerStock": audit.ledger_stock,
        "consistent": audit.consistent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_pagination_falls_back_to_defaults() {
        let q = LedgerQuery {
            page: Some("abc".to_string()),
            limit: Some("-4".to_string()),
            ..LedgerQuery::default()
        };
        let p = q.pagination();
        assert_eq!((p.page, p.limit, p.offset), (1, 10, 0));
        assert!(p.paged);
    }

    #[test]
    fn skip_overrides_page_offset() {
        let q = LedgerQuery {
            page: Some("2".to_string()),
            limit: Some("5".to_string()),
            skip: Some("1".to_string()),
            ..LedgerQuery::default()
        };
        assert_eq!(q.pagination().offset, 1);
    }

    #[test]
    fn user_filter_is_dropped_unless_honored() {
        let user = UserId::new();
        let q = LedgerQuery {
            user: Some(user.to_string()),
            ..LedgerQuery::default()
        };
        assert_eq!(q.filter(false).unwrap().created_by, None);
        assert_eq!(q.filter(true).unwrap().created_by, Some(user));
    }

    #[test]
    fn malformed_item_filter_names_the_field() {
        let q = LedgerQuery {
            item: Some("not-a-uuid".to_string()),
            ..LedgerQuery::default()
        };
        assert_eq!(q.filter(true), Err("item"));
    }
}
