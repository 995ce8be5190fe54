//! Stock-addition (`/stock`) and stock-usage (`/stockUsage`) ledgers.
//!
//! One router serves both; the ledger is picked by the `LedgerKind`
//! extension layered on at mount time.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use wardstock_core::{EntryId, ItemId};
use wardstock_inventory::LedgerKind;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{OpAuth, authorize_command, has_permission, ledger_permissions, perms};
use crate::context::PrincipalContext;

pub fn router(kind: LedgerKind) -> Router {
    Router::new()
        .route("/", get(list_entries).post(create_entry))
        .route("/count", get(count_entries))
        .route("/:id", get(get_entry).put(update_entry).delete(delete_entry))
        .layer(Extension(kind))
}

fn parse_entry_id(raw: &str) -> Result<EntryId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("entry"))
}

fn parse_item_ref(raw: &str) -> Result<ItemId, axum::response::Response> {
    raw.trim().parse().map_err(|_| errors::invalid_id("item"))
}

/// Additions honor the author filter for anyone; usage only for callers
/// allowed to look across users.
fn honors_user_filter(kind: LedgerKind, principal: &PrincipalContext) -> bool {
    match kind {
        LedgerKind::Addition => true,
        LedgerKind::Usage => has_permission(principal, &perms::USAGE_READ_ANY_USER),
    }
}

fn query_filter(
    kind: LedgerKind,
    principal: &PrincipalContext,
    query: &dto::LedgerQuery,
) -> Result<wardstock_infra::LedgerFilter, axum::response::Response> {
    query
        .filter(honors_user_filter(kind, principal))
        .map_err(errors::invalid_id)
}

pub async fn create_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    body: Result<Json<dto::CreateEntryRequest>, JsonRejection>,
) -> axum::response::Response {
    let (_, create, _) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([create])) {
        return errors::forbidden(e);
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::bad_body(e),
    };
    let item_id = match parse_item_ref(&body.item) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .stock
        .record_entry(kind, item_id, body.quantity, principal.user_id())
        .await
    {
        Ok(view) => (StatusCode::CREATED, Json(dto::view_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    query: Result<Query<dto::LedgerQuery>, QueryRejection>,
) -> axum::response::Response {
    let (read, _, _) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([read])) {
        return errors::forbidden(e);
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::bad_query(e),
    };
    let filter = match query_filter(kind, &principal, &query) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services
        .stock
        .list_entries(kind, &filter, query.pagination())
        .await
    {
        Ok(page) => (StatusCode::OK, Json(dto::page_to_json(&page))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn count_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    query: Result<Query<dto::LedgerQuery>, QueryRejection>,
) -> axum::response::Response {
    let (read, _, _) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([read])) {
        return errors::forbidden(e);
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::bad_query(e),
    };
    let filter = match query_filter(kind, &principal, &query) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.stock.count_entries(kind, &filter).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "count": count }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let (read, _, _) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([read])) {
        return errors::forbidden(e);
    }
    let id = match parse_entry_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.get_entry(kind, id).await {
        Ok(view) => (StatusCode::OK, Json(dto::view_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateEntryRequest>, JsonRejection>,
) -> axum::response::Response {
    let (_, _, manage) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([manage])) {
        return errors::forbidden(e);
    }
    let id = match parse_entry_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::bad_body(e),
    };
    let item_id = match body.item.as_deref().map(parse_item_ref).transpose() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .stock
        .correct_entry(kind, id, body.quantity, item_id)
        .await
    {
        Ok(view) => (StatusCode::OK, Json(dto::view_to_json(&view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<LedgerKind>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let (_, _, manage) = ledger_permissions(kind);
    if let Err(e) = authorize_command(&principal, &OpAuth::new([manage])) {
        return errors::forbidden(e);
    }
    let id = match parse_entry_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.remove_entry(kind, id).await {
        Ok(entry) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": format!("{} deleted successfully", kind.record_label()),
                "id": entry.id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
