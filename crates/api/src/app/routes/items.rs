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

use wardstock_core::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{OpAuth, authorize_command, perms};
use crate::context::PrincipalContext;

/// Item reads that need no credential.
pub fn public_router() -> Router {
    Router::new()
        .route("/", get(list_items))
        .route("/:id", get(get_item))
}

/// Item routes behind the auth middleware.
pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(create_item))
        .route("/low-stock", get(list_low_stock))
        .route("/low-stock/all", get(list_low_stock))
        .route("/:id", axum::routing::put(update_item).delete(delete_item))
        .route("/:id/audit", get(audit_item))
}

fn parse_item_id(raw: &str) -> Result<ItemId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("item"))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ItemSearchQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::bad_query(e),
    };

    match services.stock.list_items(query.search.as_deref()).await {
        Ok(items) => (StatusCode::OK, Json(dto::items_to_json(&items))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.get_item(id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateItemRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authorize_command(&principal, &OpAuth::new([perms::ITEMS_WRITE])) {
        return errors::forbidden(e);
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::bad_body(e),
    };

    match services.stock.create_item(body.into()).await {
        Ok(item) => (StatusCode::CREATED, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateItemRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authorize_command(&principal, &OpAuth::new([perms::ITEMS_WRITE])) {
        return errors::forbidden(e);
    }
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::bad_body(e),
    };

    match services.stock.update_item(id, body.into()).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authorize_command(&principal, &OpAuth::new([perms::ITEMS_WRITE])) {
        return errors::forbidden(e);
    }
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.delete_item(id).await {
        Ok(item) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Item deleted successfully",
                "item": dto::item_to_json(&item),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authorize_command(&principal, &OpAuth::new([perms::LOW_STOCK_READ])) {
        return errors::forbidden(e);
    }

    match services.stock.list_low_stock().await {
        Ok(items) => (StatusCode::OK, Json(dto::items_to_json(&items))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn audit_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authorize_command(&principal, &OpAuth::new([perms::ITEMS_AUDIT])) {
        return errors::forbidden(e);
    }
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.audit_item(id).await {
        Ok(audit) => (StatusCode::OK, Json(dto::audit_to_json(&audit))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
