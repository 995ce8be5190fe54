use axum::{Router, routing::get};

use wardstock_inventory::LedgerKind;

pub mod items;
pub mod ledger;
pub mod system;

/// Routes reachable without a credential.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/items", items::public_router())
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/items", items::router())
        .nest("/stock", ledger::router(LedgerKind::Addition))
        .nest("/stockUsage", ledger::router(LedgerKind::Usage))
}
