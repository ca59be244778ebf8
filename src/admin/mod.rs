//! Operator HTTP API.
//!
//! `/health` is open; everything under `/admin` requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;

pub use self::handlers::{AdminState, ApiError};

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/reset", post(reset_all_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/breakers/{name}/open", post(open_breaker))
        .route("/admin/breakers/{name}/close", post(close_breaker))
        .route("/admin/backups", get(list_backups).post(create_backup))
        .route("/admin/backups/cleanup", post(cleanup_backups))
        .route("/admin/backups/{id}", delete(delete_backup))
        .route("/admin/backups/{id}/verify", post(verify_backup))
        .route("/admin/backups/{id}/restore", post(restore_backup))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(admin)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
