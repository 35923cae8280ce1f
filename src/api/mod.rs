use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

pub mod handlers;

/// Build the core API router.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/access", post(handlers::request_access))
        .route("/credentials", post(handlers::issue_credential))
        .route("/credentials/trial", post(handlers::issue_trial))
        .route(
            "/credentials/:id",
            get(handlers::get_credential),
        )
        .route("/credentials/:id/revoke", post(handlers::revoke_credential))
        .route("/resources", post(handlers::create_resource))
        .route(
            "/resources/:id",
            delete(handlers::deactivate_resource),
        )
        .route("/resources/:id/access", post(handlers::set_resource_access))
        .route(
            "/resources/:id/membership",
            get(handlers::check_membership),
        )
        .route("/audit", get(handlers::query_audit))
        .route("/origins/:origin", get(handlers::origin_status))
        .route("/origins/:origin/block", post(handlers::block_origin))
        .route("/origins/:origin/unblock", post(handlers::unblock_origin))
}
