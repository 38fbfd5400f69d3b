//! HTTP surface: shared state, router assembly and the health check.
//!
//! Two endpoint families with different error conventions share one router:
//!
//! ```text
//! /api/v1/links...      admin CRUD, structured HTTP statuses (404/403/400)
//! /api/v1/lnurl/...     LNURL protocol, always 200 with {"status": "ERROR"}
//! /health               liveness probe
//! ```

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::lifecycle::VoucherLifecycle;
use crate::protocol::RedemptionProtocol;

pub mod admin;
pub mod lnurl;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state, built once at process start and handed to every
/// handler. No ambient singletons.
#[derive(Clone)]
pub struct AppState {
    /// Administrative surface
    pub lifecycle: Arc<VoucherLifecycle>,
    /// Redemption state machine
    pub protocol: Arc<RedemptionProtocol>,
}

/// Assemble the full router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/links",
            get(admin::list_links).post(admin::create_link),
        )
        .route(
            "/api/v1/links/:link_id",
            get(admin::retrieve_link)
                .put(admin::update_link)
                .delete(admin::delete_link),
        )
        .route("/api/v1/lnurl/cb", get(lnurl::callback))
        .route("/api/v1/lnurl/:id_or_k1", get(lnurl::challenge))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" if responding
    pub status: String,
    /// Server version
    pub version: String,
}

/// `GET /health` - liveness probe for systemd and load balancers.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: SERVER_VERSION.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_shape() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, SERVER_VERSION);
    }
}
