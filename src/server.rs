use axum::{
    middleware as axum_mw,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::CaptureConfig;
use crate::dashboard::stream;
use crate::handlers;
use crate::middleware::capture::{self, Capture};
use crate::AppState;

/// Path prefixes served by the monitor itself. The binary adds these to
/// the ignore list so the dashboard does not record its own traffic.
pub const OWN_ROUTE_PREFIXES: &[&str] = &["/api", "/dashboard"];

/// Builds the full Axum `Router` with all routes, middleware, and static serving.
pub fn create_router(state: Arc<AppState>, capture: &CaptureConfig, static_dir: &str) -> Router {
    let capture = Arc::new(Capture::new(state.monitor.clone(), capture));

    Router::new()
        // ── Stats ───────────────────────────────────────────────
        .route("/api/stats", get(handlers::requests::get_stats))
        // ── Request log ─────────────────────────────────────────
        .route(
            "/api/requests",
            get(handlers::requests::search_requests)
                .delete(handlers::requests::prune_requests),
        )
        .route("/api/requests/:id", get(handlers::requests::get_request))
        // ── Dashboard ───────────────────────────────────────────
        .route("/api/dashboard", get(stream::get_dashboard))
        .route("/api/dashboard/stream", get(stream::dashboard_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Serve static/ directory for the dashboard UI ────────
        .nest_service("/dashboard", ServeDir::new(static_dir))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            capture,
            capture::capture_middleware,
        ))
        .layer(CorsLayer::permissive())
}
