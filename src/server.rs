use crate::api::auth;
use crate::api::stats;
use crate::ingest::handler::{ingest_visitor, AppState};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Permissive CORS on ingest: the tracking snippet posts from any site
    let ingestion_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    // Restrictive CORS for the query endpoints
    let query_cors = build_query_cors(state.allowed_origin.as_deref());

    let ingestion_routes = Router::new()
        .route("/analytics/visitor", post(ingest_visitor))
        .layer(DefaultBodyLimit::max(state.max_payload_bytes))
        .layer(ingestion_cors);

    // Query routes — bearer-token gated
    let query_routes = Router::new()
        .route("/analytics/visitors", get(stats::list_visitors))
        .route("/analytics/stats", get(stats::get_stats))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ))
        .layer(query_cors);

    let api_routes = Router::new()
        .merge(ingestion_routes)
        .merge(query_routes)
        .route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(30),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build CORS layer for query routes based on configured origin.
fn build_query_cors(allowed_origin: Option<&str>) -> CorsLayer {
    allowed_origin.map_or_else(
        || {
            // No origin configured — allow all origins.
            // Set `allowed_origin` in config to restrict cross-origin access.
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        },
        |origin| {
            let allowed_origin = origin
                .parse::<axum::http::HeaderValue>()
                .unwrap_or_else(|_| axum::http::HeaderValue::from_static("*"));
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        },
    )
}

/// GET /api/health — Health check with storage connectivity.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let storage = if state.store.is_connected() {
        "connected"
    } else {
        "disconnected"
    };

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "storage": storage,
    }))
}
