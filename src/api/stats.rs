use crate::api::errors::ApiError;
use crate::event::VisitorEvent;
use crate::ingest::handler::{resolve_client_ip, AppState};
use crate::ingest::ratelimit::Decision;
use crate::query::aggregate::{self, AggregateStats};
use crate::query::window;
use crate::storage::{DistinctField, StorageError};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Query parameters for the stats endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub time_range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Aggregate stats plus an explicit degradation marker: a disconnected store
/// yields zeroed numbers, never silently fabricated ones.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: AggregateStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// GET /api/analytics/stats — Aggregate statistics over a time window.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let client_ip = resolve_client_ip(&headers, peer);
    if let Decision::Limited { retry_after_secs } = state.rate_limiter.check(&client_ip) {
        return Err(ApiError::RateLimited { retry_after_secs });
    }

    let now = Utc::now();
    let (from, to) = window::resolve_window(
        params.time_range.as_deref(),
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        now,
    )
    .map_err(|e| ApiError::Validation(e.to_string()))?;

    let store = Arc::clone(&state.store);
    let stats = tokio::task::spawn_blocking(move || -> Result<AggregateStats, StorageError> {
        let events = store.scan_range(from, to)?;
        let unique_visitors = store.count_distinct(DistinctField::VisitorId, from, to)?;
        let total_sessions = store.count_distinct(DistinctField::SessionId, from, to)?;
        // Realtime is pinned to the wall clock, not the requested window, so
        // a historical query still reports who is on the site right now.
        let horizon = now - Duration::minutes(aggregate::REALTIME_WINDOW_MINUTES);
        let active = store.scan_range(horizon, now)?;
        let real_time_visitors = aggregate::count_active_visitors(&active, now);
        Ok(aggregate::compute_stats(
            &events,
            unique_visitors,
            total_sessions,
            real_time_visitors,
        ))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("query task panicked: {e}")))??;

    let warning = (!state.store.is_connected())
        .then(|| "storage disconnected, statistics are empty".to_string());

    Ok(Json(StatsResponse { stats, warning }))
}

/// Query parameters for the raw-event listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    1000
}

/// GET /api/analytics/visitors — Stored events, newest first.
pub async fn list_visitors(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<VisitorsParams>,
) -> Result<Json<Vec<VisitorEvent>>, ApiError> {
    let client_ip = resolve_client_ip(&headers, peer);
    if let Decision::Limited { retry_after_secs } = state.rate_limiter.check(&client_ip) {
        return Err(ApiError::RateLimited { retry_after_secs });
    }

    let from = match params.start_date.as_deref() {
        Some(raw) => window::parse_date(raw).map_err(|e| ApiError::Validation(e.to_string()))?,
        None => DateTime::UNIX_EPOCH,
    };
    let to = match params.end_date.as_deref() {
        Some(raw) => window::parse_date(raw).map_err(|e| ApiError::Validation(e.to_string()))?,
        None => Utc::now(),
    };
    let limit = params.limit;

    let store = Arc::clone(&state.store);
    let events = tokio::task::spawn_blocking(move || store.recent(from, to, limit))
        .await
        .map_err(|e| ApiError::Internal(format!("query task panicked: {e}")))??;

    Ok(Json(events))
}
