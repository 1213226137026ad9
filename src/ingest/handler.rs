use crate::api::errors::ApiError;
use crate::ingest::ratelimit::{Decision, RateLimiter};
use crate::ingest::validate::{self, RawEvent};
use crate::storage::{EventStore, StorageError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state threaded through every handler.
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub rate_limiter: RateLimiter,
    /// Shared secret for the bearer-token gate on query endpoints.
    pub api_token: String,
    /// Bound on a single storage write at ingest.
    pub storage_timeout: Duration,
    /// CORS origin for the query endpoints; `None` allows any.
    pub allowed_origin: Option<String>,
    pub max_payload_bytes: usize,
}

/// POST /api/analytics/visitor — Ingestion endpoint.
///
/// Anonymous by design: the tracking client cannot hold credentials. The
/// payload is validated and canonicalized, stamped with the server clock and
/// the resolved client address, then written through the store with a bounded
/// timeout. A missing backing store degrades to accepted-and-dropped rather
/// than surfacing an error to end-user-facing instrumentation.
pub async fn ingest_visitor(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<RawEvent>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client_ip = resolve_client_ip(&headers, peer);

    if let Decision::Limited { retry_after_secs } = state.rate_limiter.check(&client_ip) {
        return Err(ApiError::RateLimited { retry_after_secs });
    }

    // Surface body rejections through the regular error envelope instead of
    // axum's plain-text defaults. A body over the size cap dies here, before
    // the parse completes.
    let Json(payload) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Validation(rejection.body_text())
        }
    })?;

    let mut event = validate::validate(payload).map_err(|e| ApiError::Validation(e.to_string()))?;

    // Server-observed metadata is authoritative.
    event.timestamp = Utc::now();
    event.ip = Some(client_ip);

    let store = Arc::clone(&state.store);
    let insert = tokio::task::spawn_blocking(move || {
        let result = store.insert(&event);
        (result, event)
    });

    match tokio::time::timeout(state.storage_timeout, insert).await {
        Err(_) => Err(ApiError::Timeout(
            "storage write exceeded its time bound; the event may still be stored".to_string(),
        )),
        Ok(Err(join_err)) => Err(ApiError::Internal(format!("insert task panicked: {join_err}"))),
        Ok(Ok((Ok(()), event))) => {
            // A disconnected store swallows writes without erroring, so the
            // degraded answer keys off connectivity rather than the result.
            if state.store.is_connected() {
                tracing::debug!(visitor = %event.id, "Event recorded");
                Ok(Json(serde_json::json!({
                    "success": true,
                    "message": "event recorded",
                })))
            } else {
                tracing::warn!(visitor = %event.id, "Event dropped, no backing store");
                Ok(Json(degraded_ack()))
            }
        }
        Ok(Ok((Err(StorageError::Unavailable(msg)), event))) => {
            tracing::warn!(visitor = %event.id, error = %msg, "Event dropped, storage unavailable");
            Ok(Json(degraded_ack()))
        }
        Ok(Ok((Err(e), _))) => {
            tracing::error!(error = %e, "Failed to store event");
            Err(ApiError::Internal("failed to store event".to_string()))
        }
    }
}

/// Response body for an event accepted while storage is down. Still a
/// success: end-user-facing instrumentation never retries on our account.
fn degraded_ack() -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "message": "event accepted",
        "warning": "storage unavailable, event not persisted",
    })
}

/// Resolve the client address: first non-empty hop of `x-forwarded-for`,
/// then `x-real-ip`, then the socket peer address.
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
        })
        .map_or_else(|| peer.ip().to_string(), ToString::to_string)
}
