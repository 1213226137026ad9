use crate::api::errors::ApiError;
use crate::ingest::handler::AppState;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Middleware guarding the query endpoints with the shared-secret bearer
/// token. Ingest is intentionally not behind this gate. On failure nothing
/// touches storage.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token_matches(token, &state.api_token) => Ok(next.run(request).await),
        Some(_) => Err(ApiError::Unauthorized("invalid bearer token".to_string())),
        None => Err(ApiError::Unauthorized(
            "missing bearer token".to_string(),
        )),
    }
}

/// Constant-time token equality. Length mismatch short-circuits, which leaks
/// only the secret's length, not its content.
pub fn token_matches(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    provided.len() == expected.len() && bool::from(provided.ct_eq(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(token_matches("hunter2", "hunter2"));
    }

    #[test]
    fn test_wrong_token() {
        assert!(!token_matches("hunter3", "hunter2"));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(!token_matches("hunter", "hunter2"));
        assert!(!token_matches("hunter22", "hunter2"));
    }

    #[test]
    fn test_empty_provided() {
        assert!(!token_matches("", "hunter2"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!token_matches("Hunter2", "hunter2"));
    }
}
