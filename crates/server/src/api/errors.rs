//! API error types mapped to HTTP status codes.
//!
//! Each [`ApiError`] variant maps to a specific HTTP status code and produces
//! a JSON response body `{"error": "message"}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;

/// Client-facing rejection produced by the admission gate.
///
/// - `Unauthorized` → 401
/// - `TooManyRequests` → 429 (with `Retry-After` header)
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unrecognized API key (401).
    Unauthorized(String),
    /// Per-key rate limit exceeded (429).
    TooManyRequests {
        /// Human-readable reason.
        message: String,
        /// Time until the key's bucket earns another token.
        retry_after: Duration,
    },
}

/// `Retry-After` takes whole seconds; round up so a client that honors it
/// never arrives early.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => {
                let body = axum::Json(json!({ "error": msg }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            }
            ApiError::TooManyRequests {
                message,
                retry_after,
            } => {
                let body = axum::Json(json!({ "error": message }));
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                resp.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(retry_after)),
                );
                resp
            }
        }
    }
}
