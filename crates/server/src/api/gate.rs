//! Admission gate: credential extraction, validation, and rate limiting.
//!
//! Sits between the router and the application handlers. For every request it
//! reads the `X-API-KEY` header, checks the key against the configured
//! [`CredentialStore`], charges the key's bucket in the shared
//! [`TokenBucketStore`], and only then forwards the request unchanged.
//! Missing and unknown keys both get 401; an empty bucket gets 429.

use crate::api::audit;
use crate::api::errors::ApiError;
use crate::api::metrics;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue};
use axum::{middleware, Router};
use keygate_core::config::API_KEY_HEADER;
use keygate_core::{Admission, CredentialStore, TokenBucketStore};
use std::sync::Arc;

/// The collaborators the gate consults for each request.
///
/// Cheap to clone; both halves are shared.
#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<TokenBucketStore>,
    credentials: Arc<dyn CredentialStore>,
}

impl AdmissionGate {
    pub fn new(store: Arc<TokenBucketStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { store, credentials }
    }

    /// The bucket store requests are billed against.
    pub fn store(&self) -> &TokenBucketStore {
        &self.store
    }
}

/// Puts every route in `router` behind the admission gate.
///
/// Applied as a route layer, so unmatched paths still 404 without charging
/// any bucket.
pub fn wrap<S>(router: Router<S>, gate: AdmissionGate) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(gate, admission_middleware))
}

async fn admission_middleware(
    State(gate): State<AdmissionGate>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, ApiError> {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string());

    let Some(key) = key else {
        reject(&req, "anonymous", "missing_key");
        return Err(ApiError::Unauthorized("Missing API key".to_string()));
    };

    if !gate.credentials.is_valid(&key) {
        reject(&req, &audit::mask_key(&key), "invalid_key");
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    match gate.store.check(&key) {
        Admission::Limited { retry_after } => {
            reject(&req, &audit::mask_key(&key), "rate_limited");
            Err(ApiError::TooManyRequests {
                message: "Rate limit exceeded".to_string(),
                retry_after,
            })
        }
        Admission::Admitted { remaining } => {
            metrics::record_admission("admitted");
            let capacity = gate.store.config().capacity();
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(capacity),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(remaining),
            );
            Ok(response)
        }
    }
}

fn reject(req: &axum::http::Request<axum::body::Body>, actor: &str, outcome: &'static str) {
    metrics::record_admission(outcome);
    audit::audit_rejection(
        actor,
        &audit::extract_client_ip(req),
        req.uri().path(),
        outcome,
    );
}
