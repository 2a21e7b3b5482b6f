//! HTTP request handlers and application state.
//!
//! `/hello` and `/world` are the gated reference routes; they only run after
//! the admission gate in [`create_router`](crate::api::create_router) has let
//! the request through. `/health` and `/metrics` are not gated.

use crate::api::gate::AdmissionGate;
use crate::api::metrics;
use crate::api::models::HealthResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Instant;

/// Shared application state passed to every handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Credential check and bucket store shared by all gated routes.
    pub gate: AdmissionGate,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
}

pub async fn hello() -> &'static str {
    "Hello World"
}

pub async fn world() -> &'static str {
    "Welcome to the World"
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.gate.store();
    let config = store.config();
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        buckets: store.len(),
        capacity: config.capacity(),
        window_secs: config.window().as_secs(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };
    (StatusCode::OK, Json(body))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    metrics::update_bucket_metrics(state.gate.store());
    state.prometheus_handle.render()
}
