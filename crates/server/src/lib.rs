//! keygate-server — HTTP admission gateway for keygate.
//!
//! Provides the REST API, the admission gate middleware, and metrics.
//! Bucket logic lives in `keygate-core`.

/// REST API layer: Axum router, admission gate, handlers, models, audit, metrics.
pub mod api;
