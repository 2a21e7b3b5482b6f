//! Response data transfer objects.

use serde::Serialize;

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is accepting requests.
    pub status: &'static str,
    /// Server version from Cargo metadata.
    pub version: &'static str,
    /// Number of keys with a live bucket.
    pub buckets: usize,
    /// Burst size per key.
    pub capacity: u32,
    /// Seconds for an empty bucket to refill completely.
    pub window_secs: u64,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}
