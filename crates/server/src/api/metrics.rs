//! Prometheus metrics recording and background collection.

use keygate_core::TokenBucketStore;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Records HTTP request metrics.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records one admission decision.
///
/// `outcome` is one of `admitted`, `missing_key`, `invalid_key`, `rate_limited`.
pub fn record_admission(outcome: &'static str) {
    counter!("keygate_admissions_total", "outcome" => outcome).increment(1);
}

/// Records buckets dropped by an idle sweep.
pub fn record_evictions(count: usize) {
    counter!("keygate_evictions_total").increment(count as u64);
}

/// Updates the `keygate_buckets_total` gauge.
pub fn update_bucket_metrics(store: &TokenBucketStore) {
    gauge!("keygate_buckets_total").set(store.len() as f64);
}
