//! # keygate-core
//!
//! Per-key admission control built on token buckets with lazy refill.
//!
//! This is the synchronous core with zero async dependencies. A
//! [`TokenBucketStore`](store::TokenBucketStore) owns one bucket per credential
//! key and decides, under a single lock, whether each request is admitted.

/// Monotonic time sources: the system clock and a manually driven clock.
pub mod clock;
/// Global configuration constants and the validated [`StoreConfig`](config::StoreConfig).
pub mod config;
/// Credential validity lookup consulted before any bucket is charged.
pub mod credentials;
/// Token bucket store: key registry, refill arithmetic, and admission decisions.
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, StoreConfig};
pub use credentials::{CredentialStore, StaticCredentials};
pub use store::{Admission, TokenBucketStore};
