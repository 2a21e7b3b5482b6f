//! Global configuration constants for keygate.
//!
//! Server defaults live here as compile-time constants; runtime configuration is
//! handled via CLI arguments and environment variables in the server's `main.rs`.
//! [`StoreConfig`] is the validated, construction-time bucket configuration.

use std::time::Duration;

/// Default burst size: tokens a fresh bucket can hold.
pub const DEFAULT_CAPACITY: u32 = 5;

/// Default window (in seconds) over which `capacity` tokens fully regenerate.
///
/// With [`DEFAULT_CAPACITY`] this yields one token every 12 seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 8083;

/// Request header carrying the caller credential.
///
/// Lowercase so it can be used with `HeaderName::from_static`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Environment variable holding the JSON array of valid API keys.
pub const API_KEYS_ENV: &str = "KEYGATE_API_KEYS";

/// Default interval (in seconds) between idle-bucket sweeps. 0 = disabled.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of concurrent in-flight requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 512;

/// Rejected bucket configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A bucket that holds no tokens would reject every request.
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    /// A zero-length window implies an infinite refill rate.
    #[error("window must be at least one second")]
    ZeroWindow,
}

/// Process-wide bucket parameters, fixed at construction.
///
/// Every bucket holds at most `capacity` tokens and regains `capacity` tokens
/// over `window`, i.e. refills at `capacity / window` tokens per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    capacity: u32,
    window: Duration,
}

impl StoreConfig {
    /// Validates and builds a configuration.
    ///
    /// Fails fast on a zero `capacity` or a zero `window_secs`.
    pub fn new(capacity: u32, window_secs: u64) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            capacity,
            window: Duration::from_secs(window_secs),
        })
    }

    /// Maximum tokens per bucket (burst size).
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time over which an empty bucket refills completely.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Refill rate in tokens per second. Informational only; refill
    /// arithmetic is done in exact integer nanoseconds.
    pub fn refill_rate(&self) -> f64 {
        self.capacity as f64 / self.window.as_secs_f64()
    }

    pub(crate) fn window_nanos(&self) -> u128 {
        self.window.as_nanos()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}
