//! Per-key token bucket store.
//!
//! Each credential key gets its own bucket holding up to `capacity` tokens that
//! refills at `capacity / window` tokens per second. Refill is lazy: nothing
//! happens between requests, and each access credits the whole tokens earned
//! since the last refill.
//!
//! All buckets live in one map behind a single [`parking_lot::Mutex`]. The full
//! read-refill-consume sequence, including first-sight insertion, runs inside
//! one critical section, so concurrent requests for the same key are serialized
//! and a token is never spent twice.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request consumed a token.
    Admitted {
        /// Tokens left in the bucket after this request.
        remaining: u32,
    },
    /// The bucket is empty.
    Limited {
        /// Time until the bucket earns its next whole token.
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns `true` for [`Admission::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

struct Bucket {
    tokens: u32,
    /// Moves only when at least one whole token is credited.
    last_refill: Instant,
    /// Refill progress not yet worth a whole token, in nanosecond-tokens
    /// (elapsed nanos * capacity). Always below one window in nanos.
    carry: u128,
}

impl Bucket {
    /// The first request for a key is admitted immediately, so a new bucket
    /// starts one token short of full.
    fn fresh(now: Instant, config: &StoreConfig) -> Self {
        Self {
            tokens: config.capacity() - 1,
            last_refill: now,
            carry: 0,
        }
    }

    /// Credits whole tokens earned since `last_refill` and returns the
    /// remaining progress toward the next token, in nanosecond-tokens.
    fn refill(&mut self, now: Instant, config: &StoreConfig) -> u128 {
        let window = config.window_nanos();
        let capacity = u128::from(config.capacity());
        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let accrued = elapsed * capacity + self.carry;
        let whole = accrued / window;
        if whole == 0 {
            // Keep last_refill so the fractional progress keeps accumulating.
            return accrued;
        }

        self.last_refill = now;
        if u128::from(self.tokens) + whole >= capacity {
            self.tokens = config.capacity();
            self.carry = 0;
        } else {
            // whole < capacity - tokens, fits in u32
            self.tokens += whole as u32;
            self.carry = accrued % window;
        }
        self.carry
    }

    fn acquire(&mut self, now: Instant, config: &StoreConfig) -> Admission {
        let progress = self.refill(now, config);
        if self.tokens > 0 {
            self.tokens -= 1;
            Admission::Admitted {
                remaining: self.tokens,
            }
        } else {
            Admission::Limited {
                retry_after: time_to_next_token(progress, config),
            }
        }
    }
}

/// Wall time needed to turn `progress` nanosecond-tokens into one whole token.
fn time_to_next_token(progress: u128, config: &StoreConfig) -> Duration {
    let missing = config.window_nanos().saturating_sub(progress);
    let capacity = u128::from(config.capacity());
    let nanos = missing.div_ceil(capacity);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Registry of token buckets keyed by credential.
///
/// Construct one per process and share it behind an [`Arc`]. The map and its
/// lock are private; all mutation goes through [`check`](Self::check),
/// [`allow`](Self::allow) and [`sweep`](Self::sweep).
pub struct TokenBucketStore {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketStore {
    /// Creates an empty store driven by the system monotonic clock.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty store driven by a custom [`Clock`].
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns `true` if a request billed to `key` is admitted, consuming one token.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_admitted()
    }

    /// Refills the bucket for `key`, then tries to consume one token.
    ///
    /// A key seen for the first time gets a fresh bucket and is admitted with
    /// `capacity - 1` tokens left.
    pub fn check(&self, key: &str) -> Admission {
        let mut buckets = self.buckets.lock();
        let now = self.clock.now();
        if let Some(bucket) = buckets.get_mut(key) {
            return bucket.acquire(now, &self.config);
        }

        let bucket = Bucket::fresh(now, &self.config);
        let remaining = bucket.tokens;
        buckets.insert(key.to_owned(), bucket);
        Admission::Admitted { remaining }
    }

    /// Tokens currently stored for `key`, without refilling. `None` if unseen.
    pub fn tokens(&self, key: &str) -> Option<u32> {
        self.buckets.lock().get(key).map(|b| b.tokens)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Returns `true` if no key has been seen (or all have been swept).
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Drops buckets that have gone a full window without a refill.
    ///
    /// Such a bucket would be back at capacity on its next access, which is
    /// exactly the state a freshly created bucket produces, so eviction never
    /// changes an admission outcome. Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        let window = self.config.window();
        let mut buckets = self.buckets.lock();
        let now = self.clock.now();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_refill) < window);
        let evicted = before - buckets.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = buckets.len(), "swept idle buckets");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;
    use std::thread;

    fn store(capacity: u32, window_secs: u64) -> (TokenBucketStore, ManualClock) {
        let clock = ManualClock::new();
        let config = StoreConfig::new(capacity, window_secs).unwrap();
        let store = TokenBucketStore::with_clock(config, Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_first_sight_admits_and_leaves_capacity_minus_one() {
        let (store, _clock) = store(5, 60);
        assert_eq!(store.tokens("k"), None);
        assert!(store.allow("k"));
        assert_eq!(store.tokens("k"), Some(4));
    }

    #[test]
    fn test_burst_exhaustion() {
        let (store, _clock) = store(5, 60);
        let outcomes: Vec<bool> = (0..6).map(|_| store.allow("k")).collect();
        assert_eq!(outcomes, vec![true, true, true, true, true, false]);
        assert_eq!(store.tokens("k"), Some(0));
    }

    #[test]
    fn test_refill_after_one_token_interval() {
        let (store, clock) = store(5, 60);
        for _ in 0..5 {
            assert!(store.allow("k"));
        }
        assert!(!store.allow("k"));

        clock.advance(Duration::from_secs(12));
        assert!(store.allow("k"));
        assert!(!store.allow("k"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (store, _clock) = store(5, 60);
        while store.allow("a") {}
        assert!(!store.allow("a"));
        assert!(store.allow("b"));
        assert_eq!(store.tokens("b"), Some(4));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_fractional_progress_is_retained() {
        let (store, clock) = store(5, 60);
        while store.allow("k") {}

        // 7s is short of one token (12s); the clock must not restart.
        clock.advance(Duration::from_secs(7));
        assert!(!store.allow("k"));
        clock.advance(Duration::from_secs(3));
        assert!(!store.allow("k"));

        // 7 + 3 + 2 = 12s since the last credited token
        clock.advance(Duration::from_secs(2));
        assert!(store.allow("k"));
        assert!(!store.allow("k"));
    }

    #[test]
    fn test_sub_token_remainder_carries_over() {
        let (store, clock) = store(5, 60);
        while store.allow("k") {}

        // 18s earns one token plus 6s of progress toward the next.
        clock.advance(Duration::from_secs(18));
        assert!(store.allow("k"));
        assert!(!store.allow("k"));

        clock.advance(Duration::from_secs(6));
        assert!(store.allow("k"));
    }

    #[test]
    fn test_refill_clamps_to_capacity() {
        let (store, clock) = store(5, 60);
        assert!(store.allow("k"));
        clock.advance(Duration::from_secs(3600));
        assert!(store.allow("k"));
        assert_eq!(store.tokens("k"), Some(4));

        let admitted = (0..10).filter(|_| store.allow("k")).count();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let (store, clock) = store(3, 7);
        let steps = [0u64, 1, 0, 5, 0, 0, 2, 9, 0, 0, 0, 1, 30, 0, 0, 0, 0];
        for (i, secs) in steps.iter().cycle().take(200).enumerate() {
            clock.advance(Duration::from_millis(secs * 700 + i as u64 % 3));
            store.allow("k");
            let tokens = store.tokens("k").unwrap();
            assert!(tokens <= 3, "tokens {} exceed capacity", tokens);
        }
    }

    #[test]
    fn test_capacity_one_starts_empty() {
        let (store, clock) = store(1, 10);
        assert!(store.allow("k"));
        assert_eq!(store.tokens("k"), Some(0));
        assert!(!store.allow("k"));
        clock.advance(Duration::from_secs(10));
        assert!(store.allow("k"));
    }

    #[test]
    fn test_check_reports_remaining_and_retry_after() {
        let (store, clock) = store(5, 60);
        assert_eq!(store.check("k"), Admission::Admitted { remaining: 4 });
        for expected in (0..4).rev() {
            assert_eq!(
                store.check("k"),
                Admission::Admitted {
                    remaining: expected
                }
            );
        }
        assert_eq!(
            store.check("k"),
            Admission::Limited {
                retry_after: Duration::from_secs(12)
            }
        );

        clock.advance(Duration::from_secs(7));
        assert_eq!(
            store.check("k"),
            Admission::Limited {
                retry_after: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_retry_after_rounds_up_to_whole_nanos() {
        // 3 tokens / 1s: one token every 333_333_333.3ns
        let (store, _clock) = store(3, 1);
        while store.allow("k") {}
        assert_eq!(
            store.check("k"),
            Admission::Limited {
                retry_after: Duration::from_nanos(333_333_334)
            }
        );
    }

    #[test]
    fn test_sweep_evicts_only_fully_refilled_buckets() {
        let (store, clock) = store(5, 60);
        store.allow("old");
        clock.advance(Duration::from_secs(30));
        store.allow("recent");

        assert_eq!(store.sweep(), 0);
        clock.advance(Duration::from_secs(30));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.tokens("old"), None);
        assert_eq!(store.tokens("recent"), Some(4));
    }

    #[test]
    fn test_sweep_does_not_change_outcomes() {
        let (swept, swept_clock) = store(5, 60);
        let (kept, kept_clock) = store(5, 60);
        let gaps = [0u64, 0, 0, 61, 0, 0, 0, 0, 0, 0, 13, 0, 120, 0];

        for gap in gaps {
            swept_clock.advance(Duration::from_secs(gap));
            kept_clock.advance(Duration::from_secs(gap));
            swept.sweep();
            assert_eq!(swept.check("k"), kept.check("k"));
        }
    }

    #[test]
    fn test_empty_store() {
        let (store, _clock) = store(5, 60);
        assert!(store.is_empty());
        store.allow("k");
        assert!(!store.is_empty());
        assert_eq!(store.config().capacity(), 5);
    }

    #[test]
    fn test_concurrent_first_sight_admits_exactly_capacity() {
        const THREADS: usize = 16;
        const CAPACITY: u32 = 5;

        for _ in 0..50 {
            let (store, _clock) = store(CAPACITY, 60);
            let store = Arc::new(store);
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        store.allow("shared")
                    })
                })
                .collect();

            let admitted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&ok| ok)
                .count();
            assert_eq!(admitted, CAPACITY as usize);
            assert_eq!(store.tokens("shared"), Some(0));
            assert_eq!(store.len(), 1);
        }
    }

    #[test]
    fn test_concurrent_below_capacity_admits_all() {
        let (store, _clock) = store(10, 60);
        let store = Arc::new(store);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.allow("k"))
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert_eq!(store.tokens("k"), Some(6));
    }
}
