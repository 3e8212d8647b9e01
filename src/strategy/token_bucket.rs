//! Token bucket admission strategy.
//!
//! Each key owns a bucket of `capacity` tokens that refills to full
//! once per `refill_window` (whole-window refill, not continuous
//! drip). A request consumes one token; an empty bucket rejects with
//! the time remaining until the window rolls over.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::reaper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
use crate::registry::KeyedRegistry;
use crate::strategy::{Decision, RateLimitStrategy};

const NAME: &str = "token_bucket";

/// Default bucket capacity when an invalid value is supplied.
pub const DEFAULT_CAPACITY: u32 = 1;

/// Default refill window when an invalid value is supplied.
pub const DEFAULT_REFILL_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TokenBucketEntry {
    remaining: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct Inner {
    capacity: u32,
    refill_window: Duration,
    registry: KeyedRegistry<TokenBucketEntry>,
}

impl Inner {
    fn seed(&self, now: Instant) -> TokenBucketEntry {
        // The call that creates the entry consumes the first token.
        TokenBucketEntry {
            remaining: self.capacity - 1,
            reset_at: now + self.refill_window,
        }
    }

    fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        self.registry.admit(
            key,
            |entry| now >= entry.reset_at,
            || self.seed(now),
            |entry| {
                if entry.remaining > 0 {
                    entry.remaining -= 1;
                    Decision::admit()
                } else {
                    Decision::reject(entry.reset_at.saturating_duration_since(now))
                }
            },
        )
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let cutoff = self.refill_window;
        self.registry
            .sweep(|entry| now.saturating_duration_since(entry.reset_at) > cutoff)
    }
}

/// A per-key token bucket limiter.
///
/// Shared across request handlers behind `Arc`; `allow` is lock-local
/// and never blocks on I/O. A background cleanup task evicts buckets
/// that have sat past their reset for a full extra window.
#[derive(Debug)]
pub struct TokenBucketStrategy {
    inner: Arc<Inner>,
    cleanup: CleanupTask,
}

impl TokenBucketStrategy {
    /// Creates a token bucket strategy with the default cleanup
    /// interval.
    ///
    /// A zero `capacity` or `refill_window` is corrected to
    /// [`DEFAULT_CAPACITY`] / [`DEFAULT_REFILL_WINDOW`] rather than
    /// rejected.
    pub fn new(capacity: u32, refill_window: Duration) -> Self {
        Self::with_cleanup_interval(capacity, refill_window, Some(DEFAULT_CLEANUP_INTERVAL))
    }

    /// Creates a token bucket strategy with an explicit cleanup
    /// interval; `None` disables background cleanup.
    pub fn with_cleanup_interval(
        capacity: u32,
        refill_window: Duration,
        cleanup_interval: Option<Duration>,
    ) -> Self {
        let capacity = if capacity == 0 {
            warn!(strategy = NAME, "capacity must be positive, using default");
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        let refill_window = if refill_window.is_zero() {
            warn!(strategy = NAME, "refill window must be positive, using default");
            DEFAULT_REFILL_WINDOW
        } else {
            refill_window
        };

        let inner = Arc::new(Inner {
            capacity,
            refill_window,
            registry: KeyedRegistry::new(),
        });

        let cleanup = match cleanup_interval {
            Some(interval) => {
                let sweeper = Arc::clone(&inner);
                CleanupTask::spawn(NAME, interval, move || sweeper.sweep())
            }
            None => CleanupTask::disabled(),
        };

        Self { inner, cleanup }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.inner.registry.len()
    }

    /// Runs one cleanup pass immediately, returning the eviction count.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Stops the cleanup task and waits for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.cleanup.shutdown().await;
    }
}

impl RateLimitStrategy for TokenBucketStrategy {
    fn allow(&self, key: &str) -> Decision {
        self.inner.allow(key)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
