//! Leaky bucket admission strategy.
//!
//! Each key's bucket drains at a constant `rate` (units per second)
//! and holds at most `capacity` queued units. An arriving request
//! first applies the drain accrued since the last call, then joins the
//! bucket if there is room; a full bucket rejects with the time for
//! one unit to leak out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::reaper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
use crate::registry::KeyedRegistry;
use crate::strategy::{Decision, RateLimitStrategy};

const NAME: &str = "leaky_bucket";

const DEFAULT_RATE: f64 = 1.0;
const DEFAULT_CAPACITY: u32 = 1;

#[derive(Debug)]
struct LeakyBucketEntry {
    level: u32,
    last_leak: Instant,
}

impl LeakyBucketEntry {
    /// Level after applying the drain accrued between `last_leak` and
    /// `now`, without mutating the entry.
    fn drained_level(&self, now: Instant, rate: f64) -> u32 {
        let elapsed = now.saturating_duration_since(self.last_leak);
        let leaked = (elapsed.as_secs_f64() * rate).floor();
        if leaked >= f64::from(self.level) {
            0
        } else {
            self.level - leaked as u32
        }
    }
}

#[derive(Debug)]
struct Inner {
    rate: f64,
    capacity: u32,
    registry: KeyedRegistry<LeakyBucketEntry>,
}

impl Inner {
    fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        self.registry.admit(
            key,
            |_| false,
            || LeakyBucketEntry {
                level: 1,
                last_leak: now,
            },
            |entry| {
                entry.level = entry.drained_level(now, self.rate);
                entry.last_leak = now;

                if entry.level < self.capacity {
                    entry.level += 1;
                    Decision::admit()
                } else {
                    Decision::reject(Duration::from_secs_f64(1.0 / self.rate))
                }
            },
        )
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        // An entry is reclaimable once it has fully drained and has
        // been idle for at least a whole drain cycle.
        let drain_cycle = Duration::from_secs_f64(f64::from(self.capacity) / self.rate);
        self.registry.sweep(|entry| {
            entry.drained_level(now, self.rate) == 0
                && now.saturating_duration_since(entry.last_leak) >= drain_cycle
        })
    }
}

/// A per-key leaky bucket limiter.
#[derive(Debug)]
pub struct LeakyBucketStrategy {
    inner: Arc<Inner>,
    cleanup: CleanupTask,
}

impl LeakyBucketStrategy {
    /// Creates a leaky bucket strategy with the default cleanup
    /// interval.
    ///
    /// A non-positive or non-finite `rate` is corrected to 1.0 units
    /// per second; a zero `capacity` is corrected to 1.
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self::with_cleanup_interval(rate, capacity, Some(DEFAULT_CLEANUP_INTERVAL))
    }

    /// Creates a leaky bucket strategy with an explicit cleanup
    /// interval; `None` disables background cleanup.
    pub fn with_cleanup_interval(
        rate: f64,
        capacity: u32,
        cleanup_interval: Option<Duration>,
    ) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            warn!(strategy = NAME, rate, "rate must be positive, using default");
            DEFAULT_RATE
        };
        let capacity = if capacity == 0 {
            warn!(strategy = NAME, "capacity must be positive, using default");
            DEFAULT_CAPACITY
        } else {
            capacity
        };

        let inner = Arc::new(Inner {
            rate,
            capacity,
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

impl RateLimitStrategy for LeakyBucketStrategy {
    fn allow(&self, key: &str) -> Decision {
        self.inner.allow(key)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
