//! Sliding window log admission strategy.
//!
//! Records the timestamp of every admitted request and counts how many
//! fall inside the trailing window at decision time. No boundary
//! bursts: for any trailing interval of the configured length, at most
//! `limit` requests are admitted. Costs O(limit) per call and one
//! stored timestamp per admitted request, the price of exactness.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::reaper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
use crate::registry::KeyedRegistry;
use crate::strategy::{Decision, RateLimitStrategy};

const NAME: &str = "sliding_window";

const DEFAULT_LIMIT: u32 = 1;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct SlidingWindowEntry {
    /// Admission times in insertion order; pruned in place on every
    /// call so the allocation is reused instead of reallocated.
    timestamps: Vec<Instant>,
}

#[derive(Debug)]
struct Inner {
    limit: u32,
    window: Duration,
    registry: KeyedRegistry<SlidingWindowEntry>,
}

impl Inner {
    fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        self.registry.admit(
            key,
            // Expiry is a by-product of pruning: an entry whose
            // timestamps have all aged out admits again naturally.
            |_| false,
            || SlidingWindowEntry {
                timestamps: vec![now],
            },
            |entry| {
                entry
                    .timestamps
                    .retain(|t| now.saturating_duration_since(*t) <= self.window);

                if (entry.timestamps.len() as u32) < self.limit {
                    entry.timestamps.push(now);
                    return Decision::admit();
                }

                // Full: the earliest surviving admission leaving the
                // window is the soonest a slot frees up.
                let earliest = entry.timestamps[0];
                Decision::reject((earliest + self.window).saturating_duration_since(now))
            },
        )
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        self.registry.sweep(|entry| {
            entry
                .timestamps
                .last()
                .is_none_or(|t| now.saturating_duration_since(*t) > self.window)
        })
    }
}

/// A per-key sliding window log limiter.
#[derive(Debug)]
pub struct SlidingWindowStrategy {
    inner: Arc<Inner>,
    cleanup: CleanupTask,
}

impl SlidingWindowStrategy {
    /// Creates a sliding window strategy with the default cleanup
    /// interval. Zero `limit` or `window` falls back to defaults.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_cleanup_interval(limit, window, Some(DEFAULT_CLEANUP_INTERVAL))
    }

    /// Creates a sliding window strategy with an explicit cleanup
    /// interval; `None` disables background cleanup.
    pub fn with_cleanup_interval(
        limit: u32,
        window: Duration,
        cleanup_interval: Option<Duration>,
    ) -> Self {
        let limit = if limit == 0 {
            warn!(strategy = NAME, "limit must be positive, using default");
            DEFAULT_LIMIT
        } else {
            limit
        };
        let window = if window.is_zero() {
            warn!(strategy = NAME, "window must be positive, using default");
            DEFAULT_WINDOW
        } else {
            window
        };

        let inner = Arc::new(Inner {
            limit,
            window,
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

impl RateLimitStrategy for SlidingWindowStrategy {
    fn allow(&self, key: &str) -> Decision {
        self.inner.allow(key)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
