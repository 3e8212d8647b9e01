//! Fixed window counter admission strategy.
//!
//! Counts requests per key within fixed, back-to-back windows. Cheap
//! and predictable, with the well-known boundary artifact: up to
//! `2 × limit` requests can land across a window edge. Deployments
//! that need smooth limiting should use the sliding window strategy
//! instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::reaper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
use crate::registry::KeyedRegistry;
use crate::strategy::{Decision, RateLimitStrategy};

const NAME: &str = "fixed_window";

const DEFAULT_LIMIT: u32 = 1;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct FixedWindowEntry {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct Inner {
    limit: u32,
    window: Duration,
    registry: KeyedRegistry<FixedWindowEntry>,
}

impl Inner {
    fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        self.registry.admit(
            key,
            |entry| now >= entry.reset_at,
            || FixedWindowEntry {
                count: 1,
                reset_at: now + self.window,
            },
            |entry| {
                if entry.count < self.limit {
                    entry.count += 1;
                    Decision::admit()
                } else {
                    Decision::reject(entry.reset_at.saturating_duration_since(now))
                }
            },
        )
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let cutoff = self.window;
        self.registry
            .sweep(|entry| now.saturating_duration_since(entry.reset_at) > cutoff)
    }
}

/// A per-key fixed window counter limiter.
#[derive(Debug)]
pub struct FixedWindowStrategy {
    inner: Arc<Inner>,
    cleanup: CleanupTask,
}

impl FixedWindowStrategy {
    /// Creates a fixed window strategy with the default cleanup
    /// interval. Zero `limit` or `window` falls back to defaults.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_cleanup_interval(limit, window, Some(DEFAULT_CLEANUP_INTERVAL))
    }

    /// Creates a fixed window strategy with an explicit cleanup
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

impl RateLimitStrategy for FixedWindowStrategy {
    fn allow(&self, key: &str) -> Decision {
        self.inner.allow(key)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(limit: u32, window: Duration) -> FixedWindowStrategy {
        FixedWindowStrategy::with_cleanup_interval(limit, window, None)
    }

    #[test]
    fn admits_limit_requests_per_window() {
        let strategy = window(4, Duration::from_secs(60));
        for _ in 0..4 {
            assert!(strategy.allow("k").allowed);
        }
        assert!(!strategy.allow("k").allowed);
    }

    #[test]
    fn counter_resets_after_window() {
        let strategy = window(2, Duration::from_millis(150));
        assert!(strategy.allow("k").allowed);
        assert!(strategy.allow("k").allowed);
        assert!(!strategy.allow("k").allowed);

        std::thread::sleep(Duration::from_millis(200));
        assert!(strategy.allow("k").allowed);
    }

    #[test]
    fn rejection_reports_time_to_reset() {
        let strategy = window(1, Duration::from_secs(30));
        strategy.allow("k");
        let rejected = strategy.allow("k");
        assert!(!rejected.allowed);
        assert!(rejected.retry_after > Duration::ZERO);
        assert!(rejected.retry_after <= Duration::from_secs(30));
    }

    #[test]
    fn invalid_parameters_fall_back_to_defaults() {
        let strategy = window(0, Duration::ZERO);
        assert!(strategy.allow("k").allowed);
        assert!(!strategy.allow("k").allowed);
    }

    #[test]
    fn sweep_evicts_stale_windows() {
        let strategy = window(1, Duration::from_millis(20));
        strategy.allow("k");
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(strategy.sweep(), 1);
        assert_eq!(strategy.tracked_keys(), 0);
    }
}
