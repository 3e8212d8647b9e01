//! Adaptive per-client admission strategy.
//!
//! Spaces each client's requests by a minimum interval derived from
//! that client's current rate, and lets the host application steer the
//! rate through a feedback side channel: well-behaved clients earn a
//! gently increasing rate, misbehaving clients are halved toward the
//! floor. What counts as good or bad behavior is entirely the host's
//! judgment (auth failures, error ratios, abuse heuristics); this
//! strategy only applies the verdicts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::reaper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
use crate::registry::KeyedRegistry;
use crate::strategy::{Decision, RateLimitStrategy};

const NAME: &str = "adaptive";

const DEFAULT_BASE_RATE: f64 = 1.0;
const DEFAULT_MIN_RATE: f64 = 0.1;
const DEFAULT_MAX_RATE: f64 = 10.0;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Multiplier applied on positive feedback.
const GOOD_FACTOR: f64 = 1.1;
/// Multiplier applied on negative feedback.
const BAD_FACTOR: f64 = 0.5;

#[derive(Debug)]
struct AdaptiveEntry {
    last_request: Instant,
    current_rate: f64,
    good_count: u64,
    bad_count: u64,
}

#[derive(Debug)]
struct Inner {
    base_rate: f64,
    min_rate: f64,
    max_rate: f64,
    window: Duration,
    registry: KeyedRegistry<AdaptiveEntry>,
}

impl Inner {
    fn seed(&self, now: Instant) -> AdaptiveEntry {
        AdaptiveEntry {
            last_request: now,
            current_rate: self.base_rate,
            good_count: 0,
            bad_count: 0,
        }
    }

    fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        self.registry.admit(
            key,
            // A client idle past the window starts over at the base
            // rate: earned speed-ups and penalties both decay away.
            |entry| now.saturating_duration_since(entry.last_request) > self.window,
            || self.seed(now),
            |entry| {
                let min_interval = Duration::from_secs_f64(1.0 / entry.current_rate);
                let elapsed = now.saturating_duration_since(entry.last_request);

                if elapsed >= min_interval {
                    entry.last_request = now;
                    Decision::admit()
                } else {
                    Decision::reject(min_interval - elapsed)
                }
            },
        )
    }

    fn update_rate(&self, key: &str, is_good: bool) {
        let now = Instant::now();
        self.registry.update(
            key,
            || self.seed(now),
            |entry| {
                if is_good {
                    entry.current_rate = (entry.current_rate * GOOD_FACTOR).min(self.max_rate);
                    entry.good_count += 1;
                } else {
                    entry.current_rate = (entry.current_rate * BAD_FACTOR).max(self.min_rate);
                    entry.bad_count += 1;
                }
            },
        );
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        self.registry
            .sweep(|entry| now.saturating_duration_since(entry.last_request) > self.window)
    }
}

/// A feedback-driven per-client pacing limiter.
#[derive(Debug)]
pub struct AdaptiveStrategy {
    inner: Arc<Inner>,
    cleanup: CleanupTask,
}

impl AdaptiveStrategy {
    /// Creates an adaptive strategy with the default cleanup interval.
    ///
    /// Non-positive or non-finite rates fall back to defaults
    /// (base 1.0, min 0.1, max 10.0 requests per second); the base
    /// rate is then clamped into `[min_rate, max_rate]`. A zero
    /// `window` falls back to 60 seconds.
    pub fn new(base_rate: f64, min_rate: f64, max_rate: f64, window: Duration) -> Self {
        Self::with_cleanup_interval(
            base_rate,
            min_rate,
            max_rate,
            window,
            Some(DEFAULT_CLEANUP_INTERVAL),
        )
    }

    /// Creates an adaptive strategy with an explicit cleanup interval;
    /// `None` disables background cleanup.
    pub fn with_cleanup_interval(
        base_rate: f64,
        min_rate: f64,
        max_rate: f64,
        window: Duration,
        cleanup_interval: Option<Duration>,
    ) -> Self {
        let min_rate = positive_or(min_rate, DEFAULT_MIN_RATE, "min rate");
        let max_rate = positive_or(max_rate, DEFAULT_MAX_RATE, "max rate").max(min_rate);
        let base_rate =
            positive_or(base_rate, DEFAULT_BASE_RATE, "base rate").clamp(min_rate, max_rate);
        let window = if window.is_zero() {
            warn!(strategy = NAME, "window must be positive, using default");
            DEFAULT_WINDOW
        } else {
            window
        };

        let inner = Arc::new(Inner {
            base_rate,
            min_rate,
            max_rate,
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

    /// Applies host feedback for `key`: good behavior raises the
    /// client's rate by 10% up to the maximum, bad behavior halves it
    /// down to the minimum. Unknown keys get a fresh entry at the base
    /// rate with the feedback applied.
    pub fn update_rate(&self, key: &str, is_good: bool) {
        self.inner.update_rate(key, is_good);
    }

    /// The current per-second rate for `key`, if tracked.
    pub fn current_rate(&self, key: &str) -> Option<f64> {
        self.inner.registry.peek(key, |entry| entry.current_rate)
    }

    /// Accumulated (good, bad) feedback counts for `key`, if tracked.
    pub fn feedback_counts(&self, key: &str) -> Option<(u64, u64)> {
        self.inner
            .registry
            .peek(key, |entry| (entry.good_count, entry.bad_count))
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

fn positive_or(value: f64, default: f64, what: &str) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!(strategy = NAME, value, "{what} must be positive, using default");
        default
    }
}

impl RateLimitStrategy for AdaptiveStrategy {
    fn allow(&self, key: &str) -> Decision {
        self.inner.allow(key)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
