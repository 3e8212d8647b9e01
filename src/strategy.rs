//! The admission strategy contract and its five implementations.
//!
//! Every algorithm answers the same question — may this key proceed
//! right now, and if not, how long should it wait — behind the same
//! two-method trait, so the orchestrator and any host code can swap
//! algorithms without touching call sites.

use std::time::Duration;

pub mod adaptive;
pub mod fixed_window;
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

pub use adaptive::AdaptiveStrategy;
pub use fixed_window::FixedWindowStrategy;
pub use leaky_bucket::LeakyBucketStrategy;
pub use sliding_window::SlidingWindowStrategy;
pub use token_bucket::TokenBucketStrategy;

/// The outcome of one admission check.
///
/// `retry_after` is meaningful only when `allowed` is `false`; admitted
/// decisions carry a zero duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Advisory wait before the caller should retry a rejected request.
    pub retry_after: Duration,
}

impl Decision {
    /// An admitted request.
    pub fn admit() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    /// A rejected request with an advisory retry delay.
    pub fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// A rate-limiting algorithm keyed by client identity.
///
/// Implementations must be safe for concurrent invocation from
/// arbitrarily many callers, must never block on I/O, and must never
/// fail: invalid construction parameters are corrected to documented
/// defaults and hostile keys have already been sanitized by the
/// orchestrator.
pub trait RateLimitStrategy: Send + Sync {
    /// Decides whether the request identified by `key` is admitted.
    fn allow(&self, key: &str) -> Decision;

    /// Identifies the algorithm in log output and diagnostics.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_carries_zero_wait() {
        let d = Decision::admit();
        assert!(d.allowed);
        assert_eq!(d.retry_after, Duration::ZERO);
    }

    #[test]
    fn reject_carries_wait() {
        let d = Decision::reject(Duration::from_secs(3));
        assert!(!d.allowed);
        assert_eq!(d.retry_after, Duration::from_secs(3));
    }
}
