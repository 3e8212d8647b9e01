//!
//! Per-client request admission control for [Hyper]-based services.
//!
//! `rate-gate` decides, per incoming request, whether a client may
//! proceed or must wait, using one of five pluggable algorithms
//! (token bucket, fixed window, sliding window, leaky bucket,
//! adaptive). It derives a stable client key from the connection
//! address with trusted-proxy-aware forwarding-header handling,
//! sanitizes hostile key material, and bounds memory with a
//! per-strategy background reaper.
//!
//! The crate is deliberately host-agnostic about routing: the server
//! hands over a [`RequestContext`] facade per request and turns a
//! rejection into its own response pipeline (a ready-made 429 with
//! `Retry-After` is provided).
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rate_gate::{AdmissionControl, RequestContext, SlidingWindowStrategy};
//!
//! let gate = AdmissionControl::new(Arc::new(SlidingWindowStrategy::new(
//!     100,
//!     Duration::from_secs(60),
//! )));
//!
//! # let req: hyper::Request<()> = hyper::Request::builder().body(()).unwrap();
//! let ctx = RequestContext::from_request(&req, "203.0.113.5:44812");
//! if let Some(response) = gate.handle(&ctx) {
//!     // return `response` (429) instead of dispatching the request
//! }
//! ```
//!
//! [Hyper]: https://hyper.rs/

pub mod admission;
pub mod config;
pub mod identity;
pub mod key;
pub mod reaper;
pub mod strategy;

mod registry;

pub use admission::{too_many_requests, AdmissionControl, RequestContext};
pub use config::{ConfigError, RateLimitConfig, StrategyConfig};
pub use identity::{resolve_client_key, TrustedProxySet};
pub use key::{sanitize, DEFAULT_MAX_KEY_LENGTH, UNKNOWN_CLIENT_KEY};
pub use strategy::{
    AdaptiveStrategy, Decision, FixedWindowStrategy, LeakyBucketStrategy, RateLimitStrategy,
    SlidingWindowStrategy, TokenBucketStrategy,
};
