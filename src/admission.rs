//! The admission orchestrator: key extraction, sanitization, strategy
//! dispatch, and rejection rendering.
//!
//! Sits between the host's request pipeline and a
//! [`RateLimitStrategy`]. The host hands over a lightweight
//! [`RequestContext`] facade per request; the orchestrator optionally
//! skips it, derives and sanitizes a client key, consults the
//! strategy, and either admits or produces the 429 response the host
//! should return.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::{Method, Response, StatusCode, Uri};
use tracing::debug;

use crate::identity::{resolve_client_key, TrustedProxySet};
use crate::key::{self, DEFAULT_MAX_KEY_LENGTH, UNKNOWN_CLIENT_KEY};
use crate::strategy::{Decision, RateLimitStrategy, TokenBucketStrategy};

/// Capacity of the default token bucket strategy.
pub const DEFAULT_STRATEGY_CAPACITY: u32 = 100;

/// Refill window of the default token bucket strategy.
pub const DEFAULT_STRATEGY_WINDOW: Duration = Duration::from_secs(60);

/// Read-only view of the triggering request.
///
/// Deliberately smaller than a full `hyper::Request`: the orchestrator
/// needs the routing essentials and the connection address, nothing
/// else, so hosts that are not hyper-shaped can still construct one.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request URI.
    pub uri: &'a Uri,
    /// Request headers, including any forwarding headers.
    pub headers: &'a HeaderMap,
    /// Direct connection address, `ip:port` or bare `ip` form.
    pub remote_addr: &'a str,
}

impl<'a> RequestContext<'a> {
    /// Builds a context from a hyper request and its peer address.
    pub fn from_request<B>(req: &'a hyper::Request<B>, remote_addr: &'a str) -> Self {
        Self {
            method: req.method(),
            uri: req.uri(),
            headers: req.headers(),
            remote_addr,
        }
    }
}

/// Extracts a raw (pre-sanitization) client key from a request.
pub type KeyFn = dyn Fn(&RequestContext<'_>) -> String + Send + Sync;

/// Decides whether a request bypasses admission control entirely.
pub type SkipFn = dyn Fn(&RequestContext<'_>) -> bool + Send + Sync;

/// Builds the rejection response handed back to the client.
pub type ErrorResponseFn =
    dyn Fn(&RequestContext<'_>, Duration) -> Response<Full<Bytes>> + Send + Sync;

/// Per-request admission control over a pluggable strategy.
///
/// Built once at startup and shared across request handlers behind an
/// `Arc`; all per-request work is lock-local.
pub struct AdmissionControl {
    strategy: Arc<dyn RateLimitStrategy>,
    key_fn: Option<Box<KeyFn>>,
    skip_fn: Option<Box<SkipFn>>,
    error_response: Option<Box<ErrorResponseFn>>,
    trusted_proxies: TrustedProxySet,
    max_key_length: usize,
}

impl AdmissionControl {
    /// Creates an orchestrator around the given strategy with default
    /// settings: identity-resolver keying, no skip predicate, default
    /// 429 rendering, no trusted proxies, 256-character key cap.
    pub fn new(strategy: Arc<dyn RateLimitStrategy>) -> Self {
        Self {
            strategy,
            key_fn: None,
            skip_fn: None,
            error_response: None,
            trusted_proxies: TrustedProxySet::default(),
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
        }
    }

    /// Creates an orchestrator with the factory default strategy:
    /// a token bucket of capacity 100 refilling every minute.
    ///
    /// The default is constructed here, per instance; there is no
    /// process-wide shared limiter.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(TokenBucketStrategy::new(
            DEFAULT_STRATEGY_CAPACITY,
            DEFAULT_STRATEGY_WINDOW,
        )))
    }

    /// Replaces the key extractor. The default resolves the client IP
    /// through the trusted-proxy-aware identity resolver.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&RequestContext<'_>) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    /// Installs a bypass predicate; matching requests are admitted
    /// without consulting the strategy.
    pub fn with_skip_fn<F>(mut self, skip_fn: F) -> Self
    where
        F: Fn(&RequestContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.skip_fn = Some(Box::new(skip_fn));
        self
    }

    /// Replaces the default 429 rendering with a custom builder.
    pub fn with_error_response<F>(mut self, error_response: F) -> Self
    where
        F: Fn(&RequestContext<'_>, Duration) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        self.error_response = Some(Box::new(error_response));
        self
    }

    /// Sets the proxy ranges whose forwarding headers are trusted by
    /// the default key extractor.
    pub fn with_trusted_proxies(mut self, trusted_proxies: TrustedProxySet) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    /// Sets the maximum sanitized key length. Zero falls back to the
    /// default.
    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = if max_key_length == 0 {
            DEFAULT_MAX_KEY_LENGTH
        } else {
            max_key_length
        };
        self
    }

    /// The strategy this orchestrator dispatches to.
    pub fn strategy(&self) -> &Arc<dyn RateLimitStrategy> {
        &self.strategy
    }

    /// Runs one admission: skip predicate, key derivation,
    /// sanitization, strategy dispatch.
    pub fn check(&self, ctx: &RequestContext<'_>) -> Decision {
        if let Some(skip) = &self.skip_fn {
            if skip(ctx) {
                return Decision::admit();
            }
        }

        let decision = self.strategy.allow(&self.client_key(ctx));
        if !decision.allowed {
            debug!(
                strategy = self.strategy.name(),
                method = %ctx.method,
                uri = %ctx.uri,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "request rejected by rate limit"
            );
        }
        decision
    }

    /// Runs one admission and renders the rejection, if any.
    ///
    /// `None` means the request is admitted and the host should
    /// proceed; `Some(response)` is the 429 (or custom) response to
    /// return instead.
    pub fn handle(&self, ctx: &RequestContext<'_>) -> Option<Response<Full<Bytes>>> {
        let decision = self.check(ctx);
        if decision.allowed {
            return None;
        }

        Some(match &self.error_response {
            Some(build) => build(ctx, decision.retry_after),
            None => too_many_requests(decision.retry_after),
        })
    }

    /// Derives the sanitized client key for a request. Empty keys
    /// collapse into the shared [`UNKNOWN_CLIENT_KEY`] bucket.
    pub fn client_key(&self, ctx: &RequestContext<'_>) -> String {
        let raw = match &self.key_fn {
            Some(extract) => extract(ctx),
            None => resolve_client_key(ctx.remote_addr, ctx.headers, &self.trusted_proxies),
        };
        let raw = if raw.is_empty() {
            UNKNOWN_CLIENT_KEY.to_owned()
        } else {
            raw
        };
        key::sanitize(&raw, self.max_key_length)
    }
}

/// Default rejection rendering: 429 with a `Retry-After` of at least
/// one second and `X-RateLimit-Remaining: 0`, carrying a small JSON
/// body.
pub fn too_many_requests(retry_after: Duration) -> Response<Full<Bytes>> {
    let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
    let body = serde_json::json!({
        "error": "rate_limited",
        "message": "rate limit exceeded",
        "retry_after": retry_secs,
    });

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header("content-type", "application/json")
        .header("retry-after", retry_secs.to_string())
        .header("x-ratelimit-remaining", "0")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .body(Full::new(Bytes::new()))
                .expect("building fallback response must not fail")
        })
}
