//! Shared test infrastructure for integration tests.
//!
//! Provides a tracing initializer, header-map and request builders,
//! and a synthetic client address used across test modules.

#![allow(dead_code)]

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Uri};
use rate_gate::RequestContext;

/// A synthetic client address used in most test invocations.
pub const TEST_CLIENT_ADDR: &str = "192.168.1.100:54321";

/// Initializes a tracing subscriber for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Builds a header map from name/value pairs.
pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    pairs
        .iter()
        .fold(HeaderMap::new(), |mut map, (name, value)| {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
            map
        })
}

/// Owns the borrowed parts of a [`RequestContext`] so tests can build
/// contexts without wrestling lifetimes.
pub struct TestRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: String,
}

impl TestRequest {
    /// A GET request to `/` from [`TEST_CLIENT_ADDR`] with no headers.
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            uri: "http://proxy.local/".parse().unwrap(),
            headers: HeaderMap::new(),
            remote_addr: TEST_CLIENT_ADDR.to_owned(),
        }
    }

    pub fn with_remote(mut self, remote_addr: &str) -> Self {
        self.remote_addr = remote_addr.to_owned();
        self
    }

    pub fn with_headers(mut self, pairs: &[(&str, &str)]) -> Self {
        self.headers = header_map(pairs);
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.parse().unwrap();
        self
    }

    pub fn ctx(&self) -> RequestContext<'_> {
        RequestContext {
            method: &self.method,
            uri: &self.uri,
            headers: &self.headers,
            remote_addr: &self.remote_addr,
        }
    }
}

impl Default for TestRequest {
    fn default() -> Self {
        Self::new()
    }
}
