//! Configuration loading and admission-control construction.
//!
//! The host loads a YAML (or programmatically built) configuration
//! once at startup and turns it into a ready [`AdmissionControl`].
//! Every field is optional with a documented default; numeric
//! parameters that make no sense (zero capacities, negative rates)
//! are corrected by the strategy constructors rather than rejected,
//! so a sloppy config degrades to safe limits instead of failing the
//! process.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::{AdmissionControl, DEFAULT_STRATEGY_CAPACITY, DEFAULT_STRATEGY_WINDOW};
use crate::identity::TrustedProxySet;
use crate::key::DEFAULT_MAX_KEY_LENGTH;
use crate::strategy::{
    AdaptiveStrategy, FixedWindowStrategy, LeakyBucketStrategy, RateLimitStrategy,
    SlidingWindowStrategy, TokenBucketStrategy,
};

/// Default interval between cleanup passes, in milliseconds.
pub const DEFAULT_CLEANUP_INTERVAL_MS: i64 = 300_000;

/// Errors produced while loading a configuration file.
///
/// The admission core itself never fails; file IO and YAML parsing
/// are the only fallible surfaces.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be opened or read.
    Io(String),
    /// The configuration contents failed YAML deserialization.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "configuration io error: {msg}"),
            Self::Parse(msg) => write!(f, "configuration parse error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Rate limiting configuration as deserialized from the host's config
/// file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Algorithm selection and parameters (default: token bucket,
    /// capacity 100, one-minute window).
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Maximum sanitized key length (default: 256).
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,
    /// Interval between background cleanup passes in milliseconds
    /// (default: 300000). A negative value disables cleanup.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: i64,
    /// CIDR ranges (or bare addresses) whose forwarding headers are
    /// trusted (default: none).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            max_key_length: default_max_key_length(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LENGTH
}

fn default_cleanup_interval_ms() -> i64 {
    DEFAULT_CLEANUP_INTERVAL_MS
}

/// Algorithm selection, tagged by `algorithm` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Whole-window refill token bucket.
    TokenBucket {
        #[serde(default = "default_capacity")]
        capacity: u32,
        #[serde(default = "default_window_ms")]
        refill_window_ms: u64,
    },
    /// Fixed window counter.
    FixedWindow {
        #[serde(default = "default_capacity")]
        limit: u32,
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    /// Exact sliding window log.
    SlidingWindow {
        #[serde(default = "default_capacity")]
        limit: u32,
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    /// Constant-drain leaky bucket.
    LeakyBucket {
        #[serde(default = "default_leak_rate")]
        rate: f64,
        #[serde(default = "default_leak_capacity")]
        capacity: u32,
    },
    /// Feedback-driven per-client pacing.
    Adaptive {
        #[serde(default = "default_base_rate")]
        base_rate: f64,
        #[serde(default = "default_min_rate")]
        min_rate: f64,
        #[serde(default = "default_max_rate")]
        max_rate: f64,
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::TokenBucket {
            capacity: DEFAULT_STRATEGY_CAPACITY,
            refill_window_ms: DEFAULT_STRATEGY_WINDOW.as_millis() as u64,
        }
    }
}

fn default_capacity() -> u32 {
    DEFAULT_STRATEGY_CAPACITY
}

fn default_window_ms() -> u64 {
    DEFAULT_STRATEGY_WINDOW.as_millis() as u64
}

fn default_leak_rate() -> f64 {
    1.0
}

fn default_leak_capacity() -> u32 {
    1
}

fn default_base_rate() -> f64 {
    1.0
}

fn default_min_rate() -> f64 {
    0.1
}

fn default_max_rate() -> f64 {
    10.0
}

impl RateLimitConfig {
    /// Loads configuration from a YAML file at the given path.
    pub fn load_from_file(file_path: &(impl AsRef<Path> + ?Sized)) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(file_path).map_err(|e| {
            ConfigError::Io(format!(
                "failed to open {}: {e}",
                file_path.as_ref().display()
            ))
        })?;

        serde_yaml::from_reader(file).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Interval between cleanup passes; `None` when disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        u64::try_from(self.cleanup_interval_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Constructs the configured strategy instance.
    pub fn build_strategy(&self) -> Arc<dyn RateLimitStrategy> {
        let cleanup = self.cleanup_interval();
        match self.strategy {
            StrategyConfig::TokenBucket {
                capacity,
                refill_window_ms,
            } => Arc::new(TokenBucketStrategy::with_cleanup_interval(
                capacity,
                Duration::from_millis(refill_window_ms),
                cleanup,
            )),
            StrategyConfig::FixedWindow { limit, window_ms } => {
                Arc::new(FixedWindowStrategy::with_cleanup_interval(
                    limit,
                    Duration::from_millis(window_ms),
                    cleanup,
                ))
            }
            StrategyConfig::SlidingWindow { limit, window_ms } => {
                Arc::new(SlidingWindowStrategy::with_cleanup_interval(
                    limit,
                    Duration::from_millis(window_ms),
                    cleanup,
                ))
            }
            StrategyConfig::LeakyBucket { rate, capacity } => Arc::new(
                LeakyBucketStrategy::with_cleanup_interval(rate, capacity, cleanup),
            ),
            StrategyConfig::Adaptive {
                base_rate,
                min_rate,
                max_rate,
                window_ms,
            } => Arc::new(AdaptiveStrategy::with_cleanup_interval(
                base_rate,
                min_rate,
                max_rate,
                Duration::from_millis(window_ms),
                cleanup,
            )),
        }
    }

    /// Builds a ready orchestrator from this configuration.
    pub fn build(&self) -> AdmissionControl {
        AdmissionControl::new(self.build_strategy())
            .with_trusted_proxies(TrustedProxySet::from_strings(&self.trusted_proxies))
            .with_max_key_length(self.max_key_length)
    }
}
