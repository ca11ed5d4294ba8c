//! Deferred retry configuration.
//!
//! Defaults for the retry loop are loaded from environment variables once per
//! process. Callers override them per assertion with [`Timeout`],
//! [`MaximumRetryDelay`] and [`RetryFrequency`] options.
//!
//! [`Timeout`]: crate::timing::Timeout
//! [`MaximumRetryDelay`]: crate::timing::MaximumRetryDelay
//! [`RetryFrequency`]: crate::retry::RetryFrequency

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment variable holding the total retry budget in seconds.
pub const RETRY_TIMEOUT_VAR: &str = "HARNESS_DEFERRED_RETRY_TIMEOUT_SECONDS";

/// Environment variable holding the longest single wait between attempts.
pub const MAXIMUM_POLLING_VAR: &str = "HARNESS_DEFERRED_MAXIMUM_POLLING_MS";

/// Environment variable naming the retry strategy.
pub const RETRY_STRATEGY_VAR: &str = "HARNESS_DEFERRED_RETRY_STRATEGY";

/// Default total retry budget in seconds.
pub const DEFAULT_RETRY_TIMEOUT_SECONDS: u64 = 60;

/// Default longest single wait between attempts in milliseconds.
pub const DEFAULT_MAXIMUM_POLLING_MS: u64 = 1000;

/// Polling interval used by the perpetual strategy.
pub const PERPETUAL_POLLING_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// How the default retry interval sequence is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Fibonacci intervals, each randomized between zero and the interval.
    #[default]
    RandomFibonacci,
    /// Exponential intervals, each randomized between zero and the interval.
    RandomExponential,
    /// Plain Fibonacci intervals.
    Fibonacci,
    /// Plain exponential intervals.
    Exponential,
    /// A fixed 250ms interval.
    Perpetual,
}

impl RetryStrategy {
    /// Parse a strategy name. Unknown names select the perpetual strategy.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "random.fibonacci" => RetryStrategy::RandomFibonacci,
            "random.exponential" => RetryStrategy::RandomExponential,
            "fibonacci" => RetryStrategy::Fibonacci,
            "exponential" => RetryStrategy::Exponential,
            _ => RetryStrategy::Perpetual,
        }
    }

    /// The canonical name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStrategy::RandomFibonacci => "random.fibonacci",
            RetryStrategy::RandomExponential => "random.exponential",
            RetryStrategy::Fibonacci => "fibonacci",
            RetryStrategy::Exponential => "exponential",
            RetryStrategy::Perpetual => "perpetual",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defaults for resolving deferred values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredConfig {
    /// Total time budget for resolving a deferred value (default: 60s).
    pub retry_timeout: Duration,

    /// Longest single wait between two attempts (default: 1000ms).
    pub maximum_polling_time: Duration,

    /// Strategy producing the retry intervals (default: random.fibonacci).
    pub retry_strategy: RetryStrategy,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            retry_timeout: Duration::from_secs(DEFAULT_RETRY_TIMEOUT_SECONDS),
            maximum_polling_time: Duration::from_millis(DEFAULT_MAXIMUM_POLLING_MS),
            retry_strategy: RetryStrategy::default(),
        }
    }
}

static GLOBAL: OnceLock<DeferredConfig> = OnceLock::new();

impl DeferredConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let retry_timeout_seconds =
            parse_u64(vars, RETRY_TIMEOUT_VAR, DEFAULT_RETRY_TIMEOUT_SECONDS)?;

        let maximum_polling_ms = parse_u64(vars, MAXIMUM_POLLING_VAR, DEFAULT_MAXIMUM_POLLING_MS)?;

        let retry_strategy = vars
            .get(RETRY_STRATEGY_VAR)
            .map(|s| RetryStrategy::parse(s))
            .unwrap_or_default();

        Ok(DeferredConfig {
            retry_timeout: Duration::from_secs(retry_timeout_seconds),
            maximum_polling_time: Duration::from_millis(maximum_polling_ms),
            retry_strategy,
        })
    }

    /// The process-wide configuration, read from the environment on first use.
    ///
    /// Invalid values are logged and replaced by the defaults.
    pub fn global() -> &'static DeferredConfig {
        GLOBAL.get_or_init(|| {
            DeferredConfig::from_env().unwrap_or_else(|e| {
                warn!(
                    target: "harness.core.config",
                    error = %e,
                    "Ignoring invalid deferred configuration, using defaults"
                );
                DeferredConfig::default()
            })
        })
    }
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ConfigError::InvalidValue(format!("{name}={raw:?} is not a whole number: {e}"))
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_from_vars_defaults() {
        let config = DeferredConfig::from_vars(&HashMap::new()).expect("defaults should load");

        assert_eq!(config, DeferredConfig::default());
        assert_eq!(config.retry_timeout, Duration::from_secs(60));
        assert_eq!(config.maximum_polling_time, Duration::from_millis(1000));
        assert_eq!(config.retry_strategy, RetryStrategy::RandomFibonacci);
    }

    #[test]
    fn test_from_vars_overrides() {
        let vars = HashMap::from([
            (RETRY_TIMEOUT_VAR.to_string(), "5".to_string()),
            (MAXIMUM_POLLING_VAR.to_string(), "200".to_string()),
            (RETRY_STRATEGY_VAR.to_string(), "Exponential".to_string()),
        ]);

        let config = DeferredConfig::from_vars(&vars).unwrap();

        assert_eq!(config.retry_timeout, Duration::from_secs(5));
        assert_eq!(config.maximum_polling_time, Duration::from_millis(200));
        assert_eq!(config.retry_strategy, RetryStrategy::Exponential);
    }

    #[test]
    fn test_from_vars_rejects_non_numeric_timeout() {
        let vars = HashMap::from([(RETRY_TIMEOUT_VAR.to_string(), "soon".to_string())]);

        let err = DeferredConfig::from_vars(&vars).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains(RETRY_TIMEOUT_VAR));
    }

    #[test]
    fn test_unknown_strategy_is_perpetual() {
        assert_eq!(RetryStrategy::parse("sometimes"), RetryStrategy::Perpetual);
        assert_eq!(
            RetryStrategy::parse("random.exponential"),
            RetryStrategy::RandomExponential
        );
        assert_eq!(RetryStrategy::Fibonacci.to_string(), "fibonacci");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var(MAXIMUM_POLLING_VAR, "750");
        let config = DeferredConfig::from_env();
        std::env::remove_var(MAXIMUM_POLLING_VAR);

        assert_eq!(
            config.unwrap().maximum_polling_time,
            Duration::from_millis(750)
        );
    }
}
