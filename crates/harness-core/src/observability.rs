//! Tracing bootstrap for test binaries and tools that launch applications.

use std::collections::HashMap;
use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConfigError;

/// Environment variable holding the fallback log filter.
pub const LOG_LEVEL_VAR: &str = "HARNESS_LOG_LEVEL";

/// Environment variable selecting JSON formatted output.
pub const LOG_JSON_VAR: &str = "HARNESS_LOG_JSON";

/// Default filter used when neither `RUST_LOG` nor `HARNESS_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "harness=info";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Filter directive applied when `RUST_LOG` is absent.
    pub log_level: String,

    /// Emit one JSON object per event instead of human readable lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let log_level = vars
            .get(LOG_LEVEL_VAR)
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json = match vars.get(LOG_JSON_VAR).map(|s| s.trim().to_ascii_lowercase()) {
            None => false,
            Some(v) if v == "1" || v == "true" || v == "yes" => true,
            Some(v) if v == "0" || v == "false" || v == "no" || v.is_empty() => false,
            Some(v) => {
                return Err(ConfigError::InvalidValue(format!(
                    "{LOG_JSON_VAR}={v:?} is not a boolean"
                )))
            }
        };

        Ok(ObservabilityConfig { log_level, json })
    }
}

/// Install the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed, which makes the
/// call safe to repeat from every test.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer()).try_init().is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = ObservabilityConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, ObservabilityConfig::default());
    }

    #[test]
    fn test_from_vars_json_flag() {
        let vars = HashMap::from([
            (LOG_JSON_VAR.to_string(), "TRUE".to_string()),
            (LOG_LEVEL_VAR.to_string(), "debug".to_string()),
        ]);
        let config = ObservabilityConfig::from_vars(&vars).unwrap();
        assert!(config.json);
        assert_eq!(config.log_level, "debug");

        let vars = HashMap::from([(LOG_JSON_VAR.to_string(), "maybe".to_string())]);
        assert!(ObservabilityConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_init_tracing_is_repeatable() {
        let config = ObservabilityConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
