//! Structured logging setup.
//!
//! The registry logs through `tracing` macros only; installing a subscriber
//! is left to the embedding process. [`init`] is the stock subscriber: an
//! `EnvFilter` (with `RUST_LOG` taking precedence over the configured level)
//! and a `text` or `json` formatter on stderr.

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{RegistryError, Result};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: trace, debug, info, warn, error, off, or a full
    /// `EnvFilter` directive list.
    pub level: String,
    /// Output format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| {
        RegistryError::invalid(format!("invalid log level '{}': {e}", config.level))
    })
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed; the existing
/// one is kept.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    let filter = build_env_filter(config)?;
    let base = Registry::default().with(filter);

    let installed = match config.format.as_str() {
        "json" => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        "text" => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        other => {
            return Err(RegistryError::invalid(format!(
                "unknown log format '{other}' (expected text or json)"
            )))
        }
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
    }

    #[test]
    fn reject_unknown_format() {
        let config = LoggingConfig {
            level: "info".into(),
            format: "xml".into(),
        };
        assert!(matches!(
            init(&config),
            Err(RegistryError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn second_init_is_noop() {
        let config = LoggingConfig::default();
        let _ = init(&config).unwrap();
        assert!(!init(&config).unwrap());
    }
}
