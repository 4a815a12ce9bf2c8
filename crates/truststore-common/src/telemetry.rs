//! Tracing initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! JSON or a human-readable fmt layer. `RUST_LOG` overrides the default
//! filter.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,truststore=debug,reqwest=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Returns an error instead of panicking when a subscriber is already set.
pub fn init_tracing(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_human_output() {
        let config = TelemetryConfig::default();
        assert!(!config.json);
        assert_eq!(config.default_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn second_initialization_fails_gracefully() {
        let _ = init_tracing(TelemetryConfig::default());
        let second = init_tracing(TelemetryConfig {
            json: true,
            ..Default::default()
        });
        assert!(matches!(second, Err(TelemetryError::SubscriberInit(_))));
    }
}
