//! Tracing subscriber setup
//!
//! Installs an `EnvFilter` (overridable through `RUST_LOG`) and a fmt layer
//! emitting either JSON lines with the current span or plain text.

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,folders=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Output format of the fmt layer
    pub format: LogFormat,
}

/// Initialize the global tracing subscriber
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    build_subscriber(config.format, env_filter)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    Ok(())
}

fn build_subscriber(format: LogFormat, env_filter: EnvFilter) -> impl Subscriber + Send + Sync {
    // Option<Layer> implements Layer, so exactly one of these is active
    let json_layer = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
    });
    let text_layer =
        (format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_default_config_logs_json() {
        assert_eq!(TelemetryConfig::default().format, LogFormat::Json);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_default_filter_levels_per_target() {
        for format in [LogFormat::Json, LogFormat::Text] {
            let subscriber = build_subscriber(format, EnvFilter::new(DEFAULT_FILTER));
            tracing::subscriber::with_default(subscriber, || {
                assert!(tracing::enabled!(target: "folders::controller", Level::DEBUG));
                assert!(tracing::enabled!(target: "kube::runtime", Level::INFO));
                assert!(!tracing::enabled!(target: "kube::runtime", Level::DEBUG));
                assert!(!tracing::enabled!(target: "tower::buffer", Level::INFO));
                assert!(tracing::enabled!(target: "tower::buffer", Level::WARN));
            });
        }
    }
}
