// Logging setup
//
// Installs a tracing-subscriber registry with an EnvFilter and a console fmt
// layer. Library code only emits through `tracing`; binaries and demos call
// `init_telemetry` once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for log output
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Filter directive (e.g. `info,streamflow_workflow=debug`)
    pub log_filter: Option<String>,

    /// Whether to log to stdout
    pub enable_console: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "streamflow".to_string(),
            log_filter: None,
            enable_console: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `STREAMFLOW_SERVICE_NAME`: Service name (default: "streamflow")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("STREAMFLOW_SERVICE_NAME")
                .unwrap_or_else(|_| "streamflow".to_string()),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            enable_console: true,
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Effective filter; invalid directives fall back to `info`
    pub fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed (for example by a
/// test harness); the existing one is kept.
///
/// # Example
///
/// ```ignore
/// use streamflow_workflow::telemetry::{init_telemetry, TelemetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     init_telemetry(TelemetryConfig::from_env());
///     // ... your application code
/// }
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> bool {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "streamflow");
        assert!(config.enable_console);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = TelemetryConfig::default().with_log_filter("streamflow=notalevel");
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn test_second_init_is_tolerated() {
        init_telemetry(TelemetryConfig::default());
        assert!(!init_telemetry(TelemetryConfig::default()));
    }
}
