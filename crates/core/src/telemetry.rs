// Telemetry Module
//
// Console logging for docflow processes: a tracing-subscriber fmt layer
// filtered by an EnvFilter built from RUST_LOG / LOG_LEVEL.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info";

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Configuration for process logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded in the startup log line
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "debug", "docflow_durable=debug")
    pub log_filter: Option<String>,
    /// Whether to emit ANSI colours
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "docflow".to_string(),
            enable_console: true,
            log_filter: None,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "docflow")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `NO_COLOR`: Disable ANSI colours when set
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "docflow".to_string()),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ansi: std::env::var("NO_COLOR").is_err(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// The filter to install; falls back to `info` when the configured one does not parse
    pub fn env_filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use docflow_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     init_telemetry(&TelemetryConfig::from_env())?;
///     // ... your application code
///     Ok(())
/// }
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi)
                .with_filter(config.env_filter()),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(console_layer).try_init()?;

    tracing::debug!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}
