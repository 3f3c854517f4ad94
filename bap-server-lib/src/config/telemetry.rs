use serde::Deserialize;

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error". Can be
    /// overridden at runtime via `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log lines.
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), show_target: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Whether to expose the plain-text health/metrics listener.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// TCP port for the health/metrics listener. `None` disables it.
    #[serde(default)]
    pub health_port: Option<u16>,
}
