//! Logging setup: an
//! `EnvFilter` built from configuration (overridable by `RUST_LOG`) feeding
//! a plain fmt layer. No OpenTelemetry exporter is wired up — there is
//! no collector to ship spans to here, so `init_tracing` only wires up
//! stdout logging.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;

pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.show_target);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to set global tracing subscriber: {e}"))?;

    Ok(())
}

/// Flushes stdout/stderr so buffered log lines are not lost on exit.
pub fn shutdown_tracing() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}
