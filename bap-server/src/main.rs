#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use bap_server_lib::config::load_from_path;
use bap_server_lib::driver::{DisplaySize, NullDriver};
use bap_server_lib::telemetry::{init_tracing, serve_health, shutdown_tracing, HealthSnapshot, Metrics};
use bap_server_lib::ServerCore;

#[derive(Parser, Debug)]
#[command(author, version, about = "BAP server: shares one braille display across applications")]
struct Cli {
    /// Path to the configuration TOML file.
    #[arg(short, long, value_name = "FILE", default_value = "bap-server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&config.logging) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    info!(?config.listen, "configuration loaded");

    // No concrete device driver ships with this server; a real deployment
    // swaps this for a driver built against the same `DriverPort` trait.
    let display = DisplaySize { width: 40, height: 1 };
    let driver = Arc::new(NullDriver::new(display));

    let core = Arc::new(ServerCore::new(driver, config));
    let metrics = Metrics::new();

    if let Some(port) = core.config.telemetry.health_port {
        let health_core = core.clone();
        let health_metrics = metrics.clone();
        tokio::spawn(async move {
            let snapshot = move || -> HealthSnapshot {
                // Best-effort: a health probe should never block on the same
                // locks the protocol handlers use, so this reports zeros on
                // contention rather than awaiting.
                let connection_count = health_core.connections.try_lock().map(|c| c.len()).unwrap_or(0);
                let raw_owner_present = health_core
                    .raw_suspend
                    .try_lock()
                    .map(|s| s.owner().is_some())
                    .unwrap_or(false);
                HealthSnapshot {
                    connection_count,
                    tty_count: 0,
                    raw_owner_present,
                    suspend_owner_present: raw_owner_present,
                }
            };
            if let Err(e) = serve_health(port, health_metrics, snapshot).await {
                error!(error = %e, "health listener failed");
            }
        });
    }

    if let Err(err) = bap_server_lib::run(core, metrics).await {
        error!(%err, "server exited with error");
        shutdown_tracing();
        std::process::exit(1);
    }

    shutdown_tracing();
}
