use serde::Deserialize;

use super::auth::AuthConfig;
use super::security::SecurityConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;

/// Transport configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    /// Directory holding the per-port Unix-domain socket and its sibling
    /// lockfile. `None` disables the local-socket transport.
    #[serde(default)]
    pub socket_dir: Option<String>,
    /// Port offset; the Unix socket is named `<socket_dir>/<port>` and, if
    /// TCP is enabled, it listens on `35751 + port_offset`.
    #[serde(default)]
    pub port_offset: u16,
    /// Bind the TCP transport in addition to (or instead of) the local
    /// socket. Default: false — local-only, matching a single-seat
    /// desktop install.
    #[serde(default)]
    pub tcp: bool,
    /// TCP bind address; ignored unless `tcp` is set.
    #[serde(default = "default_tcp_bind")]
    pub tcp_bind: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            socket_dir: Some("/var/run/bap".to_string()),
            port_offset: 0,
            tcp: false,
            tcp_bind: default_tcp_bind(),
        }
    }
}

fn default_tcp_bind() -> String {
    "127.0.0.1".to_string()
}

/// Default tty path new connections enter if they don't name one (seeded,
/// on the original system, from `WINDOWPATH`-style environment variables —
/// here it is config instead since there is no ambient desktop session to
/// read it from).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TtyConfig {
    #[serde(default)]
    pub default_path: Vec<u32>,
}

/// Root configuration structure, assembling `listen`/`auth`/`security`/
/// `timeout`/`tty`/`logging`/`telemetry` from their own sub-modules.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub tty: TtyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: ListenConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            timeout: TimeoutConfig::default(),
            tty: TtyConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
