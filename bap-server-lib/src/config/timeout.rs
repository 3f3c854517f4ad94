use serde::Deserialize;

/// Timing knobs outside the handshake itself: auto-repeat delay/interval,
/// with no keep-alive section since there is no HTTP/1.1 layer here.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Default auto-repeat initial delay in milliseconds.
    #[serde(default = "default_repeat_delay_ms")]
    pub repeat_delay_ms: u64,
    /// Default auto-repeat interval in milliseconds.
    #[serde(default = "default_repeat_interval_ms")]
    pub repeat_interval_ms: u64,
    /// Graceful shutdown grace period in seconds before in-flight
    /// connections are dropped unceremoniously.
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            repeat_delay_ms: default_repeat_delay_ms(),
            repeat_interval_ms: default_repeat_interval_ms(),
            shutdown_secs: default_shutdown_secs(),
        }
    }
}

fn default_repeat_delay_ms() -> u64 {
    500
}

fn default_repeat_interval_ms() -> u64 {
    100
}

fn default_shutdown_secs() -> u64 {
    10
}
