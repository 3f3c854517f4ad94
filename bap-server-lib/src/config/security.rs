use serde::Deserialize;

use bap_protocol::frame::MAX_PAYLOAD;

/// Security limits on the handshake and on connections before they are
/// authenticated.
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Maximum number of connections allowed to be mid-handshake at once.
    /// Default: 64.
    #[serde(default = "default_max_unauthenticated")]
    pub max_unauthenticated: usize,
    /// Absolute handshake timeout in seconds, measured from accept to the
    /// final auth-request/ack exchange. Default: 30.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Maximum accepted frame payload size in bytes. Must not exceed the
    /// protocol's hard cap of 512 bytes; default is that cap.
    #[serde(default = "default_max_payload")]
    pub max_payload: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            max_unauthenticated: default_max_unauthenticated(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            max_payload: default_max_payload(),
        }
    }
}

fn default_max_unauthenticated() -> usize {
    64
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_max_payload() -> u32 {
    MAX_PAYLOAD as u32
}
