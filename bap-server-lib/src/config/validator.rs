use bap_protocol::frame::MAX_PAYLOAD;

use crate::config::root::Config;
use crate::error::{BapError, Result};

/// Rejects contradictory configuration: no transport configured, or
/// limits that can't be satisfied together.
pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.listen.socket_dir.is_none() && !cfg.listen.tcp {
        return Err(BapError::Config(
            "no transport configured: set listen.socket_dir or listen.tcp".into(),
        ));
    }

    if !cfg.auth.has_any_method() {
        return Err(BapError::Config(
            "auth: no method enabled (allow_none, keyfile_path, allowed_uids, allowed_gids are all empty)"
                .into(),
        ));
    }

    if cfg.auth.allow_none && cfg.listen.tcp && cfg.listen.socket_dir.is_none() {
        return Err(BapError::Config(
            "auth.allow_none without a local socket transport has no peer-credential source on TCP"
                .into(),
        ));
    }

    if cfg.security.max_payload as usize > MAX_PAYLOAD {
        return Err(BapError::Config(format!(
            "security.max_payload ({}) exceeds the protocol hard cap of {} bytes",
            cfg.security.max_payload, MAX_PAYLOAD
        )));
    }

    if let Some(path) = &cfg.auth.keyfile_path {
        if path.is_empty() {
            return Err(BapError::Config("auth.keyfile_path is set but empty".into()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::auth::AuthConfig;
    use crate::config::root::ListenConfig;

    #[test]
    fn rejects_no_transport() {
        let mut cfg = Config::default();
        cfg.listen = ListenConfig { socket_dir: None, port_offset: 0, tcp: false, tcp_bind: String::new() };
        cfg.auth.allow_none = true;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_no_auth_method() {
        let mut cfg = Config::default();
        cfg.auth = AuthConfig::default();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let mut cfg = Config::default();
        cfg.auth.allow_none = true;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn rejects_oversized_payload_cap() {
        let mut cfg = Config::default();
        cfg.auth.allow_none = true;
        cfg.security.max_payload = 10_000;
        assert!(validate_config(&cfg).is_err());
    }
}
