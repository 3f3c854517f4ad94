use serde::Deserialize;

/// Which authentication methods the handshake will offer, in the
/// order they are tried. Uses one enable-flag per method rather than a
/// single enum, since more than one method can be accepted at once.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Accept the `none` method (no credential check at all).
    /// Default: false — a config must opt into this explicitly.
    #[serde(default)]
    pub allow_none: bool,
    /// Path to the shared keyfile for the `keyfile` method.
    #[serde(default)]
    pub keyfile_path: Option<String>,
    /// uids allowed to authenticate via the `local-user` peer-credential
    /// method (checked against `SO_PEERCRED`/`getpeereid`).
    #[serde(default)]
    pub allowed_uids: Vec<u32>,
    /// gids allowed to authenticate via the `local-group` peer-credential
    /// method.
    #[serde(default)]
    pub allowed_gids: Vec<u32>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            allow_none: false,
            keyfile_path: None,
            allowed_uids: Vec::new(),
            allowed_gids: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Whether at least one method is actually usable. Called by
    /// `validate_config` — a config offering zero methods would wedge
    /// every connection in the handshake forever.
    pub fn has_any_method(&self) -> bool {
        self.allow_none
            || self.keyfile_path.is_some()
            || !self.allowed_uids.is_empty()
            || !self.allowed_gids.is_empty()
    }
}
