//! Where to find a running server, mirroring the naming convention in the
//! server's own `transport::bind` (same socket path, same port numbering)
//! so a client pointed at the same `socket_dir`/`port_offset` just works.

use std::path::PathBuf;

/// A server address: a Unix-domain socket path, or a TCP host/port pair.
#[derive(Debug, Clone)]
pub enum ServerAddr {
    Unix(PathBuf),
    Tcp(String, u16),
}

impl ServerAddr {
    /// The local socket at `<socket_dir>/<port_offset>`, as bound by
    /// `transport::bind_unix`.
    pub fn local_socket(socket_dir: impl Into<PathBuf>, port_offset: u16) -> Self {
        ServerAddr::Unix(socket_dir.into().join(port_offset.to_string()))
    }

    /// The TCP address `host:35751+port_offset`, mirroring
    /// `transport::bind_tcp`'s port numbering.
    pub fn tcp(host: impl Into<String>, port_offset: u16) -> Self {
        ServerAddr::Tcp(host.into(), bap_protocol::BASE_TCP_PORT + port_offset)
    }
}
