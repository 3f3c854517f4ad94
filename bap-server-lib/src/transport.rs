//! Listener setup: a Unix domain socket under
//! the configured socket directory, with a sibling lockfile recording the
//! owning PID, and an optional TCP listener. The `Endpoint` wrapper lets
//! the accept loop and connection handler stay transport-agnostic over
//! either kind of stream.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tracing::{info, warn};

use crate::config::ListenConfig;
use crate::error::{BapError, Result};

pub enum Endpoint {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Endpoint {
    /// The raw fd for a peer-credential lookup, `None` over TCP.
    pub fn peer_fd(&self) -> Option<RawFd> {
        match self {
            Endpoint::Unix(s) => Some(s.as_raw_fd()),
            Endpoint::Tcp(_) => None,
        }
    }

    pub fn peer_description(&self) -> String {
        match self {
            Endpoint::Unix(_) => "unix".to_string(),
            Endpoint::Tcp(s) => s.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "tcp".to_string()),
        }
    }
}

impl AsyncRead for Endpoint {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Endpoint::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Endpoint::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Endpoint {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Endpoint::Unix(s) => Pin::new(s).poll_write(cx, data),
            Endpoint::Tcp(s) => Pin::new(s).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Endpoint::Unix(s) => Pin::new(s).poll_flush(cx),
            Endpoint::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Endpoint::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Endpoint::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Owns the bound listeners plus the on-disk socket/lockfile, which are
/// removed on drop so a clean shutdown leaves nothing behind.
pub struct BoundListeners {
    pub unix: Option<UnixListener>,
    pub tcp: Option<TcpListener>,
    socket_path: Option<PathBuf>,
    lock_path: Option<PathBuf>,
}

impl Drop for BoundListeners {
    fn drop(&mut self) {
        if let Some(p) = &self.socket_path {
            let _ = std::fs::remove_file(p);
        }
        if let Some(p) = &self.lock_path {
            let _ = std::fs::remove_file(p);
        }
    }
}

impl BoundListeners {
    /// Accepts the next connection on whichever listener is configured,
    /// racing them with `tokio::select!` when both are present.
    pub async fn accept(&self) -> io::Result<(Endpoint, String)> {
        match (&self.unix, &self.tcp) {
            (Some(u), Some(t)) => tokio::select! {
                r = u.accept() => r.map(|(s, _)| (Endpoint::Unix(s), "unix".to_string())),
                r = t.accept() => r.map(|(s, a)| (Endpoint::Tcp(s), a.to_string())),
            },
            (Some(u), None) => u.accept().await.map(|(s, _)| (Endpoint::Unix(s), "unix".to_string())),
            (None, Some(t)) => t.accept().await.map(|(s, a)| (Endpoint::Tcp(s), a.to_string())),
            (None, None) => std::future::pending().await,
        }
    }
}

/// Binds the Unix-socket side of `config` (requiring at least one
/// transport configured is enforced by `validate_config`, not here),
/// synchronously since it's all filesystem work, and writes a PID
/// lockfile beside it.
fn bind_unix(config: &ListenConfig) -> Result<(Option<UnixListener>, Option<PathBuf>, Option<PathBuf>)> {
    let Some(dir) = &config.socket_dir else {
        return Ok((None, None, None));
    };
    std::fs::create_dir_all(dir).map_err(BapError::Io)?;
    let socket_path = PathBuf::from(dir).join(config.port_offset.to_string());
    // A stale socket from an unclean shutdown would otherwise make
    // bind() fail with AddrInUse.
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path).map_err(BapError::Io)?;
    let lock_path = socket_path.with_extension("lock");
    std::fs::write(&lock_path, std::process::id().to_string()).map_err(BapError::Io)?;
    info!(path = %socket_path.display(), "bound unix socket");
    Ok((Some(listener), Some(socket_path), Some(lock_path)))
}

/// Binds the TCP side of `config`, if configured.
async fn bind_tcp(config: &ListenConfig) -> Result<Option<TcpListener>> {
    if !config.tcp {
        return Ok(None);
    }
    let port = bap_protocol::BASE_TCP_PORT + config.port_offset;
    let addr = format!("{}:{}", config.tcp_bind, port);
    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!(%addr, "bound tcp listener");
            Ok(Some(listener))
        }
        Err(e) => {
            warn!(%addr, error = %e, "failed to bind tcp listener");
            Err(BapError::Io(e))
        }
    }
}

/// Binds every transport `config` enables.
pub async fn bind(config: &ListenConfig) -> Result<BoundListeners> {
    let (unix, socket_path, lock_path) = bind_unix(config)?;
    let tcp = bind_tcp(config).await?;
    Ok(BoundListeners { unix, tcp, socket_path, lock_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_creates_socket_and_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let config = ListenConfig {
            socket_dir: Some(dir.path().to_string_lossy().to_string()),
            port_offset: 0,
            tcp: false,
            tcp_bind: "127.0.0.1".to_string(),
        };
        let bound = bind(&config).await.unwrap();
        assert!(bound.unix.is_some());
        assert!(dir.path().join("0.lock").exists());
        drop(bound);
        assert!(!dir.path().join("0.lock").exists());
        assert!(!dir.path().join("0").exists());
    }
}
