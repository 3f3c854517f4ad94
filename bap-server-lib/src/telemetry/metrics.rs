//! Plain-text metrics/health listener: a bare TCP
//! listener that dumps a snapshot as `key value` lines per connection,
//! with no Prometheus exporter or HTTP server in front of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Counters updated from the hot paths; cheap enough to bump unconditionally.
#[derive(Default)]
pub struct Metrics {
    pub handshakes_succeeded: AtomicU64,
    pub handshakes_failed: AtomicU64,
    pub key_events_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Metrics> {
        Arc::new(Metrics::default())
    }

    pub fn record_handshake(&self, ok: bool) {
        if ok {
            self.handshakes_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_key_dropped(&self) {
        self.key_events_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time view of server state for the health listener, collected
/// by the caller (who holds the `ServerCore` locks) rather than by this
/// module, to avoid a telemetry dependency on core internals.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSnapshot {
    pub connection_count: usize,
    pub tty_count: usize,
    pub raw_owner_present: bool,
    pub suspend_owner_present: bool,
}

/// Runs the health/metrics TCP listener until the process exits. Each
/// accepted connection gets one text snapshot and is then closed; there is
/// no keep-alive or request parsing, matching the "plain TCP text" scope
/// of this listener.
pub async fn serve_health(
    port: u16,
    metrics: Arc<Metrics>,
    snapshot: impl Fn() -> HealthSnapshot + Send + Sync + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "health/metrics listener started");
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "health listener accept failed");
                continue;
            }
        };
        let snap = snapshot();
        let body = format!(
            "connections {}\n\
             ttys {}\n\
             raw_owner_present {}\n\
             suspend_owner_present {}\n\
             handshakes_succeeded {}\n\
             handshakes_failed {}\n\
             key_events_dropped {}\n",
            snap.connection_count,
            snap.tty_count,
            snap.raw_owner_present as u8,
            snap.suspend_owner_present as u8,
            metrics.handshakes_succeeded.load(Ordering::Relaxed),
            metrics.handshakes_failed.load(Ordering::Relaxed),
            metrics.key_events_dropped.load(Ordering::Relaxed),
        );
        if let Err(e) = stream.write_all(body.as_bytes()).await {
            warn!(peer = %peer, error = %e, "failed writing health snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let m = Metrics::new();
        m.record_handshake(true);
        m.record_handshake(false);
        m.record_key_dropped();
        assert_eq!(m.handshakes_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(m.handshakes_failed.load(Ordering::Relaxed), 1);
        assert_eq!(m.key_events_dropped.load(Ordering::Relaxed), 1);
    }
}
