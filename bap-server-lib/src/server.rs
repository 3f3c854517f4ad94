//! The accept loop and per-connection protocol handler:
//! signal-driven graceful shutdown, one spawned task per connection, an
//! RAII guard tracking in-flight unauthenticated peers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::split;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

use bap_protocol::codec::{read_packet_content, read_packet_header, write_packet, HeaderOutcome};
use bap_protocol::frame::tag;
use bap_protocol::message::*;

use crate::auth::negotiate;
use crate::connection::{Trigger, UnauthGuard};
use crate::core::ServerCore;
use crate::dispatch::{due_repeat, note_key_arrival, DispatchOutcome};
use crate::error::{BapError, Result};
use crate::telemetry::Metrics;
use crate::transport::{self, Endpoint};

/// Drives the accept loop until SIGTERM/SIGINT, then waits (bounded by
/// `config.timeout.shutdown_secs`) for in-flight connections to close.
pub async fn run(core: Arc<ServerCore>, metrics: Arc<Metrics>) -> Result<()> {
    let listeners = transport::bind(&core.config.listen).await?;

    let active_connections = Arc::new(AtomicUsize::new(0));
    let (connections_closed_tx, mut connections_closed_rx) = watch::channel(());

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| BapError::OsError(format!("failed to install SIGTERM handler: {e}")))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| BapError::OsError(format!("failed to install SIGINT handler: {e}")))?;

    let pump_core = core.clone();
    let driver_pump_handle = tokio::spawn(async move { driver_pump(pump_core).await });

    info!("bap server starting");
    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, initiating graceful shutdown");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, initiating graceful shutdown");
                break;
            }
            result = listeners.accept() => {
                let (endpoint, peer) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let core = core.clone();
                let metrics = metrics.clone();
                let active = active_connections.clone();
                let closed_tx = connections_closed_tx.clone();
                active.fetch_add(1, Ordering::Relaxed);

                tokio::spawn(async move {
                    handle_connection(core, metrics, endpoint, peer).await;
                    let remaining = active.fetch_sub(1, Ordering::Relaxed);
                    if remaining == 1 {
                        let _ = closed_tx.send(());
                    }
                });
            }
        }
    }

    driver_pump_handle.abort();

    let shutdown_timeout = Duration::from_secs(core.config.timeout.shutdown_secs);
    let deadline = TokioInstant::now() + shutdown_timeout;
    tokio::select! {
        _ = connections_closed_rx.changed() => {
            info!("all connections closed, shutdown complete");
        }
        _ = tokio::time::sleep_until(deadline) => {
            let remaining = active_connections.load(Ordering::Relaxed);
            if remaining > 0 {
                warn!(remaining, "shutdown timeout reached with connections still active");
            }
        }
    }
    Ok(())
}

/// Reads one frame, truncating an oversize payload to `max_payload` and
/// resynchronizing the stream.
async fn read_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut R, max_payload: u32) -> Result<Option<(u32, Vec<u8>)>> {
    let header = match read_packet_header(reader).await.map_err(BapError::Io)? {
        HeaderOutcome::Header(h) => h,
        HeaderOutcome::Eof => return Ok(None),
    };
    let mut buf = vec![0u8; header.payload_len.min(max_payload) as usize];
    let n = read_packet_content(reader, header.payload_len, &mut buf).await.map_err(BapError::Io)?;
    buf.truncate(n);
    Ok(Some((header.type_tag, buf)))
}

/// Honors a write frame's `charset` field: only UTF-8 (the wire's implicit
/// default, BAP having no driver-side transcoding table) is accepted,
/// validated rather than silently trusted, since `BrailleBuffer::write_region`
/// copies text bytes verbatim into the text mirror.
fn decode_write_text(text: Option<&[u8]>, charset: Option<&str>) -> Result<Option<Vec<u8>>> {
    let Some(text) = text else { return Ok(None) };
    if let Some(cs) = charset {
        if !cs.eq_ignore_ascii_case("utf-8") && !cs.eq_ignore_ascii_case("utf8") {
            return Err(BapError::OpNotSupported);
        }
    }
    std::str::from_utf8(text).map_err(|e| BapError::InvalidParameter(format!("text is not valid utf-8: {e}")))?;
    Ok(Some(text.to_vec()))
}

async fn handle_connection(core: Arc<ServerCore>, metrics: Arc<Metrics>, endpoint: Endpoint, peer: String) {
    let peer_fd = endpoint.peer_fd();
    let (mut reader, writer) = split(endpoint);
    let writer = Arc::new(Mutex::new(writer));

    {
        let connections = core.connections.lock().await;
        if let Err(e) = connections.try_reserve_unauth_slot() {
            debug!(peer = %peer, error = %e, "rejecting connection: too many unauthenticated peers");
            return;
        }
    }
    let unauth_counter = core.connections.lock().await.unauth_counter();
    let guard = UnauthGuard::new(unauth_counter);

    let outcome = negotiate(
        &mut reader,
        writer.as_ref(),
        &core.config.auth,
        core.config.security.max_payload,
        Duration::from_secs(core.config.security.handshake_timeout_secs),
        peer_fd,
    )
    .await;
    drop(guard);

    let outcome = match outcome {
        Ok(o) => {
            metrics.record_handshake(true);
            o
        }
        Err(e) => {
            metrics.record_handshake(false);
            debug!(peer = %peer, error = %e, "handshake failed");
            return;
        }
    };

    let conn_id = core.register_connection(peer.clone()).await;
    if core.apply_trigger(conn_id, Trigger::AuthOk).await.is_err() {
        warn!(conn_id, "connection authenticated but state transition was rejected");
    }
    info!(conn_id, peer = %peer, method = outcome.method, "connection authenticated");

    let key_pusher = {
        let core = core.clone();
        let writer = writer.clone();
        let max_payload = core.config.security.max_payload;
        tokio::spawn(async move { push_keys(core, writer, conn_id, max_payload).await })
    };

    let mut tty_handle = None;
    loop {
        let frame = match read_frame(&mut reader, core.config.security.max_payload).await {
            Ok(Some(f)) => f,
            Ok(None) => {
                debug!(conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                debug!(conn_id, error = %e, "connection read error");
                break;
            }
        };
        match handle_request(&core, conn_id, &mut tty_handle, frame, writer.as_ref()).await {
            Ok(()) => {}
            Err(e) if e.is_fatal_to_session() => {
                let _ = write_packet(
                    writer.as_ref(),
                    tag::EXCEPTION,
                    &ExceptionMsg { code: e.wire_code().code(), offending_type: 0, excerpt: Vec::new() }.encode(),
                )
                .await;
                break;
            }
            Err(e) => {
                let _ = write_packet(writer.as_ref(), tag::ERROR, &ErrorMsg { code: e.wire_code().code() }.encode())
                    .await;
            }
        }
    }

    key_pusher.abort();
    let _ = core.apply_trigger(conn_id, Trigger::Drop).await;
    core.drop_connection(conn_id, tty_handle).await;
}

/// Forwards buffered key events to the client as `k` frames as they
/// arrive, waking on the connection's `key_ready` notifier.
async fn push_keys<W: tokio::io::AsyncWrite + Unpin>(
    core: Arc<ServerCore>,
    writer: Arc<Mutex<W>>,
    conn_id: u64,
    _max_payload: u32,
) {
    loop {
        let Some(ready) = core.key_ready_handle(conn_id).await else { return };
        while let Some(code) = core.pop_key_event(conn_id).await {
            if write_packet(writer.as_ref(), tag::KEY, &KeyMsg { code }.encode()).await.is_err() {
                return;
            }
        }
        ready.notified().await;
    }
}

/// Dispatches one request frame for an authenticated connection. Returns
/// `Err` for the client to see as an `error`/`exception` frame, following
/// the session-fatal distinction in `BapError::is_fatal_to_session`.
async fn handle_request<W: tokio::io::AsyncWrite + Unpin>(
    core: &Arc<ServerCore>,
    conn_id: u64,
    tty_handle: &mut Option<crate::tty::TtyHandle>,
    frame: (u32, Vec<u8>),
    writer: &Mutex<W>,
) -> Result<()> {
    let (type_tag, payload) = frame;
    match type_tag {
        tag::GET_DRIVER_NAME => {
            let name = core.driver.name().to_string();
            write_packet(writer, tag::GET_DRIVER_NAME, name.as_bytes()).await.map_err(BapError::Io)?;
        }
        tag::GET_DISPLAY_SIZE => {
            let size = core.display_size();
            write_packet(writer, tag::GET_DISPLAY_SIZE, &DisplaySizeMsg { width: size.width, height: size.height }.encode())
                .await
                .map_err(BapError::Io)?;
        }
        tag::ENTER_TTY => {
            let msg = EnterTtyMsg::decode(&payload)?;
            core.apply_trigger(conn_id, Trigger::EnterTty).await?;
            let handle = core.enter_tty(conn_id, &msg.path).await?;
            *tty_handle = Some(handle);
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::LEAVE_TTY => {
            if let Some(handle) = tty_handle.take() {
                core.leave_tty(conn_id, handle).await;
            }
            core.apply_trigger(conn_id, Trigger::LeaveTty).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::SET_FOCUS => {
            let Some(handle) = *tty_handle else { return Err(BapError::IllegalInstruction) };
            let msg = SetFocusMsg::decode(&payload)?;
            core.set_focus(handle, msg.tty_number).await;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::IGNORE_KEY_RANGES => {
            let msg = KeyRangesMsg::decode(&payload)?;
            core.set_key_ranges(conn_id, &msg.ranges, bap_protocol::keyrange::Disposition::Ignore).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::ACCEPT_KEY_RANGES => {
            let msg = KeyRangesMsg::decode(&payload)?;
            core.set_key_ranges(conn_id, &msg.ranges, bap_protocol::keyrange::Disposition::Accept).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::WRITE => {
            if tty_handle.is_none() {
                return Err(BapError::IllegalInstruction);
            }
            let cell_count = core.display_size().cell_count();
            let msg = WriteMsg::decode(&payload, cell_count)?;
            let (begin, size) = msg.region.map(|(b, s)| (b as usize, s as usize)).unwrap_or((0, cell_count));
            let text = decode_write_text(msg.text.as_deref(), msg.charset.as_deref())?;
            core.write_buffer(
                conn_id,
                (begin, size),
                text.as_deref(),
                msg.and_mask.as_deref(),
                msg.or_mask.as_deref(),
                msg.cursor,
            )
            .await?;
            core.refresh_display(false).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::ENTER_RAW => {
            let _msg = EnterRawMsg::decode(&payload)?;
            core.apply_trigger(conn_id, Trigger::EnterRaw).await?;
            core.enter_raw(conn_id).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::LEAVE_RAW => {
            core.leave_raw(conn_id).await?;
            core.apply_trigger(conn_id, Trigger::LeaveRaw).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::SUSPEND_DRIVER => {
            let _msg = SuspendDriverMsg::decode(&payload)?;
            core.apply_trigger(conn_id, Trigger::SuspendDriver).await?;
            core.suspend_driver(conn_id).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::RESUME_DRIVER => {
            core.apply_trigger(conn_id, Trigger::ResumeDriver).await?;
            core.resume_driver(conn_id).await?;
            write_packet(writer, tag::ACK, &[]).await.map_err(BapError::Io)?;
        }
        tag::RAW_PACKET => {
            core.send_raw(conn_id, &payload).await?;
            let reply = core.recv_raw(conn_id).await?;
            // Always answer with exactly one frame, even if the driver had
            // nothing to say, so a client waiting on a reply never blocks
            // forever on a silent raw exchange.
            write_packet(writer, tag::RAW_PACKET, &reply).await.map_err(BapError::Io)?;
        }
        other => {
            return Err(BapError::UnknownInstruction(other));
        }
    }
    Ok(())
}

/// Polls the driver for incoming key events, dispatching each to
/// the admitting connection along the focus path, and separately fires
/// due auto-repeats. Runs for the lifetime of the server as a background
/// task, since the driver is its own event source rather than pushing
/// through a callback.
async fn driver_pump(core: Arc<ServerCore>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    loop {
        ticker.tick().await;
        match core.driver.poll_key().await {
            Ok(Some(code)) => {
                let outcome = core.dispatch_driver_key(code).await;
                let recipient = match outcome {
                    DispatchOutcome::Delivered(id) => Some(id),
                    DispatchOutcome::DeliveredWithDrop(id) => {
                        warn!(connection = id, "key buffer overflow");
                        Some(id)
                    }
                    DispatchOutcome::Unclaimed => None,
                };
                if let Some(id) = recipient {
                    let now = tokio::time::Instant::now().into_std();
                    let mut connections = core.connections.lock().await;
                    if let Some(conn) = connections.get_mut(id) {
                        note_key_arrival(conn, code, now);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "driver key poll failed");
            }
        }

        let now = tokio::time::Instant::now().into_std();
        let mut connections = core.connections.lock().await;
        for id in connections.ids().collect::<Vec<_>>() {
            let Some(conn) = connections.get_mut(id) else { continue };
            if let Some(code) = due_repeat(conn, now) {
                let dropped = conn.events.push(code);
                conn.key_ready.notify_one();
                if dropped {
                    warn!(connection = id, "key buffer overflow during auto-repeat");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_text_passes_through_as_none() {
        assert!(decode_write_text(None, None).unwrap().is_none());
    }

    #[test]
    fn unspecified_charset_defaults_to_utf8() {
        let out = decode_write_text(Some(b"hello"), None).unwrap();
        assert_eq!(out.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn explicit_utf8_charset_is_accepted() {
        let out = decode_write_text(Some("caf\u{e9}".as_bytes()), Some("UTF-8")).unwrap();
        assert_eq!(out.as_deref(), Some("caf\u{e9}".as_bytes()));
    }

    #[test]
    fn unsupported_charset_is_rejected() {
        let err = decode_write_text(Some(b"hello"), Some("ISO-8859-1")).unwrap_err();
        assert!(matches!(err, BapError::OpNotSupported));
    }

    #[test]
    fn invalid_utf8_bytes_are_rejected() {
        let err = decode_write_text(Some(&[0xff, 0xfe]), None).unwrap_err();
        assert!(matches!(err, BapError::InvalidParameter(_)));
    }
}
