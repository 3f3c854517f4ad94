//! The handshake state machine: version exchange, auth-offer,
//! auth-request/ack, bounded by an absolute timeout, in the same
//! accept-then-negotiate shape as a TLS handshake, but driven by this
//! protocol's own negotiation frames instead of a TLS record layer.

use std::os::unix::io::RawFd;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use bap_protocol::codec::{read_packet_content, read_packet_header, write_packet, HeaderOutcome};
use bap_protocol::frame::tag;
use bap_protocol::message::{auth_method, AuthOffer, AuthRequest, VersionMsg};
use bap_protocol::PROTOCOL_VERSION;

use crate::auth::credentials::{peer_credentials, PeerCredentials};
use crate::config::AuthConfig;
use crate::error::{BapError, Result};

pub struct NegotiationOutcome {
    pub method: u32,
    pub peer_credentials: Option<PeerCredentials>,
}

/// Drives one connection through the handshake. `peer_fd`
/// is `Some` for a local-socket transport (peer-credential checks are
/// possible) and `None` on TCP.
pub async fn negotiate<R, W>(
    reader: &mut R,
    writer: &Mutex<W>,
    config: &AuthConfig,
    max_payload: u32,
    handshake_timeout: Duration,
    peer_fd: Option<RawFd>,
) -> Result<NegotiationOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    timeout(
        handshake_timeout,
        negotiate_inner(reader, writer, config, max_payload, peer_fd),
    )
    .await
    .map_err(|_| BapError::Authentication)?
}

async fn negotiate_inner<R, W>(
    reader: &mut R,
    writer: &Mutex<W>,
    config: &AuthConfig,
    max_payload: u32,
    peer_fd: Option<RawFd>,
) -> Result<NegotiationOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_packet(
        writer,
        tag::VERSION,
        &VersionMsg { protocol_version: PROTOCOL_VERSION }.encode(),
    )
    .await?;

    let client_version = read_frame(reader, max_payload).await?;
    if client_version.0 != tag::VERSION {
        return Err(BapError::InvalidPacket("expected version frame".into()));
    }
    let version = VersionMsg::decode(&client_version.1)?;
    if version.protocol_version != PROTOCOL_VERSION {
        let _ = write_packet(
            writer,
            tag::ERROR,
            &bap_protocol::message::ErrorMsg {
                code: bap_protocol::error::WireError::ProtocolVersion.code(),
            }
            .encode(),
        )
        .await;
        return Err(BapError::ProtocolVersion);
    }

    let methods = offered_methods(config);
    write_packet(writer, tag::AUTH, &AuthOffer { methods }.encode()).await?;

    loop {
        let (t, payload) = read_frame(reader, max_payload).await?;
        if t != tag::AUTH {
            return Err(BapError::IllegalInstruction);
        }
        let request = AuthRequest::decode(&payload)?;
        match try_method(&request, config, peer_fd) {
            Ok(creds) => {
                write_packet(writer, tag::ACK, &[]).await?;
                return Ok(NegotiationOutcome { method: request.method, peer_credentials: creds });
            }
            Err(err) => {
                debug!(method = request.method, error = %err, "auth attempt rejected");
                let _ = write_packet(
                    writer,
                    tag::ERROR,
                    &bap_protocol::message::ErrorMsg { code: err.wire_code().code() }.encode(),
                )
                .await;
            }
        }
    }
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_payload: u32) -> Result<(u32, Vec<u8>)> {
    let header = match read_packet_header(reader).await? {
        HeaderOutcome::Header(h) => h,
        HeaderOutcome::Eof => return Err(BapError::Eof),
    };
    let mut buf = vec![0u8; (header.payload_len.min(max_payload)) as usize];
    let n = read_packet_content(reader, header.payload_len, &mut buf).await?;
    buf.truncate(n);
    Ok((header.type_tag, buf))
}

fn offered_methods(config: &AuthConfig) -> Vec<u32> {
    let mut methods = Vec::new();
    if config.allow_none {
        methods.push(auth_method::NONE);
    }
    if config.keyfile_path.is_some() {
        methods.push(auth_method::KEY_FILE);
    }
    if !config.allowed_uids.is_empty() {
        methods.push(auth_method::LOCAL_USER);
    }
    if !config.allowed_gids.is_empty() {
        methods.push(auth_method::LOCAL_GROUP);
    }
    methods
}

fn try_method(
    request: &AuthRequest,
    config: &AuthConfig,
    peer_fd: Option<RawFd>,
) -> Result<Option<PeerCredentials>> {
    match request.method {
        auth_method::NONE => {
            if !config.allow_none {
                return Err(BapError::Authentication);
            }
            let creds = match peer_fd {
                Some(fd) => Some(peer_credentials(fd)?),
                None => None,
            };
            Ok(creds)
        }
        auth_method::KEY_FILE => {
            let path = config.keyfile_path.as_ref().ok_or(BapError::Authentication)?;
            if request.data.is_empty() {
                return Err(BapError::Authentication);
            }
            let expected = std::fs::read(path).map_err(|e| BapError::OsError(e.to_string()))?;
            if expected.is_empty() || expected != request.data {
                return Err(BapError::Authentication);
            }
            Ok(None)
        }
        auth_method::LOCAL_USER => {
            let fd = peer_fd.ok_or(BapError::Authentication)?;
            let creds = peer_credentials(fd)?;
            if config.allowed_uids.contains(&creds.uid) {
                Ok(Some(creds))
            } else {
                Err(BapError::Authentication)
            }
        }
        auth_method::LOCAL_GROUP => {
            let fd = peer_fd.ok_or(BapError::Authentication)?;
            let creds = peer_credentials(fd)?;
            if config.allowed_gids.contains(&creds.gid) {
                Ok(Some(creds))
            } else {
                Err(BapError::Authentication)
            }
        }
        other => {
            warn!(method = other, "unrecognized auth method requested");
            Err(BapError::UnknownInstruction(other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn none_method_is_accepted_when_configured() {
        let mut config = AuthConfig::default();
        config.allow_none = true;
        let req = AuthRequest { method: auth_method::NONE, data: Vec::new() };
        let outcome = try_method(&req, &config, None).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn key_file_method_requires_exact_byte_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, b"sekret").unwrap();
        let mut config = AuthConfig::default();
        config.keyfile_path = Some(path.to_string_lossy().to_string());

        let ok = AuthRequest { method: auth_method::KEY_FILE, data: b"sekret".to_vec() };
        assert!(try_method(&ok, &config, None).is_ok());

        let bad = AuthRequest { method: auth_method::KEY_FILE, data: b"wrong".to_vec() };
        assert!(try_method(&bad, &config, None).is_err());
    }

    #[test]
    fn unconfigured_method_is_rejected() {
        let config = AuthConfig::default();
        let req = AuthRequest { method: auth_method::NONE, data: Vec::new() };
        assert!(try_method(&req, &config, None).is_err());
    }

    #[test]
    fn offered_methods_reflects_config() {
        let mut config = AuthConfig::default();
        config.allow_none = true;
        config.allowed_uids.push(1000);
        let methods = offered_methods(&config);
        assert!(methods.contains(&auth_method::NONE));
        assert!(methods.contains(&auth_method::LOCAL_USER));
        assert!(!methods.contains(&auth_method::KEY_FILE));
    }

    #[tokio::test]
    async fn timeout_is_an_authentication_error() {
        // Nobody drives the client side, so the handshake never completes
        // before the (very short) timeout fires.
        let (_client, server) = duplex(4096);
        let (mut r, w) = split(server);
        let writer = Mutex::new(w);
        let config = AuthConfig::default();
        let result = negotiate(&mut r, &writer, &config, 512, Duration::from_millis(10), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn full_handshake_round_trip_over_a_duplex_pipe() {
        let (client, server) = duplex(4096);
        let (mut client_r, mut client_w) = split(client);
        let (mut server_r, server_w) = split(server);
        let writer = Mutex::new(server_w);
        let mut config = AuthConfig::default();
        config.allow_none = true;

        let server_task = tokio::spawn(async move {
            negotiate(&mut server_r, &writer, &config, 512, Duration::from_secs(5), None).await
        });

        // Client side, driven by hand: read version, echo it back, read the
        // auth offer, request `none`, read the ack.
        let (_t, payload) = read_frame(&mut client_r, 512).await.unwrap();
        let server_version = VersionMsg::decode(&payload).unwrap();
        write_packet(&Mutex::new(&mut client_w), tag::VERSION, &server_version.encode())
            .await
            .unwrap();
        let (_t, offer_payload) = read_frame(&mut client_r, 512).await.unwrap();
        let offer = AuthOffer::decode(&offer_payload).unwrap();
        assert!(offer.methods.contains(&auth_method::NONE));
        write_packet(
            &Mutex::new(&mut client_w),
            tag::AUTH,
            &AuthRequest { method: auth_method::NONE, data: Vec::new() }.encode(),
        )
        .await
        .unwrap();
        let (ack_tag, _) = read_frame(&mut client_r, 512).await.unwrap();
        assert_eq!(ack_tag, tag::ACK);

        let outcome = server_task.await.unwrap().unwrap();
        assert_eq!(outcome.method, auth_method::NONE);
    }
}
