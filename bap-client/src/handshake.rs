//! Client side of the handshake in `bap_server_lib::auth::negotiator`: read
//! the server's version announcement and echo it back, read the auth
//! offer, send the caller's chosen credential, and wait for the ack.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use bap_protocol::codec::{read_packet_content, read_packet_header, write_packet, HeaderOutcome};
use bap_protocol::frame::tag;
use bap_protocol::message::{auth_method, AuthOffer, AuthRequest, ErrorMsg, VersionMsg};
use bap_protocol::PROTOCOL_VERSION;

use crate::error::{ClientError, Result};

/// A credential to offer during the handshake. The caller picks one up
/// front; the client does not retry with a different method on rejection.
#[derive(Debug, Clone)]
pub enum Credential {
    None,
    KeyFile(Vec<u8>),
    LocalUser,
    LocalGroup,
}

impl Credential {
    fn method(&self) -> u32 {
        match self {
            Credential::None => auth_method::NONE,
            Credential::KeyFile(_) => auth_method::KEY_FILE,
            Credential::LocalUser => auth_method::LOCAL_USER,
            Credential::LocalGroup => auth_method::LOCAL_GROUP,
        }
    }

    fn data(&self) -> Vec<u8> {
        match self {
            Credential::KeyFile(bytes) => bytes.clone(),
            _ => Vec::new(),
        }
    }
}

pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_payload: u32) -> Result<(u32, Vec<u8>)> {
    let header = match read_packet_header(reader).await? {
        HeaderOutcome::Header(h) => h,
        HeaderOutcome::Eof => return Err(ClientError::Disconnected),
    };
    let mut buf = vec![0u8; header.payload_len.min(max_payload) as usize];
    let n = read_packet_content(reader, header.payload_len, &mut buf).await?;
    buf.truncate(n);
    Ok((header.type_tag, buf))
}

pub(crate) async fn client_handshake<R, W>(
    reader: &mut R,
    writer: &Mutex<W>,
    max_payload: u32,
    credential: &Credential,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (t, payload) = read_frame(reader, max_payload).await?;
    if t != tag::VERSION {
        return Err(ClientError::Handshake("expected a version frame first".into()));
    }
    let version = VersionMsg::decode(&payload)?;
    write_packet(writer, tag::VERSION, &version.encode()).await?;
    if version.protocol_version != PROTOCOL_VERSION {
        return Err(ClientError::Handshake(format!(
            "server speaks protocol version {}, this client speaks {}",
            version.protocol_version, PROTOCOL_VERSION
        )));
    }

    let (t, payload) = read_frame(reader, max_payload).await?;
    if t != tag::AUTH {
        return Err(ClientError::Handshake("expected an auth offer".into()));
    }
    let _offer = AuthOffer::decode(&payload)?;

    write_packet(
        writer,
        tag::AUTH,
        &AuthRequest { method: credential.method(), data: credential.data() }.encode(),
    )
    .await?;

    let (t, payload) = read_frame(reader, max_payload).await?;
    match t {
        tag::ACK => Ok(()),
        tag::ERROR => {
            let err = ErrorMsg::decode(&payload)?;
            let code = bap_protocol::error::WireError::from_code(err.code)
                .unwrap_or(bap_protocol::error::WireError::Authentication);
            Err(ClientError::Server(code))
        }
        _ => Err(ClientError::Handshake("unexpected frame while waiting for the auth ack".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bap_protocol::message::ErrorMsg as WireErrorMsg;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn full_handshake_round_trip_over_a_duplex_pipe() {
        let (client, server) = duplex(4096);
        let (mut client_r, client_w) = split(client);
        let (mut server_r, mut server_w) = split(server);
        let client_w = Mutex::new(client_w);

        let client_task = tokio::spawn(async move {
            client_handshake(&mut client_r, &client_w, 512, &Credential::None).await
        });

        // Fake server side, driven by hand.
        write_packet(
            &Mutex::new(&mut server_w),
            tag::VERSION,
            &VersionMsg { protocol_version: PROTOCOL_VERSION }.encode(),
        )
        .await
        .unwrap();
        let (t, payload) = read_frame(&mut server_r, 512).await.unwrap();
        assert_eq!(t, tag::VERSION);
        assert_eq!(VersionMsg::decode(&payload).unwrap().protocol_version, PROTOCOL_VERSION);

        write_packet(
            &Mutex::new(&mut server_w),
            tag::AUTH,
            &AuthOffer { methods: vec![auth_method::NONE] }.encode(),
        )
        .await
        .unwrap();
        let (t, payload) = read_frame(&mut server_r, 512).await.unwrap();
        assert_eq!(t, tag::AUTH);
        let request = AuthRequest::decode(&payload).unwrap();
        assert_eq!(request.method, auth_method::NONE);

        write_packet(&Mutex::new(&mut server_w), tag::ACK, &[]).await.unwrap();

        client_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected_before_auth() {
        let (client, server) = duplex(4096);
        let (mut client_r, client_w) = split(client);
        let (_server_r, mut server_w) = split(server);
        let client_w = Mutex::new(client_w);

        write_packet(
            &Mutex::new(&mut server_w),
            tag::VERSION,
            &VersionMsg { protocol_version: PROTOCOL_VERSION + 1 }.encode(),
        )
        .await
        .unwrap();

        let result = client_handshake(&mut client_r, &client_w, 512, &Credential::None).await;
        assert!(matches!(result, Err(ClientError::Handshake(_))));
    }

    #[tokio::test]
    async fn rejected_credential_surfaces_as_a_server_error() {
        let (client, server) = duplex(4096);
        let (mut client_r, client_w) = split(client);
        let (mut server_r, mut server_w) = split(server);
        let client_w = Mutex::new(client_w);

        let client_task =
            tokio::spawn(async move { client_handshake(&mut client_r, &client_w, 512, &Credential::None).await });

        write_packet(
            &Mutex::new(&mut server_w),
            tag::VERSION,
            &VersionMsg { protocol_version: PROTOCOL_VERSION }.encode(),
        )
        .await
        .unwrap();
        let _ = read_frame(&mut server_r, 512).await.unwrap();

        write_packet(&Mutex::new(&mut server_w), tag::AUTH, &AuthOffer { methods: vec![] }.encode())
            .await
            .unwrap();
        let _ = read_frame(&mut server_r, 512).await.unwrap();

        write_packet(
            &Mutex::new(&mut server_w),
            tag::ERROR,
            &WireErrorMsg { code: bap_protocol::error::WireError::Authentication.code() }.encode(),
        )
        .await
        .unwrap();

        let result = client_task.await.unwrap();
        assert!(matches!(result, Err(ClientError::Server(bap_protocol::error::WireError::Authentication))));
    }
}
