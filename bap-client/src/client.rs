//! The public, synchronous-looking client API: each call writes one
//! request frame and awaits exactly one reply, while a background reader
//! task keeps delivering unsolicited key events on the side.

use std::sync::Arc;

use tokio::io::{split, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use bap_protocol::codec::write_packet;
use bap_protocol::frame::tag;
use bap_protocol::keycode::KeyCode;
use bap_protocol::keyrange::{Disposition, KeyRange};
use bap_protocol::message::{
    EnterRawMsg, EnterTtyMsg, ErrorMsg, ExceptionMsg, KeyRangesMsg, SetFocusMsg, SuspendDriverMsg, WriteMsg,
};
use bap_protocol::{error::WireError, MAX_PAYLOAD};

use crate::addr::ServerAddr;
use crate::error::{ClientError, Result};
use crate::handshake::{client_handshake, Credential};
use crate::transport::Stream;

/// A braille display's dimensions, as reported by `get_display_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

pub struct Client {
    writer: Arc<Mutex<WriteHalf<Stream>>>,
    reply_rx: Mutex<mpsc::Receiver<(u32, Vec<u8>)>>,
    key_rx: Mutex<mpsc::UnboundedReceiver<KeyCode>>,
    request_lock: Mutex<()>,
    reader_task: JoinHandle<()>,
}

impl Client {
    /// Connects to `addr`, runs the handshake with `credential`, and spawns
    /// the background reader task.
    pub async fn connect(addr: &ServerAddr, credential: Credential) -> Result<Client> {
        let stream = Stream::connect(addr).await?;
        let (mut reader, writer) = split(stream);
        let writer = Arc::new(Mutex::new(writer));

        client_handshake(&mut reader, writer.as_ref(), MAX_PAYLOAD, &credential).await?;

        let (reply_tx, reply_rx) = mpsc::channel(1);
        let (key_tx, key_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(crate::reader::run(reader, MAX_PAYLOAD, reply_tx, key_tx));

        Ok(Client {
            writer,
            reply_rx: Mutex::new(reply_rx),
            key_rx: Mutex::new(key_rx),
            request_lock: Mutex::new(()),
            reader_task,
        })
    }

    /// Sends one request frame and awaits its reply, serialized against
    /// any other concurrent caller on this client (the protocol allows
    /// only one outstanding request per connection).
    async fn request(&self, type_tag: u32, payload: &[u8]) -> Result<(u32, Vec<u8>)> {
        let _serialize = self.request_lock.lock().await;
        write_packet(self.writer.as_ref(), type_tag, payload).await?;
        let mut rx = self.reply_rx.lock().await;
        let (reply_tag, reply_payload) = rx.recv().await.ok_or(ClientError::Disconnected)?;
        match reply_tag {
            tag::ERROR => {
                let err = ErrorMsg::decode(&reply_payload)?;
                Err(ClientError::Server(WireError::from_code(err.code).unwrap_or(WireError::OsError)))
            }
            tag::EXCEPTION => {
                let err = ExceptionMsg::decode(&reply_payload)?;
                Err(ClientError::Server(WireError::from_code(err.code).unwrap_or(WireError::OsError)))
            }
            _ => Ok((reply_tag, reply_payload)),
        }
    }

    pub async fn get_driver_name(&self) -> Result<String> {
        let (_, payload) = self.request(tag::GET_DRIVER_NAME, &[]).await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    pub async fn get_display_size(&self) -> Result<DisplaySize> {
        let (_, payload) = self.request(tag::GET_DISPLAY_SIZE, &[]).await?;
        let msg = bap_protocol::message::DisplaySizeMsg::decode(&payload)?;
        Ok(DisplaySize { width: msg.width, height: msg.height })
    }

    pub async fn enter_tty(&self, path: &[u32], driver_name: &str) -> Result<()> {
        let msg = EnterTtyMsg { path: path.to_vec(), driver_name: driver_name.to_string() };
        self.request(tag::ENTER_TTY, &msg.encode()).await?;
        Ok(())
    }

    pub async fn leave_tty(&self) -> Result<()> {
        self.request(tag::LEAVE_TTY, &[]).await?;
        Ok(())
    }

    pub async fn set_focus(&self, tty_number: u32) -> Result<()> {
        self.request(tag::SET_FOCUS, &SetFocusMsg { tty_number }.encode()).await?;
        Ok(())
    }

    pub async fn ignore_key_ranges(&self, ranges: &[KeyRange]) -> Result<()> {
        self.set_key_ranges(ranges, Disposition::Ignore).await
    }

    pub async fn accept_key_ranges(&self, ranges: &[KeyRange]) -> Result<()> {
        self.set_key_ranges(ranges, Disposition::Accept).await
    }

    async fn set_key_ranges(&self, ranges: &[KeyRange], disposition: Disposition) -> Result<()> {
        let type_tag = match disposition {
            Disposition::Ignore => tag::IGNORE_KEY_RANGES,
            Disposition::Accept => tag::ACCEPT_KEY_RANGES,
        };
        self.request(type_tag, &KeyRangesMsg { ranges: ranges.to_vec() }.encode()).await?;
        Ok(())
    }

    /// Writes a full `WriteMsg`, for callers that need attribute masks, a
    /// cursor, or a sub-region. See [`Client::write_text`] for the common
    /// case of just writing a line of text.
    pub async fn write(&self, msg: &WriteMsg) -> Result<()> {
        self.request(tag::WRITE, &msg.encode()).await?;
        Ok(())
    }

    pub async fn write_text(&self, text: &[u8], cursor: Option<u32>) -> Result<()> {
        let msg = WriteMsg { text: Some(text.to_vec()), cursor, ..Default::default() };
        self.write(&msg).await
    }

    pub async fn enter_raw(&self, driver_name: &str) -> Result<()> {
        let msg = EnterRawMsg { driver_name: driver_name.to_string() };
        self.request(tag::ENTER_RAW, &msg.encode()).await?;
        Ok(())
    }

    pub async fn leave_raw(&self) -> Result<()> {
        self.request(tag::LEAVE_RAW, &[]).await?;
        Ok(())
    }

    /// Voluntarily releases the underlying display device so another
    /// process on the host may use it.
    pub async fn suspend_driver(&self, driver_name: &str) -> Result<()> {
        let msg = SuspendDriverMsg { driver_name: driver_name.to_string() };
        self.request(tag::SUSPEND_DRIVER, &msg.encode()).await?;
        Ok(())
    }

    /// Re-acquires the display device after [`Client::suspend_driver`].
    pub async fn resume_driver(&self) -> Result<()> {
        self.request(tag::RESUME_DRIVER, &[]).await?;
        Ok(())
    }

    /// Sends a raw, driver-specific packet and returns the server's raw
    /// reply (possibly empty, if the driver had nothing to say).
    pub async fn exchange_raw(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let (_, payload) = self.request(tag::RAW_PACKET, bytes).await?;
        Ok(payload)
    }

    /// Blocks until the next key event arrives, or the connection closes.
    pub async fn read_key(&self) -> Result<KeyCode> {
        let mut rx = self.key_rx.lock().await;
        rx.recv().await.ok_or(ClientError::Disconnected)
    }

    /// Returns the next buffered key event without waiting, if any.
    pub async fn try_read_key(&self) -> Option<KeyCode> {
        self.key_rx.lock().await.try_recv().ok()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bap_protocol::message::{AuthOffer, AuthRequest, KeyMsg, VersionMsg};
    use tokio::net::UnixListener;

    /// Drives a minimal fake server through the handshake, then answers
    /// exactly one `get_driver_name` request and pushes one key event.
    async fn fake_server(stream: tokio::net::UnixStream) {
        let (mut r, w) = tokio::io::split(stream);
        let w = Mutex::new(w);

        write_packet(&w, tag::VERSION, &VersionMsg { protocol_version: bap_protocol::PROTOCOL_VERSION }.encode())
            .await
            .unwrap();
        let _ = crate::handshake::read_frame(&mut r, MAX_PAYLOAD).await.unwrap();

        write_packet(&w, tag::AUTH, &AuthOffer { methods: vec![0] }.encode()).await.unwrap();
        let (_, payload) = crate::handshake::read_frame(&mut r, MAX_PAYLOAD).await.unwrap();
        let _ = AuthRequest::decode(&payload).unwrap();
        write_packet(&w, tag::ACK, &[]).await.unwrap();

        // Key event, delivered before the request it's racing with.
        write_packet(&w, tag::KEY, &KeyMsg { code: KeyCode::ascii(b'z', 0) }.encode()).await.unwrap();

        let (t, _) = crate::handshake::read_frame(&mut r, MAX_PAYLOAD).await.unwrap();
        assert_eq!(t, tag::GET_DRIVER_NAME);
        write_packet(&w, tag::GET_DRIVER_NAME, b"mock-driver").await.unwrap();
    }

    #[tokio::test]
    async fn connect_request_and_key_delivery_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bap.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            fake_server(stream).await;
        });

        let addr = ServerAddr::Unix(path);
        let client = Client::connect(&addr, Credential::None).await.unwrap();

        let name = client.get_driver_name().await.unwrap();
        assert_eq!(name, "mock-driver");

        let code = client.read_key().await.unwrap();
        assert_eq!(code, KeyCode::ascii(b'z', 0));

        server_task.await.unwrap();
    }
}
