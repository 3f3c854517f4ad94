//! The background reader task: one task owns the read half of the
//! connection, routes unsolicited `k` frames to a key channel, and hands
//! everything else to whichever call is waiting on a reply. The protocol
//! is strictly request/response per connection, so a single-slot reply
//! channel is enough — no request-id matching needed.

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use bap_protocol::frame::tag;
use bap_protocol::keycode::KeyCode;
use bap_protocol::message::KeyMsg;

use crate::handshake::read_frame;

pub(crate) async fn run<R: AsyncRead + Unpin>(
    mut reader: R,
    max_payload: u32,
    reply_tx: mpsc::Sender<(u32, Vec<u8>)>,
    key_tx: mpsc::UnboundedSender<KeyCode>,
) {
    loop {
        let (t, payload) = match read_frame(&mut reader, max_payload).await {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "client reader exiting");
                return;
            }
        };

        if t == tag::KEY {
            match KeyMsg::decode(&payload) {
                Ok(msg) => {
                    let _ = key_tx.send(msg.code);
                }
                Err(e) => warn!(error = %e, "malformed key frame from server"),
            }
            continue;
        }

        if reply_tx.send((t, payload)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bap_protocol::codec::write_packet;
    use tokio::io::duplex;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn key_frames_go_to_the_key_channel_others_to_the_reply_channel() {
        let (mut test_side, reader_side) = duplex(4096);
        let (reply_tx, mut reply_rx) = mpsc::channel(4);
        let (key_tx, mut key_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(run(reader_side, 512, reply_tx, key_tx));

        let writer = Mutex::new(&mut test_side);
        write_packet(&writer, tag::KEY, &KeyMsg { code: KeyCode::ascii(b'a', 0) }.encode())
            .await
            .unwrap();
        write_packet(&writer, tag::ACK, &[]).await.unwrap();

        let code = key_rx.recv().await.unwrap();
        assert_eq!(code, KeyCode::ascii(b'a', 0));

        let (t, _) = reply_rx.recv().await.unwrap();
        assert_eq!(t, tag::ACK);

        drop(test_side);
        reader_task.await.unwrap();
    }
}
