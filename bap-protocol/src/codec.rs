//! Framed packet codec (component A): length/type-prefixed framing over any
//! stream-like endpoint, with strict size bounds and recv-with-truncation
//! semantics for oversize frames.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::frame::{FrameHeader, HEADER_SIZE};

/// Outcome of reading a frame header: either a header was read, or the
/// stream was exactly at a frame boundary when it hit EOF (a clean close).
/// An EOF in the *middle* of a header is reported as an `io::Error` of kind
/// `UnexpectedEof`, distinct from a boundary EOF.
#[derive(Debug)]
pub enum HeaderOutcome {
    Header(FrameHeader),
    Eof,
}

/// Reads a full buffer, retrying on short reads rather than treating a
/// partial read as a truncated frame. Returns the number of bytes
/// actually read before EOF.
async fn read_looped<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads and discards exactly `len` bytes, looping on short reads. Used to
/// resynchronize the stream after a truncated oversize frame.
async fn discard_looped<R: AsyncRead + Unpin>(r: &mut R, mut len: usize) -> io::Result<()> {
    let mut sink = [0u8; 4096];
    while len > 0 {
        let chunk = len.min(sink.len());
        let n = r.read(&mut sink[..chunk]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "eof while discarding truncated payload",
            ));
        }
        len -= n;
    }
    Ok(())
}

/// `read_packet_header(endpoint) -> (type, length) | eof | io_error`.
/// Does not consume the payload.
pub async fn read_packet_header<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<HeaderOutcome> {
    let mut buf = [0u8; HEADER_SIZE];
    let n = read_looped(r, &mut buf).await?;
    if n == 0 {
        return Ok(HeaderOutcome::Eof);
    }
    if n < HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "eof mid-frame while reading header",
        ));
    }
    Ok(HeaderOutcome::Header(FrameHeader::decode(&buf)))
}

/// `read_packet_content(endpoint, expected_length, buffer) -> consumed`.
/// If `expected_length` exceeds `buffer.len()`, fills the buffer and
/// silently discards the remainder, leaving the stream resynchronized at
/// the next frame boundary. Returns the number of bytes placed into
/// `buffer` (which may be less than `buffer.len()` if `expected_length` was
/// smaller).
pub async fn read_packet_content<R: AsyncRead + Unpin>(
    r: &mut R,
    expected_length: u32,
    buffer: &mut [u8],
) -> io::Result<usize> {
    let expected = expected_length as usize;
    let to_fill = expected.min(buffer.len());
    let n = read_looped(r, &mut buffer[..to_fill]).await?;
    if n < to_fill {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "eof mid-frame while reading payload",
        ));
    }
    if expected > buffer.len() {
        discard_looped(r, expected - buffer.len()).await?;
    }
    Ok(n)
}

/// `write_packet(endpoint, type, payload) -> ok | io_error`. Atomic: header
/// and payload are written under `lock` so concurrent writers on the same
/// endpoint can never interleave frames.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    lock: &Mutex<W>,
    type_tag: u32,
    payload: &[u8],
) -> io::Result<()> {
    let header = FrameHeader {
        type_tag,
        payload_len: payload.len() as u32,
    };
    let mut w = lock.lock().await;
    w.write_all(&header.encode()).await?;
    if !payload.is_empty() {
        w.write_all(payload).await?;
    }
    w.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MAX_PAYLOAD;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trip_small_payload() {
        let payload = b"hello bap";
        let header = FrameHeader {
            type_tag: crate::frame::tag::VERSION,
            payload_len: payload.len() as u32,
        };
        let mut wire = Vec::new();
        wire.extend_from_slice(&header.encode());
        wire.extend_from_slice(payload);

        let mut cursor = Cursor::new(wire);
        let outcome = read_packet_header(&mut cursor).await.unwrap();
        let hdr = match outcome {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => panic!("expected header"),
        };
        assert_eq!(hdr.type_tag, crate::frame::tag::VERSION);
        assert_eq!(hdr.payload_len, payload.len() as u32);

        let mut buf = vec![0u8; hdr.payload_len as usize];
        let n = read_packet_content(&mut cursor, hdr.payload_len, &mut buf).await.unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(&buf[..n], payload);
    }

    #[tokio::test]
    async fn clean_eof_at_boundary() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let outcome = read_packet_header(&mut cursor).await.unwrap();
        assert!(matches!(outcome, HeaderOutcome::Eof));
    }

    #[tokio::test]
    async fn mid_frame_eof_is_an_error() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0]);
        let err = read_packet_header(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn oversize_payload_is_truncated_and_resynchronized() {
        let oversize_len = 10_000u32;
        let header = FrameHeader {
            type_tag: crate::frame::tag::WRITE,
            payload_len: oversize_len,
        };
        let mut wire = Vec::new();
        wire.extend_from_slice(&header.encode());
        wire.extend(std::iter::repeat(0xAAu8).take(oversize_len as usize));
        // A second frame right after, to prove resynchronization.
        let next = FrameHeader {
            type_tag: crate::frame::tag::ACK,
            payload_len: 0,
        };
        wire.extend_from_slice(&next.encode());

        let mut cursor = Cursor::new(wire);
        let hdr = match read_packet_header(&mut cursor).await.unwrap() {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => panic!("expected header"),
        };
        assert_eq!(hdr.payload_len, oversize_len);
        assert!(hdr.payload_len > MAX_PAYLOAD);

        let mut buf = vec![0u8; MAX_PAYLOAD as usize];
        let n = read_packet_content(&mut cursor, hdr.payload_len, &mut buf).await.unwrap();
        assert_eq!(n, MAX_PAYLOAD as usize);

        let hdr2 = match read_packet_header(&mut cursor).await.unwrap() {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => panic!("expected second header"),
        };
        assert_eq!(hdr2.type_tag, crate::frame::tag::ACK);
        assert_eq!(hdr2.payload_len, 0);
    }
}
