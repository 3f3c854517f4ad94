/// Hard cap on a frame's payload size. Implementations may negotiate a
/// smaller maximum but must never exceed this.
pub const MAX_PAYLOAD: u32 = 512;

/// Base TCP port; a deployment's configured port offset is added to it
/// (mirroring brltty's `BRLAPI_SOCKETPORTNUM` numbering scheme). Shared
/// between the server's listener setup and the client's default connect
/// address so the two never drift apart.
pub const BASE_TCP_PORT: u16 = 35751;

/// Size of a frame header: 4-byte length + 4-byte type tag.
pub const HEADER_SIZE: usize = 8;

/// A frame type tag. The wire form is a single ASCII character promoted to
/// a big-endian `u32`. We keep the full fixed tag set as named
/// constants rather than an enum so that unrecognized tags (future
/// extensions, or a corrupt stream) still round-trip as data instead of
/// panicking the codec.
pub mod tag {
    pub const VERSION: u32 = b'v' as u32;
    pub const AUTH: u32 = b'a' as u32;
    pub const GET_DRIVER_NAME: u32 = b'n' as u32;
    pub const GET_DISPLAY_SIZE: u32 = b's' as u32;
    pub const ENTER_TTY: u32 = b't' as u32;
    pub const LEAVE_TTY: u32 = b'L' as u32;
    pub const SET_FOCUS: u32 = b'F' as u32;
    pub const KEY: u32 = b'k' as u32;
    pub const IGNORE_KEY_RANGES: u32 = b'm' as u32;
    pub const ACCEPT_KEY_RANGES: u32 = b'u' as u32;
    pub const WRITE: u32 = b'w' as u32;
    pub const ENTER_RAW: u32 = b'*' as u32;
    pub const LEAVE_RAW: u32 = b'#' as u32;
    pub const RAW_PACKET: u32 = b'p' as u32;
    pub const SUSPEND_DRIVER: u32 = b'S' as u32;
    pub const RESUME_DRIVER: u32 = b'R' as u32;
    pub const ACK: u32 = b'A' as u32;
    pub const ERROR: u32 = b'e' as u32;
    pub const EXCEPTION: u32 = b'E' as u32;

    /// Human-readable name, for logs only.
    pub fn name(t: u32) -> &'static str {
        match t {
            VERSION => "version",
            AUTH => "auth",
            GET_DRIVER_NAME => "get_driver_name",
            GET_DISPLAY_SIZE => "get_display_size",
            ENTER_TTY => "enter_tty",
            LEAVE_TTY => "leave_tty",
            SET_FOCUS => "set_focus",
            KEY => "key",
            IGNORE_KEY_RANGES => "ignore_key_ranges",
            ACCEPT_KEY_RANGES => "accept_key_ranges",
            WRITE => "write",
            ENTER_RAW => "enter_raw",
            LEAVE_RAW => "leave_raw",
            RAW_PACKET => "raw_packet",
            SUSPEND_DRIVER => "suspend_driver",
            RESUME_DRIVER => "resume_driver",
            ACK => "ack",
            ERROR => "error",
            EXCEPTION => "exception",
            _ => "unknown",
        }
    }
}

/// Magic number expected in the payload of an `enter_raw` request.
pub const RAW_MAGIC: u32 = 0xdead_beef;

/// Decoded frame header: announced payload length and type tag. The
/// payload itself is read separately (`read_packet_content`) so that an
/// oversize announcement can be handled with truncate-and-resync
/// semantics instead of buffering an attacker-chosen amount up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_tag: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.type_tag.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let payload_len = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let type_tag = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        FrameHeader { type_tag, payload_len }
    }
}
