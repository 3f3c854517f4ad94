//! Wire framing, key-code model, and error taxonomy shared by the BAP
//! server and client.

pub mod codec;
pub mod error;
pub mod frame;
pub mod keycode;
pub mod keyrange;
pub mod message;

pub use error::{BapError, Result, WireError};
pub use frame::{FrameHeader, BASE_TCP_PORT, HEADER_SIZE, MAX_PAYLOAD, RAW_MAGIC};
pub use keycode::{KeyCode, KeyType};
pub use keyrange::{Disposition, KeyFilter, KeyRange};

/// The protocol version this crate implements.
pub const PROTOCOL_VERSION: u32 = 7;
