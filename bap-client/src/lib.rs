//! Async client library for the Braille Access Protocol (component J): a
//! background reader task routes unsolicited key events to a side channel
//! while the public API presents a synchronous-looking request/reply
//! surface (`enter_tty`, `write`, `read_key`, ...) over it.

mod addr;
mod client;
mod error;
mod handshake;
mod reader;
mod transport;

pub use addr::ServerAddr;
pub use client::{Client, DisplaySize};
pub use error::{ClientError, Result};
pub use handshake::Credential;

pub use bap_protocol::keycode::KeyCode;
pub use bap_protocol::keyrange::{Disposition, KeyRange};
pub use bap_protocol::message::WriteMsg;
