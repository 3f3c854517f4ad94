//! The server shares its error taxonomy with the wire protocol; see
//! `bap_protocol::error` for the `BapError`/`WireError` definitions.

pub use bap_protocol::error::{BapError, Result, WireError};
