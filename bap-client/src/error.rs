//! Client-side error type. Distinct from [`bap_protocol::BapError`] because
//! a client has failure modes the server never sees: the peer closing the
//! reader task, or returning a wire error code it must translate back into
//! something the caller can match on.

use bap_protocol::error::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame from server: {0}")]
    Protocol(#[from] bap_protocol::BapError),

    #[error("server rejected the request: {0:?}")]
    Server(WireError),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection closed")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
