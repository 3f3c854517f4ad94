use thiserror::Error;

/// The wire error taxonomy. These are the only
/// codes that ever cross the wire inside an `e`/`E` frame; string detail
/// never leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WireError {
    Success = 0,
    NoMem = 1,
    TtyBusy = 2,
    DeviceBusy = 3,
    UnknownInstruction = 4,
    IllegalInstruction = 5,
    InvalidParameter = 6,
    InvalidPacket = 7,
    ConnectionRefused = 8,
    OpNotSupported = 9,
    ResolverError = 10,
    OsError = 11,
    UnknownTty = 12,
    ProtocolVersion = 13,
    Eof = 14,
    EmptyKey = 15,
    DriverError = 16,
    Authentication = 17,
}

impl WireError {
    pub fn from_code(code: u32) -> Option<Self> {
        use WireError::*;
        Some(match code {
            0 => Success,
            1 => NoMem,
            2 => TtyBusy,
            3 => DeviceBusy,
            4 => UnknownInstruction,
            5 => IllegalInstruction,
            6 => InvalidParameter,
            7 => InvalidPacket,
            8 => ConnectionRefused,
            9 => OpNotSupported,
            10 => ResolverError,
            11 => OsError,
            12 => UnknownTty,
            13 => ProtocolVersion,
            14 => Eof,
            15 => EmptyKey,
            16 => DriverError,
            17 => Authentication,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether an error of this kind is fatal to the session (everything
    /// else stays an `error` frame and the connection remains open).
    pub fn is_fatal_to_session(self) -> bool {
        matches!(self, WireError::ProtocolVersion | WireError::InvalidPacket)
    }
}

/// In-process error type for the server and protocol layer. Every variant
/// maps onto a [`WireError`] via [`BapError::wire_code`]; string detail is
/// for logs only and never crosses the wire.
#[derive(Debug, Error)]
pub enum BapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("out of memory")]
    NoMem,

    #[error("tty is busy")]
    TtyBusy,

    #[error("device is busy")]
    DeviceBusy,

    #[error("unknown instruction: {0:#x}")]
    UnknownInstruction(u32),

    #[error("illegal instruction in current state")]
    IllegalInstruction,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("operation not supported")]
    OpNotSupported,

    #[error("resolver error: {0}")]
    ResolverError(String),

    #[error("OS error: {0}")]
    OsError(String),

    #[error("unknown tty")]
    UnknownTty,

    #[error("protocol version mismatch")]
    ProtocolVersion,

    #[error("end of file")]
    Eof,

    #[error("no key available")]
    EmptyKey,

    #[error("driver error: {0}")]
    DriverError(String),

    #[error("authentication failed")]
    Authentication,
}

pub type Result<T> = std::result::Result<T, BapError>;

impl BapError {
    pub fn wire_code(&self) -> WireError {
        match self {
            BapError::Io(_) => WireError::OsError,
            BapError::Config(_) => WireError::OsError,
            BapError::NoMem => WireError::NoMem,
            BapError::TtyBusy => WireError::TtyBusy,
            BapError::DeviceBusy => WireError::DeviceBusy,
            BapError::UnknownInstruction(_) => WireError::UnknownInstruction,
            BapError::IllegalInstruction => WireError::IllegalInstruction,
            BapError::InvalidParameter(_) => WireError::InvalidParameter,
            BapError::InvalidPacket(_) => WireError::InvalidPacket,
            BapError::ConnectionRefused(_) => WireError::ConnectionRefused,
            BapError::OpNotSupported => WireError::OpNotSupported,
            BapError::ResolverError(_) => WireError::ResolverError,
            BapError::OsError(_) => WireError::OsError,
            BapError::UnknownTty => WireError::UnknownTty,
            BapError::ProtocolVersion => WireError::ProtocolVersion,
            BapError::Eof => WireError::Eof,
            BapError::EmptyKey => WireError::EmptyKey,
            BapError::DriverError(_) => WireError::DriverError,
            BapError::Authentication => WireError::Authentication,
        }
    }

    /// Whether this error is fatal to the session.
    pub fn is_fatal_to_session(&self) -> bool {
        self.wire_code().is_fatal_to_session()
    }
}
