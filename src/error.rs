//! Error types for the lock controller.
//!
//! Every fallible operation in the crate funnels into [`Error`]. The main loop
//! never matches on individual variants; it asks [`Error::kind`] which bucket
//! of the fault taxonomy an error belongs to and reacts to that.

use thiserror::Error;

/// Result type alias for lock controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame payload exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Announced payload size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Continuation frames and fragmented data frames are not supported.
    #[error("Fragmented messages are not supported")]
    UnsupportedContinuation,

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response exceeded the configured size.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// An application envelope could not be parsed or serialised.
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Device settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A GPIO or timer capability reported a failure.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Fetching or staging a firmware artifact failed.
    #[error("Update error: {0}")]
    Update(String),
}

/// Coarse classification of an [`Error`] used by the main loop.
///
/// An empty poll is not an error: the session reports it as
/// [`Received::None`](crate::Received::None).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The session is gone; reconnect on the next iteration.
    TransportClosed,
    /// The peer broke the wire protocol; the session has been closed.
    ProtocolViolation,
    /// The upgrade handshake failed; retried by the transport manager.
    HandshakeFailure,
    /// Anything else. Reported as telemetry, never fatal.
    ApplicationFault,
}

impl Error {
    /// Classify this error into the fault taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConnectionClosed(_) | Error::Io(_) => ErrorKind::TransportClosed,
            Error::InvalidFrame(_)
            | Error::InvalidUtf8
            | Error::FrameTooLarge { .. }
            | Error::UnsupportedContinuation
            | Error::ReservedOpcode(_)
            | Error::InvalidOpcode(_)
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::ReservedBitsSet
            | Error::IncompleteFrame { .. } => ErrorKind::ProtocolViolation,
            Error::InvalidHandshake(_) | Error::HandshakeTooLarge { .. } | Error::Tls(_) => {
                ErrorKind::HandshakeFailure
            }
            Error::InvalidCloseCode(_)
            | Error::Envelope(_)
            | Error::Config(_)
            | Error::Hardware(_)
            | Error::Update(_) => ErrorKind::ApplicationFault,
        }
    }

    /// Whether the main loop should silently carry on after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::TransportClosed
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Envelope(err.to_string())
    }
}
