//! Session lifecycle states.

/// WebSocket session state.
///
/// A session only exists once the handshake has succeeded, so it starts
/// `Open`. There is no way back from `Closed`; a new session is built instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Ready for data transfer.
    #[default]
    Open,
    /// Our close frame is being written.
    Closing,
    /// Close exchanged, transport failed, or protocol violated.
    Closed,
}

impl ConnectionState {
    /// Sending data is only allowed while open.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether the session still holds a live transport.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
