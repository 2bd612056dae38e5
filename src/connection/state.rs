//! Connection lifecycle states.

/// WebSocket connection state.
///
/// `Unopened → Handshaking → Open → Closing → Closed`. A connection can drop
/// straight to `Closed` from any state on a transport or protocol failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No transport has been attached yet.
    #[default]
    Unopened,
    /// Transport attached, opening handshake in progress.
    Handshaking,
    /// Connection is open and ready for data transfer.
    Open,
    /// Close frame sent, waiting for peer's close frame.
    Closing,
    /// Connection is fully closed.
    Closed,
}

impl ConnectionState {
    /// Whether the connection counts as connected (`Open` or `Closing`).
    #[must_use]
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open` state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if receiving data is allowed in this state.
    ///
    /// Returns `true` for `Open` or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Unopened => "Unopened",
            ConnectionState::Handshaking => "Handshaking",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        })
    }
}
