//! Error types for the WebSocket protocol implementation.
//!
//! Every failure surfaces as a distinct [`Error`] variant. Protocol-level
//! variants mean the byte stream can no longer be trusted; a connection that
//! observes one is closed immediately.

use std::io;

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What part of the transport or opening handshake failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConnectionErrorKind {
    /// The transport could not be established.
    Connect,
    /// The transport could not be established before the timeout elapsed.
    ConnectTimeout,
    /// A read did not complete before the timeout elapsed.
    ReadTimeout,
    /// A write did not complete before the timeout elapsed.
    WriteTimeout,
    /// The peer closed the stream before a frame or handshake was complete.
    UnexpectedEof,
    /// Any other I/O failure on an established transport.
    Io,
    /// The opening handshake was malformed or rejected.
    Handshake,
}

impl std::fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionErrorKind::Connect => "connect",
            ConnectionErrorKind::ConnectTimeout => "connect timeout",
            ConnectionErrorKind::ReadTimeout => "read timeout",
            ConnectionErrorKind::WriteTimeout => "write timeout",
            ConnectionErrorKind::UnexpectedEof => "unexpected eof",
            ConnectionErrorKind::Io => "io",
            ConnectionErrorKind::Handshake => "handshake",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The URI does not use the `ws` or `wss` scheme, or cannot be parsed.
    #[error("Bad URI: {0}")]
    BadUri(String),

    /// An opcode name outside the recognized set was supplied.
    #[error("Bad opcode '{0}'")]
    BadOpcode(String),

    /// Transport failure, timeout, or failed opening handshake.
    #[error("Connection error ({kind}): {message}")]
    Connection {
        /// Which stage failed.
        kind: ConnectionErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Handshake data exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Operation attempted after the connection was closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

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

    /// Unmasked client frame while masking is required.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data in a buffer.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// Build a [`Error::Connection`] of the given kind.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection {
            kind,
            message: message.into(),
        }
    }

    /// Build a handshake failure.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::connection(ConnectionErrorKind::Handshake, message)
    }

    /// Classify an I/O error raised while reading from an open transport.
    pub fn read_failure(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionErrorKind::ReadTimeout,
            io::ErrorKind::UnexpectedEof => ConnectionErrorKind::UnexpectedEof,
            _ => ConnectionErrorKind::Io,
        };
        Self::connection(kind, err.to_string())
    }

    /// Classify an I/O error raised while writing to an open transport.
    pub fn write_failure(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionErrorKind::WriteTimeout,
            _ => ConnectionErrorKind::Io,
        };
        Self::connection(kind, err.to_string())
    }

    /// Classify an I/O error raised while establishing a transport.
    pub fn connect_failure(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                ConnectionErrorKind::ConnectTimeout
            }
            _ => ConnectionErrorKind::Connect,
        };
        Self::connection(kind, err.to_string())
    }

    /// The connection error kind, if this is a [`Error::Connection`].
    #[must_use]
    pub fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            Error::Connection { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` for errors caused by malformed or forbidden wire data.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_)
                | Error::InvalidUtf8
                | Error::FrameTooLarge { .. }
                | Error::MessageTooLarge { .. }
                | Error::TooManyFragments { .. }
                | Error::ReservedOpcode(_)
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge(_)
                | Error::UnmaskedClientFrame
                | Error::ReservedBitsSet
                | Error::IncompleteFrame { .. }
                | Error::InvalidCloseCode(_)
        )
    }

    /// Returns `true` if a connect, read or write timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.connection_kind(),
            Some(
                ConnectionErrorKind::ConnectTimeout
                    | ConnectionErrorKind::ReadTimeout
                    | ConnectionErrorKind::WriteTimeout
            )
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => ConnectionErrorKind::UnexpectedEof,
            _ => ConnectionErrorKind::Io,
        };
        Error::connection(kind, err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::BadUri(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
        assert_eq!(
            Error::BadOpcode("bad_opcode".into()).to_string(),
            "Bad opcode 'bad_opcode'"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert_eq!(ws_err.connection_kind(), Some(ConnectionErrorKind::Io));
    }

    #[test]
    fn test_timeouts_are_distinguishable() {
        let read = Error::read_failure(io::Error::from(io::ErrorKind::WouldBlock));
        let write = Error::write_failure(io::Error::from(io::ErrorKind::TimedOut));
        let connect = Error::connect_failure(io::Error::from(io::ErrorKind::TimedOut));

        assert_eq!(read.connection_kind(), Some(ConnectionErrorKind::ReadTimeout));
        assert_eq!(write.connection_kind(), Some(ConnectionErrorKind::WriteTimeout));
        assert_eq!(
            connect.connection_kind(),
            Some(ConnectionErrorKind::ConnectTimeout)
        );
        assert!(read.is_timeout() && write.is_timeout() && connect.is_timeout());
    }

    #[test]
    fn test_short_read_is_unexpected_eof() {
        let err = Error::read_failure(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(
            err.connection_kind(),
            Some(ConnectionErrorKind::UnexpectedEof)
        );
        assert!(!err.is_timeout());
        assert!(!err.is_protocol_error());
    }

    #[test]
    fn test_protocol_classification() {
        assert!(Error::ReservedBitsSet.is_protocol_error());
        assert!(Error::ProtocolViolation("x".into()).is_protocol_error());
        assert!(!Error::ConnectionClosed(None).is_protocol_error());
        assert!(!Error::BadUri("http".into()).is_protocol_error());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::InvalidUtf8;
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
