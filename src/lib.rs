//! # syncws - Synchronous WebSocket Protocol Implementation
//!
//! `syncws` is an RFC 6455 WebSocket library built on blocking `std::io`.
//! Each [`Connection`] owns one transport and drives one peer on the calling
//! thread; a configurable timeout bounds every connect, read and write.
//!
//! ## Features
//!
//! - **Frame codec** for buffers and blocking streams, all three length forms
//! - **Client and server handshakes** with header merging and basic auth
//! - **Fragmentation and reassembly** with control frames handled inline
//! - **Closing handshake** with status codes and reasons
//! - **TLS** for `wss://` via the `tls-rustls` or `tls-native` feature
//! - **Resource limits** on frame, message and handshake sizes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use syncws::{Config, Message};
//!
//! # fn main() -> syncws::Result<()> {
//! let mut conn = syncws::connect("ws://localhost:8000/", Config::client())?;
//! conn.send(Message::text("Hello"))?;
//! while let Some(msg) = conn.receive()? {
//!     println!("{:?}", msg);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{connect, connect_uri};
pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState, FrameObserver, Role};
pub use error::{ConnectionErrorKind, Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{
    Frame, HandshakeRequest, HandshakeResponse, HeaderMap, OpCode, WS_GUID, WsUri,
    compute_accept_key, encode_frame,
};
pub use server::Server;
pub use transport::{Stream, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<Role>();
        assert_send::<Frame>();
        assert_send::<Connection<std::net::TcpStream>>();
        assert_send::<Connection<Stream>>();
        assert_send::<Server>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
        assert_sync::<HeaderMap>();
    }
}
