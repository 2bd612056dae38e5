//! WebSocket connection management and state machine.
//!
//! This module provides the blocking `Connection` type: opening handshake,
//! message sending/receiving, automatic control frame handling and the
//! closing handshake.
//!
//! ## Connection Lifecycle
//!
//! 1. **Unopened** - Transport bound, no handshake yet
//! 2. **Handshaking** - Upgrade request/response in flight
//! 3. **Open** - Messages flow in both directions
//! 4. **Closing** - Close frame sent, waiting for peer close
//! 5. **Closed** - Connection fully closed, transport shut down
//!
//! ## Example
//!
//! ```rust,no_run
//! use syncws::{CloseCode, Config, Connection, Message};
//! use std::net::TcpListener;
//!
//! # fn main() -> syncws::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:8000")?;
//! let (stream, _) = listener.accept()?;
//! let mut conn = Connection::accept(stream, Config::server())?;
//!
//! while let Some(msg) = conn.receive()? {
//!     conn.send(msg)?;
//! }
//! println!("closed with {:?}", conn.close_status().map(CloseCode::from));
//! # Ok(())
//! # }
//! ```

mod fragmenter;
mod observer;
mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
pub use fragmenter::MessageFragmenter;
pub use observer::FrameObserver;
pub use role::Role;
pub use state::ConnectionState;
