//! A minimal listening endpoint that upgrades each accepted TCP stream.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{ConnectionErrorKind, Error, Result};
use crate::transport::remaining;

/// How often a timed accept checks the listener for a pending client.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Accepts TCP connections and performs the server side of the handshake.
///
/// Every accepted connection gets its own copy of the server's [`Config`].
/// The server does not track connections; hand each one to its own thread.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Config,
}

impl Server {
    /// Bind to `addr`. Use port 0 to let the OS pick one.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(Error::connect_failure)?;
        tracing::debug!(addr = ?listener.local_addr().ok(), "server listening");
        Ok(Self { listener, config })
    }

    /// The bound local address.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The bound port, or 0 if it cannot be determined.
    pub fn port(&self) -> u16 {
        self.listener.local_addr().map_or(0, |addr| addr.port())
    }

    /// Server configuration applied to accepted connections.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wait for a client and complete its opening handshake.
    ///
    /// `config.timeout` bounds the wait for a client and then every read and
    /// write of the handshake. With no timeout this blocks indefinitely.
    ///
    /// # Errors
    ///
    /// - `Error::Connection` with kind `ConnectTimeout` if no client connects
    ///   before the timeout
    /// - `Error::Connection` if accepting fails or the handshake is
    ///   malformed, e.g. `"Client had no Key in upgrade request"`
    /// - `Error::HandshakeTooLarge` if the request exceeds the limit
    pub fn accept(&self) -> Result<Connection<TcpStream>> {
        let (stream, peer) = match self.config.timeout {
            Some(timeout) => self.accept_before(Instant::now() + timeout)?,
            None => self.listener.accept().map_err(Error::connect_failure)?,
        };
        tracing::debug!(%peer, "accepted tcp connection");
        stream.set_nodelay(true)?;
        Connection::accept(stream, self.config.clone())
    }

    fn accept_before(&self, deadline: Instant) -> Result<(TcpStream, SocketAddr)> {
        self.listener
            .set_nonblocking(true)
            .map_err(Error::connect_failure)?;

        let accepted = loop {
            match self.listener.accept() {
                Ok(accepted) => break Ok(accepted),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => match remaining(deadline) {
                    Some(left) => thread::sleep(left.min(ACCEPT_POLL_INTERVAL)),
                    None => {
                        break Err(Error::connection(
                            ConnectionErrorKind::ConnectTimeout,
                            "No client connected before the timeout",
                        ));
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => break Err(Error::connect_failure(err)),
            }
        };

        self.listener
            .set_nonblocking(false)
            .map_err(Error::connect_failure)?;
        let (stream, peer) = accepted?;
        stream.set_nonblocking(false)?;
        Ok((stream, peer))
    }

    /// Iterate over upgraded connections, one `accept` per item.
    pub fn incoming(&self) -> impl Iterator<Item = Result<Connection<TcpStream>>> + '_ {
        std::iter::repeat_with(move || self.accept())
    }
}
