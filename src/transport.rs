//! Byte-stream transports a [`Connection`](crate::Connection) runs over.
//!
//! Anything that is `Read + Write` and can apply a timeout and be shut down
//! qualifies. Plain TCP is always available; TLS client streams for `wss`
//! come from the `tls-rustls` or `tls-native` features.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::{ConnectionErrorKind, Error, Result};
use crate::protocol::WsUri;

/// A blocking, bidirectional byte stream.
pub trait Transport: Read + Write {
    /// Apply `timeout` to every subsequent read and write. `None` blocks
    /// indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

/// Open a TCP connection to `host:port`.
///
/// Resolved addresses are tried in turn. `timeout` bounds the whole connect:
/// each attempt only gets the time left before the shared deadline. The
/// timeout is then applied to reads and writes on the returned stream.
///
/// # Errors
///
/// Returns `Error::Connection` with kind `ConnectTimeout` if the deadline
/// passes (or the last attempt timed out), `Connect` for any other failure
/// (including name resolution).
pub fn connect_transport(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let addrs = (host, port).to_socket_addrs().map_err(|err| {
        Error::connection(
            ConnectionErrorKind::Connect,
            format!("Could not resolve \"{}:{}\": {}", host, port, err),
        )
    })?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = match deadline {
            Some(deadline) => match remaining(deadline) {
                Some(left) => TcpStream::connect_timeout(&addr, left),
                None => {
                    last_err = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connect deadline elapsed",
                    ));
                    break;
                }
            },
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(mut stream) => {
                tracing::debug!(%addr, "tcp connected");
                stream.set_nodelay(true).map_err(Error::connect_failure)?;
                Transport::set_timeout(&mut stream, timeout).map_err(Error::connect_failure)?;
                return Ok(stream);
            }
            Err(err) => {
                tracing::debug!(%addr, error = %err, "tcp connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(match last_err {
        Some(err) => match Error::connect_failure(err) {
            Error::Connection { kind, message } => Error::connection(
                kind,
                format!("Could not open socket to \"{}:{}\": {}", host, port, message),
            ),
            other => other,
        },
        None => Error::connection(
            ConnectionErrorKind::Connect,
            format!("No addresses found for \"{}:{}\"", host, port),
        ),
    })
}

/// Time left until `deadline`, or `None` once it has passed.
pub(crate) fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
}

/// A client stream: plain TCP or TLS over TCP.
#[non_exhaustive]
pub enum Stream {
    /// Unencrypted `ws` connection.
    Plain(TcpStream),
    /// `wss` through rustls.
    #[cfg(feature = "tls-rustls")]
    Rustls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
    /// `wss` through the platform TLS library.
    #[cfg(feature = "tls-native")]
    NativeTls(native_tls::TlsStream<TcpStream>),
}

impl Stream {
    /// Connect to the host named by `uri`, setting up TLS for `wss`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the TCP connection or TLS session cannot
    /// be established, or if `wss` is requested without a TLS feature.
    pub fn connect(uri: &WsUri, timeout: Option<Duration>) -> Result<Self> {
        let tcp = connect_transport(uri.connect_host(), uri.port(), timeout)?;
        if uri.is_secure() {
            Self::wrap_tls(uri.connect_host(), tcp)
        } else {
            Ok(Stream::Plain(tcp))
        }
    }

    #[cfg(feature = "tls-rustls")]
    fn wrap_tls(domain: &str, tcp: TcpStream) -> Result<Self> {
        use std::sync::{Arc, OnceLock};

        static CLIENT_CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();

        let config = CLIENT_CONFIG.get_or_init(|| {
            let roots =
                rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        });

        let server_name = rustls::pki_types::ServerName::try_from(domain.to_string())
            .map_err(|_| tls_failure(format!("invalid DNS name: {}", domain)))?;
        let session = rustls::ClientConnection::new(Arc::clone(config), server_name)
            .map_err(|err| tls_failure(err.to_string()))?;

        let mut stream = rustls::StreamOwned::new(session, tcp);
        // Drive the TLS handshake now so certificate errors surface as connect errors.
        while stream.conn.is_handshaking() {
            stream
                .conn
                .complete_io(&mut stream.sock)
                .map_err(|err| tls_failure(err.to_string()))?;
        }
        Ok(Stream::Rustls(Box::new(stream)))
    }

    #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
    fn wrap_tls(domain: &str, tcp: TcpStream) -> Result<Self> {
        let connector =
            native_tls::TlsConnector::new().map_err(|err| tls_failure(err.to_string()))?;
        let stream = connector
            .connect(domain, tcp)
            .map_err(|err| tls_failure(err.to_string()))?;
        Ok(Stream::NativeTls(stream))
    }

    #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
    fn wrap_tls(_domain: &str, _tcp: TcpStream) -> Result<Self> {
        Err(tls_failure(
            "wss requires the tls-rustls or tls-native feature".to_string(),
        ))
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(s) => s,
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(s) => &s.sock,
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(s) => s.get_ref(),
        }
    }
}

fn tls_failure(message: String) -> Error {
    Error::connection(
        ConnectionErrorKind::Connect,
        format!("TLS setup failed: {}", message),
    )
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(s) => s.read(buf),
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(s) => s.write(buf),
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(s) => s.flush(),
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(s) => s.flush(),
        }
    }
}

impl Transport for Stream {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let tcp = self.tcp();
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => Transport::shutdown(s),
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(s) => {
                s.conn.send_close_notify();
                let _ = s.flush();
                Transport::shutdown(&mut s.sock)
            }
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(s) => {
                let _ = s.shutdown();
                Transport::shutdown(s.get_mut())
            }
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Stream::Plain(_) => "Plain",
            #[cfg(feature = "tls-rustls")]
            Stream::Rustls(_) => "Rustls",
            #[cfg(feature = "tls-native")]
            Stream::NativeTls(_) => "NativeTls",
        };
        f.debug_struct("Stream")
            .field("kind", &kind)
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}
