//! Client entry point.

use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::WsUri;
use crate::transport::Stream;

/// Connect to a `ws://` or `wss://` URI and perform the opening handshake.
///
/// The URI is validated before any network activity. `config.timeout`
/// bounds the TCP connect and every subsequent read and write.
///
/// # Errors
///
/// - `Error::BadUri` if the URI cannot be parsed or the scheme is not
///   `ws`/`wss`
/// - `Error::Connection` if the transport cannot be opened or the server
///   refuses the upgrade
///
/// # Example
///
/// ```rust,no_run
/// use syncws::{Config, Message};
///
/// # fn main() -> syncws::Result<()> {
/// let mut conn = syncws::connect("ws://localhost:8000/my/path", Config::client())?;
/// conn.send(Message::text("Hello WebSockets"))?;
/// let reply = conn.receive()?;
/// conn.close(1000, "")?;
/// # Ok(())
/// # }
/// ```
pub fn connect(uri: &str, config: Config) -> Result<Connection<Stream>> {
    let uri = WsUri::parse(uri)?;
    connect_uri(&uri, config)
}

/// Like [`connect`], for an already parsed URI.
///
/// # Errors
///
/// As per [`connect`].
pub fn connect_uri(uri: &WsUri, config: Config) -> Result<Connection<Stream>> {
    tracing::debug!(uri = %uri, "connecting");
    let stream = Stream::connect(uri, config.timeout)?;
    Connection::client(stream, uri, config)
}
