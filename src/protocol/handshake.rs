//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The client side builds the upgrade request from a [`WsUri`] and checks
//! the server's answer; the server side reads the request off the stream
//! and produces the `101 Switching Protocols` response.

use std::io::{BufRead, Read};
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::Url;

use crate::config::Config;
use crate::error::{ConnectionErrorKind, Error, Result};
use crate::protocol::HeaderMap;
use crate::protocol::mask::generate_nonce;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Client headers that are always generated and never taken from the caller.
const GENERATED_HEADERS: &[&str] = &["host", "sec-websocket-key", "sec-websocket-version"];

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use syncws::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A fresh `Sec-WebSocket-Key`: base64 of 16 random bytes.
#[must_use]
pub fn generate_key() -> String {
    BASE64.encode(generate_nonce())
}

/// `Authorization` value for HTTP basic auth.
#[must_use]
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
}

/// Validate the Origin header against a list of allowed origins.
///
/// If `allowed` is empty, any origin (or no origin) is accepted.
///
/// # Errors
///
/// Returns a handshake error if `allowed` is not empty and `origin` is
/// missing or matches none of its entries.
pub fn validate_origin(origin: Option<&str>, allowed: &[String]) -> Result<()> {
    if allowed.is_empty() {
        return Ok(());
    }

    match origin {
        Some(o) if allowed.iter().any(|a| a == o) => Ok(()),
        Some(o) => Err(Error::handshake(format!("Origin not allowed: {}", o))),
        None => Err(Error::handshake("Origin not allowed: (none)")),
    }
}

/// Read an HTTP head (start line plus headers) up to the blank line.
///
/// Returns the lines without their terminators; the blank line is consumed
/// but not returned.
fn read_head<R: BufRead>(reader: &mut R, max_size: usize) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut total = 0usize;

    loop {
        let mut raw = Vec::new();
        let budget = max_size.saturating_sub(total) as u64;
        let n = reader
            .by_ref()
            .take(budget.saturating_add(1))
            .read_until(b'\n', &mut raw)
            .map_err(Error::read_failure)?;
        total += n;

        if total > max_size {
            return Err(Error::HandshakeTooLarge {
                size: total,
                max: max_size,
            });
        }
        if raw.last() != Some(&b'\n') {
            return Err(Error::connection(
                ConnectionErrorKind::UnexpectedEof,
                "Stream ended during handshake",
            ));
        }

        let line = String::from_utf8(raw)
            .map_err(|_| Error::handshake("Handshake is not valid UTF-8"))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(lines);
        }
        lines.push(line.to_string());
    }
}

/// A parsed `ws://` or `wss://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUri {
    secure: bool,
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl WsUri {
    /// Parse a WebSocket URI.
    ///
    /// The port defaults to 80 for `ws` and 443 for `wss`; the path defaults
    /// to `/`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadUri` if the input is not a URI, has a scheme other
    /// than `ws`/`wss`, or has no host.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            _ => return Err(Error::BadUri("Url should have scheme ws or wss".into())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::BadUri(format!("Url has no host: {}", input)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });
        let path = match url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            secure,
            host,
            port,
            path,
            query: url.query().map(str::to_string),
            username: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            password: url.password().map(str::to_string),
        })
    }

    /// `true` for `wss`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host as written in the URI (IPv6 addresses keep their brackets).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host suitable for name resolution and TLS server names.
    #[must_use]
    pub fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Explicit or default port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path component, at least `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// User name from the userinfo component.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Password from the userinfo component.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Request target: path plus `?query` when present.
    #[must_use]
    pub fn resource(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Value of the `Host` header: `host:port`.
    #[must_use]
    pub fn host_header(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for WsUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for WsUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.resource())
    }
}

/// The client half of the opening handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
    resource: String,
    headers: HeaderMap,
}

impl ClientHandshake {
    /// Build the upgrade request for `uri`.
    ///
    /// Headers are, in order: `host`, `user-agent`, `connection`, `upgrade`,
    /// `sec-websocket-key`, `sec-websocket-version`, `authorization` when the
    /// URI carries userinfo, then `config.headers`. Caller headers replace
    /// defaults of the same name except `host`, `sec-websocket-key` and
    /// `sec-websocket-version`. Names are sent lower-cased.
    #[must_use]
    pub fn new(uri: &WsUri, config: &Config) -> Self {
        let key = generate_key();

        let mut headers = HeaderMap::new();
        headers.insert("host", uri.host_header());
        headers.insert("user-agent", config.user_agent.clone());
        headers.insert("connection", "Upgrade");
        headers.insert("upgrade", "websocket");
        headers.insert("sec-websocket-key", key.clone());
        headers.insert("sec-websocket-version", WS_VERSION);
        if let Some(user) = uri.username() {
            headers.insert("authorization", basic_auth(user, uri.password().unwrap_or("")));
        }

        for (name, value) in config.headers.iter() {
            let name = name.to_ascii_lowercase();
            if !GENERATED_HEADERS.contains(&name.as_str()) {
                headers.insert(name, value);
            }
        }

        Self {
            key,
            resource: uri.resource(),
            headers,
        }
    }

    /// The `Sec-WebSocket-Key` sent with this request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Request headers in the order they are sent.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Serialize the full request.
    ///
    /// # Errors
    ///
    /// Returns a handshake error if a header contains CR or LF.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = format!("GET {} HTTP/1.1\r\n", self.resource).into_bytes();
        self.headers.write_to(&mut buf)?;
        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }

    /// Read the server's response and check it accepts this request.
    ///
    /// # Errors
    ///
    /// See [`HandshakeResponse::read_from`] and [`ClientHandshake::verify`].
    pub fn read_response<R: BufRead>(
        &self,
        reader: &mut R,
        max_size: usize,
    ) -> Result<HandshakeResponse> {
        let response = HandshakeResponse::read_from(reader, max_size)?;
        self.verify(&response)?;
        Ok(response)
    }

    /// Check a response: status 101, `Upgrade: websocket`,
    /// `Connection: Upgrade` and the expected `Sec-WebSocket-Accept`.
    ///
    /// # Errors
    ///
    /// Returns a handshake error describing the first mismatch.
    pub fn verify(&self, response: &HandshakeResponse) -> Result<()> {
        if response.status() != 101 {
            return Err(Error::handshake(format!(
                "Server responded with: {}",
                response.status_line()
            )));
        }

        let upgrade = response.header("upgrade").unwrap_or_default();
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::handshake(format!(
                "Invalid Upgrade header: {}",
                upgrade
            )));
        }

        let connection = response.header("connection").unwrap_or_default();
        if !has_token(connection, "upgrade") {
            return Err(Error::handshake(format!(
                "Invalid Connection header: {}",
                connection
            )));
        }

        let expected = compute_accept_key(&self.key);
        match response.accept() {
            Some(accept) if accept == expected => Ok(()),
            Some(accept) => Err(Error::handshake(format!(
                "Server sent bad upgrade response: accept {} does not match",
                accept
            ))),
            None => Err(Error::handshake("Missing Sec-WebSocket-Accept header")),
        }
    }
}

/// Whether a comma-separated header value contains `token` (ASCII case-insensitive).
fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Parsed WebSocket handshake request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request method, always `GET` once parsed.
    pub method: String,
    /// Path of the request target (e.g. "/chat").
    pub path: String,
    /// Query of the request target, without `?`.
    pub query: Option<String>,
    lines: Vec<String>,
    headers: HeaderMap,
    key: String,
}

impl HandshakeRequest {
    /// Read a handshake request from a stream.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if more than `max_size` bytes arrive
    ///   before the blank line
    /// - `Error::Connection` with kind `UnexpectedEof` or `ReadTimeout`
    /// - handshake errors as per [`HandshakeRequest::from_lines`]
    pub fn read_from<R: BufRead>(reader: &mut R, max_size: usize) -> Result<Self> {
        Self::from_lines(read_head(reader, max_size)?)
    }

    /// Parse a complete request held in memory.
    ///
    /// # Errors
    ///
    /// As per [`HandshakeRequest::read_from`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = data;
        Self::read_from(&mut reader, data.len())
    }

    /// Build a request from its lines (request line first, no blank line).
    ///
    /// # Errors
    ///
    /// - `"No GET in request"` if the first line is not `GET <target> HTTP/...`
    /// - `"Client had no Key in upgrade request"` if `Sec-WebSocket-Key` is
    ///   missing or empty
    /// - a duplicated handshake-critical header
    pub fn from_lines(mut lines: Vec<String>) -> Result<Self> {
        let (method, target) = lines
            .first()
            .and_then(|line| parse_request_line(line))
            .ok_or_else(|| Error::handshake("No GET in request"))?;

        let headers = HeaderMap::parse_lines(lines[1..].iter().map(String::as_str))?;
        let key = headers
            .get("sec-websocket-key")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::handshake("Client had no Key in upgrade request"))?
            .to_string();

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };

        // The request keeps the two empty strings that terminated the head.
        lines.push(String::new());
        lines.push(String::new());

        Ok(Self {
            method,
            path,
            query,
            lines,
            headers,
            key,
        })
    }

    /// Raw request lines: request line, header lines, then two empty strings.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Look up a request header, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The client's `Sec-WebSocket-Key`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `Host` header, if any.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// The `Origin` header, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// Validate the handshake request according to RFC 6455.
    ///
    /// # Errors
    ///
    /// Returns a handshake error if:
    /// - The `Sec-WebSocket-Version` is not 13.
    /// - The `Sec-WebSocket-Key` is not Base64 of exactly 16 bytes.
    /// - The `Host` header is missing or empty.
    /// - `Upgrade` is not `websocket` or `Connection` lacks `upgrade`.
    pub fn validate(&self) -> Result<()> {
        match self.header("sec-websocket-version") {
            Some(WS_VERSION) => {}
            Some(other) => {
                return Err(Error::handshake(format!(
                    "Unsupported WebSocket version: {} (expected 13)",
                    other
                )));
            }
            None => return Err(Error::handshake("Missing Sec-WebSocket-Version header")),
        }

        match BASE64.decode(&self.key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::handshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::handshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64",
                ));
            }
        }

        if self.host().is_none_or(str::is_empty) {
            return Err(Error::handshake("Missing Host header"));
        }

        let upgrade = self.header("upgrade").unwrap_or_default();
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::handshake(format!(
                "Invalid Upgrade header: {}",
                upgrade
            )));
        }

        let connection = self.header("connection").unwrap_or_default();
        if !has_token(connection, "upgrade") {
            return Err(Error::handshake(format!(
                "Invalid Connection header: {}",
                connection
            )));
        }

        Ok(())
    }
}

/// Split `GET <target> HTTP/x.y` into method and target.
fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if method != "GET" || !version.starts_with("HTTP/") || parts.next().is_some() {
        return None;
    }
    Some((method.to_string(), target.to_string()))
}

/// An HTTP response to an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    status: u16,
    status_line: String,
    headers: HeaderMap,
}

impl HandshakeResponse {
    /// The `101 Switching Protocols` answer to `req`.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Upgrade", "websocket");
        headers.insert("Connection", "Upgrade");
        headers.insert("Sec-WebSocket-Accept", compute_accept_key(req.key()));
        Self {
            status: 101,
            status_line: "HTTP/1.1 101 Switching Protocols".to_string(),
            headers,
        }
    }

    /// A refusal, e.g. `reject(400, "Bad Request")`.
    #[must_use]
    pub fn reject(status: u16, reason: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", "close");
        headers.insert("Content-Length", "0");
        Self {
            status,
            status_line: format!("HTTP/1.1 {} {}", status, reason),
            headers,
        }
    }

    /// Read a response from a stream.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if more than `max_size` bytes arrive
    ///   before the blank line
    /// - `Error::Connection` with kind `UnexpectedEof` or `ReadTimeout`
    /// - a handshake error if the status line is malformed
    pub fn read_from<R: BufRead>(reader: &mut R, max_size: usize) -> Result<Self> {
        Self::from_lines(read_head(reader, max_size)?)
    }

    /// Parse a complete response held in memory.
    ///
    /// # Errors
    ///
    /// As per [`HandshakeResponse::read_from`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = data;
        Self::read_from(&mut reader, data.len())
    }

    fn from_lines(lines: Vec<String>) -> Result<Self> {
        let status_line = lines
            .first()
            .ok_or_else(|| Error::handshake("Empty response"))?
            .clone();

        let mut parts = status_line.split_whitespace();
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/") => code.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::handshake(format!("Invalid status line: {}", status_line)))?;

        let headers = HeaderMap::parse_lines(lines[1..].iter().map(String::as_str))?;
        Ok(Self {
            status,
            status_line,
            headers,
        })
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The full status line, e.g. `HTTP/1.1 101 Switching Protocols`.
    #[must_use]
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Look up a response header, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The `Sec-WebSocket-Accept` value, if present.
    #[must_use]
    pub fn accept(&self) -> Option<&str> {
        self.header("sec-websocket-accept")
    }

    /// Write the HTTP response to a buffer.
    ///
    /// # Errors
    ///
    /// Returns a handshake error if a header contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self.status_line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.headers.write_to(buf)?;
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn request_bytes(extra: &str) -> Vec<u8> {
        format!(
            "GET /chat?room=1 HTTP/1.1\r\n\
             Host: server.example.com\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             {}\r\n",
            RFC_KEY, extra
        )
        .into_bytes()
    }

    fn handshake_message(err: Error) -> String {
        match err {
            Error::Connection {
                kind: ConnectionErrorKind::Handshake,
                message,
            } => message,
            other => panic!("expected handshake error, got {:?}", other),
        }
    }

    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(compute_accept_key(RFC_KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_generate_key_is_16_bytes() {
        let key = generate_key();
        assert_eq!(BASE64.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_basic_auth() {
        assert_eq!(basic_auth("JohnDoe", "eoDnhoJ"), "Basic Sm9obkRvZTplb0RuaG9K");
    }

    #[test]
    fn test_uri_defaults() {
        let uri = WsUri::parse("ws://localhost").unwrap();
        assert!(!uri.is_secure());
        assert_eq!(uri.port(), 80);
        assert_eq!(uri.resource(), "/");
        assert_eq!(uri.host_header(), "localhost:80");

        let uri = WsUri::parse("wss://example.com/feed?x=1").unwrap();
        assert!(uri.is_secure());
        assert_eq!(uri.port(), 443);
        assert_eq!(uri.resource(), "/feed?x=1");
    }

    #[test]
    fn test_uri_userinfo_and_port() {
        let uri: WsUri = "ws://JohnDoe:eoDnhoJ@localhost:8000/my/mock/path".parse().unwrap();
        assert_eq!(uri.username(), Some("JohnDoe"));
        assert_eq!(uri.password(), Some("eoDnhoJ"));
        assert_eq!(uri.port(), 8000);
        assert_eq!(uri.path(), "/my/mock/path");
        assert_eq!(uri.to_string(), "ws://localhost:8000/my/mock/path");
    }

    #[test]
    fn test_uri_ipv6_connect_host() {
        let uri = WsUri::parse("ws://[::1]:9001/").unwrap();
        assert_eq!(uri.host(), "[::1]");
        assert_eq!(uri.connect_host(), "::1");
    }

    #[test]
    fn test_uri_bad_scheme() {
        let err = WsUri::parse("http://localhost:8000/my/mock/path").unwrap_err();
        assert_eq!(err, Error::BadUri("Url should have scheme ws or wss".into()));
        assert!(matches!(WsUri::parse("not a uri"), Err(Error::BadUri(_))));
    }

    #[test]
    fn test_client_request_layout() {
        let uri = WsUri::parse("ws://localhost:8000/my/mock/path?a=b").unwrap();
        let handshake = ClientHandshake::new(&uri, &Config::default());
        let request = String::from_utf8(handshake.to_bytes().unwrap()).unwrap();

        let expected = format!(
            "GET /my/mock/path?a=b HTTP/1.1\r\n\
             host: localhost:8000\r\n\
             user-agent: syncws-client\r\n\
             connection: Upgrade\r\n\
             upgrade: websocket\r\n\
             sec-websocket-key: {}\r\n\
             sec-websocket-version: 13\r\n\
             \r\n",
            handshake.key()
        );
        assert_eq!(request, expected);
    }

    #[test]
    fn test_client_request_basic_auth() {
        let uri = WsUri::parse("ws://JohnDoe:eoDnhoJ@localhost:8000/").unwrap();
        let handshake = ClientHandshake::new(&uri, &Config::default());
        assert_eq!(
            handshake.headers().get("authorization"),
            Some("Basic Sm9obkRvZTplb0RuaG9K")
        );
    }

    #[test]
    fn test_client_header_merge() {
        let uri = WsUri::parse("ws://localhost:8000/").unwrap();
        let config = Config::default()
            .with_header("User-Agent", "Deprecated client 1.0")
            .with_header("Host", "evil.example")
            .with_header("Sec-WebSocket-Version", "8")
            .with_header("Origin", "localhost");
        let handshake = ClientHandshake::new(&uri, &config);
        let headers = handshake.headers();

        assert_eq!(headers.get("user-agent"), Some("Deprecated client 1.0"));
        assert_eq!(headers.get("host"), Some("localhost:8000"));
        assert_eq!(headers.get("sec-websocket-version"), Some("13"));
        assert_eq!(headers.get("origin"), Some("localhost"));

        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names[1], "user-agent");
        assert_eq!(names.last(), Some(&"origin"));
    }

    #[test]
    fn test_parse_valid_request() {
        let req = HandshakeRequest::parse(&request_bytes(
            "Origin: http://example.com\r\nSec-WebSocket-Protocol: chat, superchat\r\n",
        ))
        .unwrap();

        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/chat");
        assert_eq!(req.query.as_deref(), Some("room=1"));
        assert_eq!(req.key(), RFC_KEY);
        assert_eq!(req.host(), Some("server.example.com"));
        assert_eq!(req.origin(), Some("http://example.com"));
        assert_eq!(req.header("sec-websocket-protocol"), Some("chat, superchat"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_lines_end_with_two_empty_strings() {
        let req = HandshakeRequest::parse(&request_bytes("")).unwrap();
        let lines = req.lines();
        assert_eq!(lines[0], "GET /chat?room=1 HTTP/1.1");
        assert_eq!(lines.len(), 8);
        assert_eq!(&lines[6..], &[String::new(), String::new()]);
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request = b"GET /chat HTTP/1.1\r\n\
            HOST: server.example.com\r\n\
            UPGRADE: WebSocket\r\n\
            CONNECTION: keep-alive, Upgrade\r\n\
            SEC-WEBSOCKET-KEY: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            SEC-WEBSOCKET-VERSION: 13\r\n\
            \r\n";

        let req = HandshakeRequest::parse(request).unwrap();
        assert_eq!(req.header("host"), Some("server.example.com"));
        assert_eq!(req.header("Sec-WebSocket-Key"), Some(RFC_KEY));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_no_get_in_request() {
        let requests: [&[u8]; 3] = [
            b"POST /chat HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n\r\n",
            b"GET /chat\r\nSec-WebSocket-Key: abc\r\n\r\n",
            b"\r\n",
        ];
        for request in requests {
            let err = HandshakeRequest::parse(request).unwrap_err();
            assert_eq!(handshake_message(err), "No GET in request");
        }
    }

    #[test]
    fn test_request_missing_key() {
        let request = b"GET /chat HTTP/1.1\r\nHost: server.example.com\r\n\r\n";
        let err = HandshakeRequest::parse(request).unwrap_err();
        assert_eq!(handshake_message(err), "Client had no Key in upgrade request");
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let wrong_version = HandshakeRequest::parse(
            b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
        )
        .unwrap();
        assert!(handshake_message(wrong_version.validate().unwrap_err()).contains("version"));

        let short_key = HandshakeRequest::parse(
            b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: c2hvcnQ=\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap();
        assert!(handshake_message(short_key.validate().unwrap_err()).contains("16 bytes"));

        let no_host = HandshakeRequest::parse(
            b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap();
        assert!(handshake_message(no_host.validate().unwrap_err()).contains("Host"));

        let no_upgrade = HandshakeRequest::parse(
            b"GET / HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap();
        assert!(handshake_message(no_upgrade.validate().unwrap_err()).contains("Upgrade"));
    }

    #[test]
    fn test_duplicate_host_header_rejected() {
        let request = b"GET / HTTP/1.1\r\n\
Host: example.com\r\n\
Host: evil.com\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

        let err = HandshakeRequest::parse(request).unwrap_err();
        assert!(handshake_message(err).contains("Duplicate"));
    }

    #[test]
    fn test_handshake_too_large() {
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        data.extend(vec![b'A'; 10000]);
        let mut reader = data.as_slice();
        let result = HandshakeRequest::read_from(&mut reader, 8192);
        assert!(matches!(result, Err(Error::HandshakeTooLarge { max: 8192, .. })));
    }

    #[test]
    fn test_handshake_at_limit() {
        let valid = request_bytes("");
        let mut reader = valid.as_slice();
        assert!(HandshakeRequest::read_from(&mut reader, valid.len()).is_ok());
    }

    #[test]
    fn test_truncated_handshake_is_eof() {
        let mut reader = &b"GET / HTTP/1.1\r\nHost: x\r\n"[..];
        let err = HandshakeRequest::read_from(&mut reader, 8192).unwrap_err();
        assert_eq!(
            err.connection_kind(),
            Some(ConnectionErrorKind::UnexpectedEof)
        );
    }

    #[test]
    fn test_read_leaves_frame_bytes_in_stream() {
        let mut data = request_bytes("");
        data.extend_from_slice(&[0x81, 0x00]);
        let mut reader = data.as_slice();
        HandshakeRequest::read_from(&mut reader, 8192).unwrap();
        assert_eq!(reader, &[0x81, 0x00]);
    }

    #[test]
    fn test_response_from_request() {
        let req = HandshakeRequest::parse(&request_bytes("")).unwrap();
        let resp = HandshakeResponse::from_request(&req);

        let mut buf = Vec::new();
        resp.write(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_parse_response() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n";

        let resp = HandshakeResponse::parse(response).unwrap();
        assert_eq!(resp.status(), 101);
        assert_eq!(resp.accept(), Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[test]
    fn test_reject_response() {
        let mut buf = Vec::new();
        HandshakeResponse::reject(400, "Bad Request").write(&mut buf).unwrap();
        let resp = HandshakeResponse::parse(&buf).unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.status_line(), "HTTP/1.1 400 Bad Request");
    }

    #[test]
    fn test_client_verifies_response() {
        let uri = WsUri::parse("ws://localhost:8000/").unwrap();
        let handshake = ClientHandshake::new(&uri, &Config::default());

        let good = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(handshake.key())
        );
        let mut reader = good.as_bytes();
        assert!(handshake.read_response(&mut reader, 8192).is_ok());

        let wrong_accept = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let mut reader = wrong_accept.as_bytes();
        let err = handshake.read_response(&mut reader, 8192).unwrap_err();
        assert!(handshake_message(err).contains("bad upgrade response"));

        let refused = "HTTP/1.1 403 Forbidden\r\n\r\n";
        let mut reader = refused.as_bytes();
        let err = handshake.read_response(&mut reader, 8192).unwrap_err();
        assert!(handshake_message(err).contains("403"));
    }

    #[test]
    fn test_origin_validation() {
        let allowed = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        assert!(validate_origin(Some("https://example.com"), &allowed).is_ok());
        assert!(validate_origin(Some("https://evil.com"), &allowed).is_err());
        assert!(validate_origin(None, &allowed).is_err());
        assert!(validate_origin(None, &[]).is_ok());
    }
}
