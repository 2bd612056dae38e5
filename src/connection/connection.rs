use std::io::BufReader;
use std::time::Duration;

use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, FrameObserver, Role};
use crate::error::{ConnectionErrorKind, Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::handshake::validate_origin;
use crate::protocol::{
    ClientHandshake, Frame, FrameValidator, HandshakeRequest, HandshakeResponse,
    MAX_CONTROL_FRAME_PAYLOAD, MessageAssembler, OpCode, WsUri, generate_mask,
};
use crate::transport::Transport;

/// Outcome of handling one incoming frame.
enum Incoming {
    Message(Message),
    Closed,
}

/// A WebSocket connection over a blocking transport.
///
/// `Connection` owns the transport and drives the whole protocol on the
/// calling thread: the opening handshake, fragmentation of outgoing
/// messages, reassembly of incoming ones, automatic pongs and the closing
/// handshake. Every call blocks until it completes or the configured timeout
/// elapses.
///
/// ## Example
///
/// ```rust,no_run
/// use syncws::{Config, Connection, Message, WsUri};
/// use syncws::transport::connect_transport;
///
/// # fn main() -> syncws::Result<()> {
/// let uri = WsUri::parse("ws://localhost:8000/chat")?;
/// let config = Config::default();
/// let stream = connect_transport(uri.connect_host(), uri.port(), config.timeout)?;
/// let mut conn = Connection::client(stream, &uri, config)?;
///
/// conn.send(Message::text("Hello"))?;
/// if let Some(msg) = conn.receive()? {
///     println!("Received: {:?}", msg);
/// }
/// conn.close(1000, "done")?;
/// # Ok(())
/// # }
/// ```
pub struct Connection<T: Transport> {
    reader: BufReader<T>,
    role: Role,
    config: Config,
    state: ConnectionState,
    assembler: MessageAssembler,
    validator: FrameValidator,
    fragment_size: usize,
    mask_default: bool,
    timeout: Option<Duration>,
    last_opcode: Option<OpCode>,
    close_status: Option<u16>,
    close_reason: Option<String>,
    peer_close: Option<CloseFrame>,
    close_sent: bool,
    request: Option<HandshakeRequest>,
    response: Option<HandshakeResponse>,
    observer: Option<Box<dyn FrameObserver + Send>>,
}

impl<T: Transport> Connection<T> {
    /// Bind a connection to an established transport, before any handshake.
    ///
    /// The connection starts `Unopened`; call [`Connection::client_handshake`]
    /// or [`Connection::server_handshake`] to open it.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_require_masked(config.require_masked_frames);
        Self {
            reader: BufReader::new(io),
            role,
            assembler: MessageAssembler::new(config.limits.clone()),
            validator,
            fragment_size: config.fragment_size.max(1),
            mask_default: config.masks_for(role),
            timeout: config.timeout,
            config,
            state: ConnectionState::Unopened,
            last_opcode: None,
            close_status: None,
            close_reason: None,
            peer_close: None,
            close_sent: false,
            request: None,
            response: None,
            observer: None,
        }
    }

    /// Wrap a stream whose opening handshake already happened elsewhere.
    ///
    /// The connection starts `Open`. The transport's timeout is left as is.
    pub fn from_upgraded(io: T, role: Role, config: Config) -> Self {
        let mut conn = Self::new(io, role, config);
        conn.state = ConnectionState::Open;
        conn
    }

    /// Perform the client handshake for `uri` over `io`.
    ///
    /// # Errors
    ///
    /// See [`Connection::client_handshake`].
    pub fn client(io: T, uri: &WsUri, config: Config) -> Result<Self> {
        let mut conn = Self::new(io, Role::Client, config);
        conn.client_handshake(uri)?;
        Ok(conn)
    }

    /// Read an upgrade request from `io` and answer it.
    ///
    /// # Errors
    ///
    /// See [`Connection::server_handshake`].
    pub fn accept(io: T, config: Config) -> Result<Self> {
        let mut conn = Self::new(io, Role::Server, config);
        conn.server_handshake()?;
        Ok(conn)
    }

    /// Send the upgrade request for `uri` and validate the response.
    ///
    /// # Errors
    ///
    /// - `Error::Connection` with kind `Handshake` if the server refuses or
    ///   answers with a bad accept value
    /// - `Error::Connection` for transport failures and timeouts
    /// - `Error::ProtocolViolation` if the connection is not `Unopened`
    pub fn client_handshake(&mut self, uri: &WsUri) -> Result<()> {
        self.begin_handshake()?;

        let handshake = ClientHandshake::new(uri, &self.config);
        tracing::debug!(uri = %uri, "sending upgrade request");

        let request = match handshake.to_bytes() {
            Ok(request) => request,
            Err(err) => return Err(self.abort(err)),
        };
        if let Err(err) = self.write_raw(&request) {
            return Err(self.abort(err));
        }

        let max = self.config.limits.max_handshake_size;
        match handshake.read_response(&mut self.reader, max) {
            Ok(response) => {
                self.response = Some(response);
                self.state = ConnectionState::Open;
                tracing::debug!(role = %self.role, "connection open");
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Read the client's upgrade request and send `101 Switching Protocols`.
    ///
    /// With [`Config::strict_handshake`] the request must pass
    /// [`HandshakeRequest::validate`]; with [`Config::allowed_origins`] its
    /// `Origin` must be listed. Refused requests get a best-effort HTTP error
    /// response before the transport is shut down.
    ///
    /// # Errors
    ///
    /// - `Error::Connection` with kind `Handshake`, e.g.
    ///   `"No GET in request"` or `"Client had no Key in upgrade request"`
    /// - `Error::HandshakeTooLarge` if the request exceeds the limit
    /// - `Error::Connection` for transport failures and timeouts
    pub fn server_handshake(&mut self) -> Result<()> {
        self.begin_handshake()?;

        let max = self.config.limits.max_handshake_size;
        let request = match HandshakeRequest::read_from(&mut self.reader, max) {
            Ok(request) => request,
            Err(err) => return Err(self.refuse(err)),
        };
        tracing::debug!(path = %request.path, "upgrade request received");

        if self.config.strict_handshake {
            if let Err(err) = request.validate() {
                return Err(self.refuse(err));
            }
        }
        let origin_check = self
            .config
            .allowed_origins
            .as_ref()
            .map(|allowed| validate_origin(request.origin(), allowed));
        if let Some(Err(err)) = origin_check {
            self.write_rejection(403, "Forbidden");
            return Err(self.abort(err));
        }

        let response = HandshakeResponse::from_request(&request);
        let mut buf = Vec::new();
        if let Err(err) = response.write(&mut buf).and_then(|()| self.write_raw(&buf)) {
            return Err(self.abort(err));
        }

        self.request = Some(request);
        self.response = Some(response);
        self.state = ConnectionState::Open;
        tracing::debug!(role = %self.role, "connection open");
        Ok(())
    }

    fn begin_handshake(&mut self) -> Result<()> {
        if self.state != ConnectionState::Unopened {
            return Err(Error::ProtocolViolation(format!(
                "Handshake attempted in state {}",
                self.state
            )));
        }
        self.state = ConnectionState::Handshaking;
        let timeout = self.timeout;
        if let Err(err) = self.reader.get_mut().set_timeout(timeout) {
            return Err(self.abort(Error::connection(
                ConnectionErrorKind::Io,
                err.to_string(),
            )));
        }
        Ok(())
    }

    /// Abort a server handshake, answering with an HTTP error when the
    /// failure was the client's fault.
    fn refuse(&mut self, err: Error) -> Error {
        match &err {
            Error::HandshakeTooLarge { .. } => {
                self.write_rejection(431, "Request Header Fields Too Large");
            }
            Error::Connection {
                kind: ConnectionErrorKind::Handshake,
                ..
            } => self.write_rejection(400, "Bad Request"),
            _ => {}
        }
        self.abort(err)
    }

    fn write_rejection(&mut self, status: u16, reason: &str) {
        let mut buf = Vec::new();
        if HandshakeResponse::reject(status, reason).write(&mut buf).is_ok() {
            let _ = self.write_raw(&buf);
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is `Open` or `Closing`.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Which end of the connection this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Opcode of the most recently received complete message.
    pub fn last_opcode(&self) -> Option<OpCode> {
        self.last_opcode
    }

    /// Status code of the completed close handshake.
    ///
    /// `None` until the peer's close frame has been received. A close frame
    /// without a payload is reported as 1005 (no status received).
    pub fn close_status(&self) -> Option<u16> {
        self.close_status
    }

    /// Reason text from the peer's close frame.
    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }

    /// Maximum payload bytes per outgoing data frame.
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// Change the outgoing fragment size. Zero is raised to 1.
    pub fn set_fragment_size(&mut self, size: usize) {
        self.fragment_size = size.max(1);
    }

    /// The timeout applied to reads and writes.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Apply a new read/write timeout to the transport.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the transport rejects the timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader
            .get_mut()
            .set_timeout(timeout)
            .map_err(|err| Error::connection(ConnectionErrorKind::Io, err.to_string()))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Whether outgoing frames are masked unless a call says otherwise.
    pub fn masks_by_default(&self) -> bool {
        self.mask_default
    }

    /// The upgrade request (server side).
    pub fn request(&self) -> Option<&HandshakeRequest> {
        self.request.as_ref()
    }

    /// The upgrade response that opened this connection.
    pub fn response(&self) -> Option<&HandshakeResponse> {
        self.response.as_ref()
    }

    /// Request path of the upgrade request (server side).
    pub fn path(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.path.as_str())
    }

    /// Look up a handshake header from the peer, ignoring case: the request
    /// header on a server, the response header on a client.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self.role {
            Role::Server => self.request.as_ref()?.header(name),
            Role::Client => self.response.as_ref()?.header(name),
        }
    }

    /// Install an observer that sees every frame sent and received.
    pub fn set_observer(&mut self, observer: impl FrameObserver + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.reader.get_ref()
    }

    /// Send a message.
    ///
    /// Data messages are split into frames of at most
    /// [`fragment_size`](Connection::fragment_size) bytes. Control messages
    /// are sent as a single frame; sending `Message::Close` moves the
    /// connection to `Closing`.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is `Open`
    /// - `Error::MessageTooLarge` if the message exceeds `limits.max_message_size`
    /// - `Error::ControlFrameTooLarge` for a control payload over 125 bytes
    /// - `Error::Connection` for write failures and timeouts
    pub fn send(&mut self, message: Message) -> Result<()> {
        let (opcode, payload) = message.into_parts();
        self.send_frame_with(&payload, opcode, None)
    }

    /// Send `payload` as a message with an explicit opcode, masking as
    /// requested (`None` uses the connection default).
    ///
    /// # Errors
    ///
    /// As per [`Connection::send`].
    pub fn send_frame_with(
        &mut self,
        payload: &[u8],
        opcode: OpCode,
        masked: Option<bool>,
    ) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(self.close_status));
        }
        if opcode.is_control() && payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(payload.len()));
        }
        self.config.limits.check_message_size(payload.len())?;

        let masked = masked.unwrap_or(self.mask_default);
        for frame in MessageFragmenter::new(payload, opcode, self.fragment_size) {
            if let Err(err) = self.write_frame(&frame, masked) {
                return Err(self.abort(err));
            }
        }
        if let Err(err) = self.flush() {
            return Err(self.abort(err));
        }

        if opcode == OpCode::Close {
            self.close_sent = true;
            self.state = ConnectionState::Closing;
            tracing::debug!(role = %self.role, "close frame sent");
        }
        Ok(())
    }

    /// Send `payload` with an opcode given by name: `"text"`, `"binary"`,
    /// `"close"`, `"ping"`, `"pong"` or `"continuation"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadOpcode` for any other name, before any I/O;
    /// otherwise as per [`Connection::send`].
    pub fn send_named(&mut self, payload: &[u8], opcode: &str, masked: Option<bool>) -> Result<()> {
        let opcode: OpCode = opcode.parse()?;
        self.send_frame_with(payload, opcode, masked)
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// As per [`Connection::send`].
    pub fn ping(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Ping(payload.into()))
    }

    /// Receive the next complete data message.
    ///
    /// Pings are answered with a pong carrying the same payload and pongs are
    /// discarded, both without disturbing a message being reassembled. When
    /// the peer's close frame arrives it is echoed (unless a close was
    /// already sent), [`close_status`](Connection::close_status) is recorded,
    /// the connection becomes `Closed` and `Ok(None)` is returned.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is already closed
    /// - protocol errors (reserved bits, bad opcode sequence, invalid UTF-8,
    ///   limits); a close frame with status 1002 is sent before closing
    /// - `Error::Connection` for read failures, timeouts and EOF
    ///
    /// Any error closes the connection.
    pub fn receive(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Err(Error::ConnectionClosed(self.close_status));
        }

        loop {
            let incoming = self.read_frame().and_then(|frame| self.handle_frame(frame));
            match incoming {
                Ok(Some(Incoming::Message(message))) => return Ok(Some(message)),
                Ok(Some(Incoming::Closed)) => return Ok(None),
                Ok(None) => {}
                Err(err) => return Err(self.abort(err)),
            }
        }
    }

    /// Start (or finish) the closing handshake.
    ///
    /// Sends a close frame with `code` and `reason`, then reads frames until
    /// the peer's close frame arrives; data received in the meantime is
    /// discarded. The connection ends `Closed` with the transport shut down,
    /// also when the peer does not answer before the timeout or hangs up.
    ///
    /// Returns the peer's close frame if one arrived. Calling this on a
    /// closed connection returns the close frame that closed it.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCloseCode` for any code a close frame may not carry
    ///   (only 1000-1003, 1007-1014 and 3000-4999 are sent)
    /// - `Error::ControlFrameTooLarge` if the reason exceeds 123 bytes
    /// - protocol errors raised while waiting for the peer
    pub fn close(&mut self, code: u16, reason: &str) -> Result<Option<CloseFrame>> {
        let code = CloseCode::from_u16(code);
        if !code.is_valid() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        match self.state {
            ConnectionState::Open => {
                let payload = CloseFrame::new(code, reason).to_payload();
                self.send_frame_with(&payload, OpCode::Close, None)?;
            }
            ConnectionState::Closing => {}
            _ => return Ok(self.peer_close.clone()),
        }

        while self.state == ConnectionState::Closing {
            let incoming = self.read_frame().and_then(|frame| self.handle_frame(frame));
            match incoming {
                Ok(_) => {}
                Err(err) if err.connection_kind().is_some() => {
                    tracing::debug!(error = %err, "peer did not complete close handshake");
                    self.shutdown();
                }
                Err(err) => return Err(self.abort(err)),
            }
        }

        Ok(self.peer_close.clone())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let frame = Frame::read_from(&mut self.reader, self.config.limits.max_frame_size)?;
        tracing::trace!(
            role = %self.role,
            opcode = %frame.opcode,
            fin = frame.fin,
            len = frame.payload().len(),
            "frame received"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer.frame_received(&frame);
        }
        self.validator.validate(&frame)?;
        Ok(frame)
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Option<Incoming>> {
        match frame.opcode {
            OpCode::Ping => {
                if self.state == ConnectionState::Open {
                    let pong = Frame::pong(frame.into_payload());
                    self.write_frame(&pong, self.mask_default)?;
                    self.flush()?;
                }
                Ok(None)
            }
            OpCode::Pong => Ok(None),
            OpCode::Close => {
                self.handle_close(frame.payload())?;
                Ok(Some(Incoming::Closed))
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                if self.state == ConnectionState::Closing {
                    tracing::trace!("discarding data frame while closing");
                    return Ok(None);
                }
                match self.assembler.push(frame)? {
                    Some(assembled) => {
                        let opcode = assembled.opcode;
                        let message = assembled.into_message()?;
                        self.last_opcode = Some(opcode);
                        Ok(Some(Incoming::Message(message)))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn handle_close(&mut self, payload: &[u8]) -> Result<()> {
        let close = CloseFrame::parse(payload)?;
        let status = close.as_ref().map_or(1005, |c| c.code.as_u16());
        tracing::debug!(role = %self.role, status, "close frame received");

        if !self.close_sent {
            let echo = match &close {
                Some(c) => Frame::close(Some(c.code.as_u16()), &c.reason),
                None => Frame::close(None, ""),
            };
            // The peer may already be gone; the close still completes.
            if self.write_frame(&echo, self.mask_default).is_ok() {
                let _ = self.flush();
            }
            self.close_sent = true;
        }

        self.close_status = Some(status);
        self.close_reason = close.as_ref().map(|c| c.reason.clone());
        self.peer_close = close;
        self.shutdown();
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame, masked: bool) -> Result<()> {
        let bytes = frame.encode(masked.then(generate_mask));
        self.reader
            .get_mut()
            .write_all(&bytes)
            .map_err(Error::write_failure)?;
        tracing::trace!(
            role = %self.role,
            opcode = %frame.opcode,
            fin = frame.fin,
            masked,
            len = frame.payload().len(),
            "frame sent"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer.frame_sent(frame);
        }
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let io = self.reader.get_mut();
        io.write_all(bytes).map_err(Error::write_failure)?;
        io.flush().map_err(Error::write_failure)
    }

    fn flush(&mut self) -> Result<()> {
        self.reader.get_mut().flush().map_err(Error::write_failure)
    }

    /// Force the connection closed after `err`, sending a best-effort 1002
    /// close frame first if `err` is a protocol violation on an open
    /// connection.
    fn abort(&mut self, err: Error) -> Error {
        if err.is_protocol_error() && self.state == ConnectionState::Open && !self.close_sent {
            let frame = Frame::close(Some(CloseCode::ProtocolError.as_u16()), "");
            if self.write_frame(&frame, self.mask_default).is_ok() {
                let _ = self.flush();
            }
            self.close_sent = true;
        }
        if self.state != ConnectionState::Closed {
            tracing::warn!(role = %self.role, state = %self.state, error = %err, "closing connection");
        }
        self.assembler.reset();
        self.shutdown();
        err
    }

    fn shutdown(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            if let Err(err) = self.reader.get_mut().shutdown() {
                tracing::debug!(error = %err, "transport shutdown failed");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("fragment_size", &self.fragment_size)
            .field("last_opcode", &self.last_opcode)
            .field("close_status", &self.close_status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::protocol::handshake::compute_accept_key;

    /// In-memory transport: reads from a fixed script, records writes.
    struct MockTransport {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
        timeout: Option<Duration>,
        shut_down: bool,
    }

    impl MockTransport {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                written: Vec::new(),
                timeout: None,
                shut_down: false,
            }
        }

        /// Frames written by the connection, decoded and unmasked.
        fn written_frames(&self) -> Vec<Frame> {
            let mut frames = Vec::new();
            let mut rest = self.written.as_slice();
            while !rest.is_empty() {
                let (frame, used) = Frame::parse(rest).unwrap();
                frames.push(frame);
                rest = &rest[used..];
            }
            frames
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for MockTransport {
        fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            self.timeout = timeout;
            Ok(())
        }

        fn shutdown(&mut self) -> io::Result<()> {
            self.shut_down = true;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Counter {
        sent: Arc<AtomicUsize>,
        received: Arc<AtomicUsize>,
    }

    impl FrameObserver for Counter {
        fn frame_sent(&mut self, _frame: &Frame) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }

        fn frame_received(&mut self, _frame: &Frame) {
            self.received.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wire(frames: &[Frame], mask: Option<[u8; 4]>) -> Vec<u8> {
        frames.iter().flat_map(|f| f.encode(mask)).collect()
    }

    fn server(input: Vec<u8>) -> Connection<MockTransport> {
        Connection::from_upgraded(MockTransport::new(input), Role::Server, Config::default())
    }

    fn client(input: Vec<u8>) -> Connection<MockTransport> {
        Connection::from_upgraded(MockTransport::new(input), Role::Client, Config::default())
    }

    #[test]
    fn test_new_connection_is_unopened() {
        let conn = Connection::new(MockTransport::new(vec![]), Role::Client, Config::default());
        assert_eq!(conn.state(), ConnectionState::Unopened);
        assert!(!conn.is_connected());
        assert_eq!(conn.close_status(), None);
        assert_eq!(conn.last_opcode(), None);
        assert_eq!(conn.fragment_size(), 4096);
        assert_eq!(conn.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_send_text_unmasked_from_server() {
        let mut conn = server(vec![]);
        conn.send(Message::text("Hello")).unwrap();

        let written = &conn.get_ref().written;
        assert_eq!(written, &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_client_masks_by_default() {
        let mut conn = client(vec![]);
        assert!(conn.masks_by_default());
        conn.send(Message::binary(vec![1, 2, 3])).unwrap();

        let frames = conn.get_ref().written_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_masked());
        assert_eq!(frames[0].payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_per_call_mask_override() {
        let mut conn = client(vec![]);
        conn.send_named(b"plain", "text", Some(false)).unwrap();
        conn.send_frame_with(b"hidden", OpCode::Text, Some(true)).unwrap();

        let frames = conn.get_ref().written_frames();
        assert!(!frames[0].is_masked());
        assert!(frames[1].is_masked());
    }

    #[test]
    fn test_send_fragments_by_fragment_size() {
        let mut conn = server(vec![]);
        conn.set_fragment_size(4);
        conn.send(Message::text("Hello WebSockets")).unwrap();

        let frames = conn.get_ref().written_frames();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert!(frames[1..].iter().all(|f| f.opcode == OpCode::Continuation));
        assert!(frames[..3].iter().all(|f| !f.fin));
        assert!(frames[3].fin);
    }

    #[test]
    fn test_bad_opcode_performs_no_io() {
        let mut conn = client(vec![]);
        let err = conn.send_named(b"foo", "bad_opcode", None).unwrap_err();
        assert_eq!(err, Error::BadOpcode("bad_opcode".into()));
        assert!(conn.get_ref().written.is_empty());
        assert!(conn.is_connected());
    }

    #[test]
    fn test_receive_masked_text() {
        let data = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut conn = server(data);

        let msg = conn.receive().unwrap().unwrap();
        assert_eq!(msg, Message::Text("Hello".into()));
        assert_eq!(conn.last_opcode(), Some(OpCode::Text));
    }

    #[test]
    fn test_receive_fragmented_with_ping() {
        let data = wire(
            &[
                Frame::new(false, OpCode::Binary, vec![1, 2]),
                Frame::ping(b"are you there".to_vec()),
                Frame::new(false, OpCode::Continuation, vec![3]),
                Frame::pong(b"ignored".to_vec()),
                Frame::new(true, OpCode::Continuation, vec![4]),
            ],
            None,
        );
        let mut conn = client(data);

        let msg = conn.receive().unwrap().unwrap();
        assert_eq!(msg, Message::Binary(vec![1, 2, 3, 4]));
        assert_eq!(conn.last_opcode(), Some(OpCode::Binary));

        let replies = conn.get_ref().written_frames();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].opcode, OpCode::Pong);
        assert_eq!(replies[0].payload(), b"are you there");
    }

    #[test]
    fn test_peer_close_is_echoed() {
        let data = wire(&[Frame::close(Some(1000), "ttfn")], Some([1, 2, 3, 4]));
        let mut conn = server(data);

        assert_eq!(conn.receive().unwrap(), None);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_connected());
        assert_eq!(conn.close_status(), Some(1000));
        assert_eq!(conn.close_reason(), Some("ttfn"));
        assert!(conn.get_ref().shut_down);

        let echo = conn.get_ref().written_frames();
        assert_eq!(echo.len(), 1);
        assert_eq!(echo[0].opcode, OpCode::Close);
        assert_eq!(&echo[0].payload()[..2], &1000u16.to_be_bytes());
    }

    #[test]
    fn test_empty_close_reports_no_status() {
        let mut conn = client(wire(&[Frame::close(None, "")], None));
        assert_eq!(conn.receive().unwrap(), None);
        assert_eq!(conn.close_status(), Some(1005));
        assert!(conn.get_ref().written_frames()[0].payload().is_empty());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let mut conn = client(wire(&[Frame::close(Some(1001), "")], None));
        conn.receive().unwrap();

        assert_eq!(
            conn.send(Message::text("late")),
            Err(Error::ConnectionClosed(Some(1001)))
        );
        assert_eq!(conn.receive(), Err(Error::ConnectionClosed(Some(1001))));
    }

    #[test]
    fn test_local_close_waits_for_peer() {
        let data = wire(
            &[Frame::text("straggler"), Frame::close(Some(1000), "bye")],
            None,
        );
        let mut conn = client(data);

        let peer = conn.close(1000, "done").unwrap();
        assert_eq!(peer, Some(CloseFrame::new(CloseCode::Normal, "bye")));
        assert_eq!(conn.close_status(), Some(1000));
        assert!(!conn.is_connected());

        let sent = conn.get_ref().written_frames();
        assert_eq!(sent.len(), 1, "no echo after our own close");
        assert_eq!(sent[0].payload(), b"\x03\xe8done");
    }

    #[test]
    fn test_local_close_without_answer() {
        let mut conn = client(vec![]);
        assert_eq!(conn.close(1000, "").unwrap(), None);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.close_status(), None);
        assert!(conn.get_ref().shut_down);
    }

    #[test]
    fn test_close_rejects_reserved_code() {
        let mut conn = client(vec![]);
        assert_eq!(conn.close(1006, ""), Err(Error::InvalidCloseCode(1006)));
        assert!(conn.is_connected());
    }

    #[test]
    fn test_close_rejects_out_of_range_code() {
        let mut conn = client(vec![]);
        for code in [0, 999, 1016, 2999, 5000] {
            assert_eq!(conn.close(code, "x"), Err(Error::InvalidCloseCode(code)));
        }
        assert!(conn.is_connected());
        assert!(conn.get_ref().written.is_empty());
    }

    #[test]
    fn test_close_with_application_code_reaches_peer() {
        let data = wire(&[Frame::close(Some(3000), "")], None);
        let mut conn = client(data);
        conn.close(3000, "app").unwrap();
        assert_eq!(conn.close_status(), Some(3000));
        assert_eq!(&conn.get_ref().written_frames()[0].payload()[..2], &3000u16.to_be_bytes());
    }

    #[test]
    fn test_raw_close_moves_to_closing() {
        let mut conn = server(vec![]);
        conn.send_named(&1000u16.to_be_bytes(), "close", None).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.is_connected());
        assert!(matches!(
            conn.send(Message::text("x")),
            Err(Error::ConnectionClosed(None))
        ));
    }

    #[test]
    fn test_protocol_error_closes_with_1002() {
        let mut conn = client(vec![0x80 | 0x03, 0x00]);
        assert!(matches!(conn.receive(), Err(Error::ReservedOpcode(0x03))));
        assert_eq!(conn.state(), ConnectionState::Closed);

        let sent = conn.get_ref().written_frames();
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(sent[0].payload(), &1002u16.to_be_bytes());
    }

    #[test]
    fn test_unexpected_continuation_is_protocol_error() {
        let mut conn = client(wire(&[Frame::new(true, OpCode::Continuation, vec![1])], None));
        assert!(matches!(conn.receive(), Err(Error::ProtocolViolation(_))));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_truncated_frame_is_eof() {
        let mut conn = client(vec![0x81, 0x05, b'H', b'e']);
        let err = conn.receive().unwrap_err();
        assert_eq!(
            err.connection_kind(),
            Some(ConnectionErrorKind::UnexpectedEof)
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.get_ref().written.is_empty());
    }

    #[test]
    fn test_require_masked_frames() {
        let config = Config::default().with_require_masked_frames(true);
        let data = wire(&[Frame::text("bare")], None);
        let mut conn = Connection::from_upgraded(MockTransport::new(data), Role::Server, config);
        assert!(matches!(conn.receive(), Err(Error::UnmaskedClientFrame)));
    }

    #[test]
    fn test_observer_counts_frames() {
        let counter = Counter::default();
        let data = wire(
            &[
                Frame::new(false, OpCode::Text, b"a".to_vec()),
                Frame::new(true, OpCode::Continuation, b"b".to_vec()),
            ],
            None,
        );
        let mut conn = client(data);
        conn.set_observer(counter.clone());
        conn.set_fragment_size(2);

        conn.send(Message::text("hello")).unwrap();
        conn.receive().unwrap();

        assert_eq!(counter.sent.load(Ordering::SeqCst), 3);
        assert_eq!(counter.received.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_server_handshake() {
        let request = b"GET /my/path?x=1 HTTP/1.1\r\n\
            Host: localhost:8000\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: cktLWXhUdDQ2OXF0ZCFqOQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";
        let conn = Connection::accept(MockTransport::new(request.to_vec()), Config::default()).unwrap();

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.path(), Some("/my/path"));
        assert_eq!(conn.header("SEC-WEBSOCKET-KEY"), Some("cktLWXhUdDQ2OXF0ZCFqOQ=="));
        assert_eq!(conn.header("missing"), None);
        assert_eq!(conn.get_ref().timeout, Some(Duration::from_secs(5)));

        let response = String::from_utf8(conn.get_ref().written.clone()).unwrap();
        let expected = format!(
            "Sec-WebSocket-Accept: {}\r\n",
            compute_accept_key("cktLWXhUdDQ2OXF0ZCFqOQ==")
        );
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains(&expected));
    }

    #[test]
    fn test_server_handshake_missing_key() {
        let request = b"GET /my/path HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let err = Connection::accept(MockTransport::new(request.to_vec()), Config::default())
            .unwrap_err();
        assert_eq!(
            err,
            Error::handshake("Client had no Key in upgrade request")
        );
    }

    #[test]
    fn test_server_handshake_refuses_origin() {
        let request = b"GET / HTTP/1.1\r\nHost: x\r\nOrigin: http://evil\r\n\
            Sec-WebSocket-Key: cktLWXhUdDQ2OXF0ZCFqOQ==\r\n\r\n";
        let config = Config::default().with_allowed_origins(vec!["http://good".into()]);
        let mut conn = Connection::new(MockTransport::new(request.to_vec()), Role::Server, config);

        assert!(conn.server_handshake().is_err());
        assert_eq!(conn.state(), ConnectionState::Closed);
        let response = String::from_utf8(conn.get_ref().written.clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn test_client_handshake() {
        // The key is random, so the scripted response cannot carry the right
        // accept value; the handshake must reject it.
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let uri = WsUri::parse("ws://localhost:8000/my/mock/path").unwrap();
        let mut conn = Connection::new(MockTransport::new(response.to_vec()), Role::Client, Config::default());

        let err = conn.client_handshake(&uri).unwrap_err();
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Handshake));
        assert_eq!(conn.state(), ConnectionState::Closed);

        let request = String::from_utf8(conn.get_ref().written.clone()).unwrap();
        assert!(request.starts_with("GET /my/mock/path HTTP/1.1\r\nhost: localhost:8000\r\n"));
    }

    #[test]
    fn test_handshake_twice_is_rejected() {
        let mut conn = server(vec![]);
        assert!(matches!(
            conn.server_handshake(),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_connection_is_send() {
        fn assert_send<S: Send>() {}
        assert_send::<Connection<MockTransport>>();
    }
}
