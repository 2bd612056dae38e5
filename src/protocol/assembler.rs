//! Reassembly of fragmented incoming messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Only data frames are accepted; control frames are handled by the
/// connection before they reach the assembler.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some` with the complete message once a frame with `fin` set
    /// arrives, `None` while more fragments are expected.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, a new `Text`/`Binary` frame while one is in progress, or a
    ///   control frame
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` when limits
    ///   are exceeded
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        match (frame.opcode, self.opcode) {
            (opcode, _) if opcode.is_control() => {
                return Err(Error::ProtocolViolation(format!(
                    "Control frame ({}) passed to message assembler",
                    opcode
                )));
            }
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (opcode, None) => self.opcode = Some(opcode),
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
        self.fragment_count = 0;
        Ok(Some(AssembledMessage { opcode, payload }))
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Number of fragments buffered for the message in progress.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}

/// A fully assembled WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Opcode of the first frame: `Text` or `Binary`.
    pub opcode: OpCode,
    /// Concatenated payload of every fragment.
    pub payload: Vec<u8>,
}

impl AssembledMessage {
    /// Decode the payload as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the payload is not valid UTF-8.
    pub fn into_text(self) -> Result<String> {
        String::from_utf8(self.payload).map_err(|_| Error::InvalidUtf8)
    }

    /// Take the raw payload.
    #[must_use]
    pub fn into_binary(self) -> Vec<u8> {
        self.payload
    }

    /// Convert into the caller-facing message type.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` for a text message that is not valid UTF-8.
    pub fn into_message(self) -> Result<Message> {
        match self.opcode {
            OpCode::Text => self.into_text().map(Message::Text),
            _ => Ok(Message::Binary(self.payload)),
        }
    }
}
