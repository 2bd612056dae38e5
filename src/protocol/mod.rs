//! WebSocket protocol core implementation (RFC 6455).
//!
//! Everything here is transport-agnostic: frames are decoded from buffers or
//! any `Read`, handshakes from any `BufRead`.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod headers;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD, encode_frame};
pub use handshake::{
    ClientHandshake, HandshakeRequest, HandshakeResponse, WS_GUID, WsUri, compute_accept_key,
};
pub use headers::HeaderMap;
pub use mask::{apply_mask, apply_mask_fast, generate_mask};
pub use opcode::OpCode;
pub use validation::FrameValidator;
