//! Checks applied to every incoming frame before it is acted on.
//!
//! - RSV bits must be clear (no extensions are negotiated)
//! - Control frames must be final and carry at most 125 bytes
//! - Payload size limits
//! - Optionally, masking of client frames (RFC 6455 Section 5.1)

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Frame validator for incoming WebSocket frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    require_masked: bool,
}

impl FrameValidator {
    /// Create a validator for a connection playing `role`.
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            require_masked: false,
        }
    }

    /// Reject unmasked frames when acting as a server.
    #[must_use]
    pub fn with_require_masked(mut self, require: bool) -> Self {
        self.require_masked = require;
        self
    }

    /// Validate an incoming frame.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` - RSV bits set without negotiated extension
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge`
    /// - `Error::FrameTooLarge` - payload exceeds the frame limit
    /// - `Error::UnmaskedClientFrame` - server requires masking and the frame
    ///   arrived unmasked
    pub fn validate(&self, frame: &Frame) -> Result<()> {
        frame.validate()?;
        self.limits.check_frame_size(frame.payload().len())?;
        self.validate_masking(frame.is_masked())
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        if self.require_masked && self.role.expects_masked() && !masked {
            return Err(Error::UnmaskedClientFrame);
        }
        Ok(())
    }
}
