//! Which end of the connection we are.

/// WebSocket connection role.
///
/// The role picks the masking default when [`Config::mask_frames`] is unset,
/// and which side's frames the server may require to be masked.
///
/// [`Config::mask_frames`]: crate::Config::mask_frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Opened the connection with `connect`; masks by default.
    Client,
    /// Accepted the connection; sends unmasked frames by default.
    Server,
}

impl Role {
    /// Whether frames sent in this role are masked by default.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether the peer's frames are expected to arrive masked.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
        })
    }
}
