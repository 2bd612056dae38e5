//! Configuration and limits for WebSocket connections.

use std::time::Duration;

use crate::connection::Role;
use crate::protocol::HeaderMap;

/// Default size of outgoing fragments in bytes.
pub const DEFAULT_FRAGMENT_SIZE: usize = 4096;

/// Default timeout for connect, reads and writes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default `User-Agent` sent by the client handshake.
pub const DEFAULT_USER_AGENT: &str = "syncws-client";

/// Configuration limits for WebSocket connections.
///
/// These limits prevent resource exhaustion attacks and ensure
/// bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Checked against the declared length before the payload is read.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 1024
    pub max_fragment_count: usize,

    /// Maximum size of handshake data in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size: size as u64,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Fragment size for outgoing messages (in bytes).
    ///
    /// Messages larger than this will be split into multiple frames.
    /// Always at least 1.
    ///
    /// Default: 4 KB (4096)
    pub fragment_size: usize,

    /// Timeout applied to connect and to every read and write.
    ///
    /// `None` blocks indefinitely.
    /// Default: 5 seconds
    pub timeout: Option<Duration>,

    /// Extra headers merged into the client handshake request.
    ///
    /// A header with the same name as a default replaces it, except
    /// `Host`, `Sec-WebSocket-Key` and `Sec-WebSocket-Version`.
    pub headers: HeaderMap,

    /// Mask outgoing frames.
    ///
    /// `None` follows the role: clients mask, servers do not.
    /// Default: None
    pub mask_frames: Option<bool>,

    /// `User-Agent` sent by the client handshake.
    ///
    /// Default: `syncws-client`
    pub user_agent: String,

    /// Reject unmasked frames from clients (server only).
    ///
    /// RFC 6455 requires clients to mask all frames.
    ///
    /// Default: false
    pub require_masked_frames: bool,

    /// Apply strict RFC 6455 checks to incoming upgrade requests
    /// (version 13, 16-byte key, `Host`, `Upgrade` and `Connection`).
    ///
    /// Default: false
    pub strict_handshake: bool,

    /// Allowed origins for CSWSH protection.
    ///
    /// If `Some`, only connections from these origins are allowed.
    /// If `None`, origin validation is disabled.
    /// Default: None
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            timeout: Some(DEFAULT_TIMEOUT),
            headers: HeaderMap::new(),
            mask_frames: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            require_masked_frames: false,
            strict_handshake: false,
            allowed_origins: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set fragment size for outgoing messages. Zero is raised to 1.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size.max(1);
        self
    }

    /// Set the connect/read/write timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add one header to the client handshake.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the extra client handshake headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Override the role's default masking.
    #[must_use]
    pub fn with_masking(mut self, mask: bool) -> Self {
        self.mask_frames = Some(mask);
        self
    }

    /// Set the client `User-Agent`.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Require clients to mask their frames.
    #[must_use]
    pub fn with_require_masked_frames(mut self, require: bool) -> Self {
        self.require_masked_frames = require;
        self
    }

    /// Enable strict validation of incoming upgrade requests.
    #[must_use]
    pub fn with_strict_handshake(mut self, strict: bool) -> Self {
        self.strict_handshake = strict;
        self
    }

    /// Set allowed origins for CSWSH protection.
    ///
    /// Only connections with an Origin header matching one of these values
    /// will be accepted. An empty vector accepts any origin.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    /// Whether frames sent in `role` are masked unless a call overrides it.
    #[must_use]
    pub fn masks_for(&self, role: Role) -> bool {
        self.mask_frames.unwrap_or_else(|| role.must_mask())
    }

    /// Configure for a strict RFC 6455 server: no masking, masked client
    /// frames required, strict handshake validation.
    #[must_use]
    pub fn server() -> Self {
        Self {
            mask_frames: Some(false),
            require_masked_frames: true,
            strict_handshake: true,
            ..Default::default()
        }
    }

    /// Configure for client role (mask all frames).
    #[must_use]
    pub fn client() -> Self {
        Self {
            mask_frames: Some(true),
            ..Default::default()
        }
    }
}
