//! Configuration and limits for the WebSocket session.

use std::time::Duration;

/// Resource limits for a WebSocket session.
///
/// These keep memory use bounded on a device with a few hundred kilobytes
/// of heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// A larger frame closes the session with code 1009.
    ///
    /// Default: 64 KB (64 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of the handshake response in bytes.
    ///
    /// Default: 4 KB (4096)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_handshake_size: 4096,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_frame_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_frame_size,
            max_handshake_size,
        }
    }

    /// Validate that an announced payload size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), crate::Error> {
        if size > self.max_frame_size as u64 {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
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

/// WebSocket session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Initial capacity of the reassembly buffer (in bytes).
    ///
    /// Default: 2 KB (2048)
    pub read_buffer_size: usize,

    /// How long a single nonblocking receive may wait for bytes.
    ///
    /// Default: 1 ms
    pub poll_interval: Duration,

    /// Check the server's `Sec-WebSocket-Accept` value.
    ///
    /// Default: false
    pub verify_accept: bool,

    /// Pause between failed connection attempts.
    ///
    /// Zero means retry immediately.
    /// Default: zero
    pub reconnect_delay: Duration,

    /// Upper bound on one connect plus handshake attempt.
    ///
    /// A stalled attempt counts as a failure and is retried.
    /// Default: 10 s
    pub handshake_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 2048,
            poll_interval: Duration::from_millis(1),
            verify_accept: false,
            reconnect_delay: Duration::ZERO,
            handshake_timeout: Duration::from_secs(10),
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
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the nonblocking receive window.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable `Sec-WebSocket-Accept` verification.
    #[must_use]
    pub const fn with_verify_accept(mut self, verify: bool) -> Self {
        self.verify_accept = verify;
        self
    }

    /// Set the pause between failed connection attempts.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the bound on one connect plus handshake attempt.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
