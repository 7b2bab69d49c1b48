//! Platform ports: what the controller needs from the board beyond pins and
//! timers.
//!
//! Adapters implement these traits; the main loop and the command handlers
//! only ever see the traits.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::envelope::BootInfo;
use crate::error::{Error, Result};

/// Delay between a reboot request and the reset, so the reply can go out.
pub const REBOOT_DELAY: Duration = Duration::from_secs(1);

// ───────────────────────────────────────────────────────────────
// System port
// ───────────────────────────────────────────────────────────────

/// Board identity and reset.
pub trait SystemControl {
    /// Platform and network details for the boot notification.
    fn boot_info(&self) -> BootInfo;

    /// Hard reset. On hardware this does not return.
    fn reset(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Artifact port
// ───────────────────────────────────────────────────────────────

/// Fetches a firmware release and stages it for the next boot.
pub trait ArtifactFetcher {
    /// Stage `version`, returning how many files were staged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Update`] if the release cannot be fetched or staged.
    fn stage(&mut self, version: &str) -> Result<usize>;
}

/// Pending reset requested by a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebootSchedule {
    deadline: Option<Instant>,
}

impl RebootSchedule {
    /// Arm the reset `delay` from now. A later request moves the deadline.
    pub fn schedule(&mut self, delay: Duration) {
        let deadline = Instant::now() + delay;
        info!(delay_ms = delay.as_millis() as u64, "reboot scheduled");
        self.deadline = Some(deadline);
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

// ───────────────────────────────────────────────────────────────
// Host adapters
// ───────────────────────────────────────────────────────────────

/// [`SystemControl`] for a workstation build.
#[derive(Debug, Clone, Default)]
pub struct HostSystem {
    resets: u32,
}

impl HostSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `reset` was called.
    #[must_use]
    pub fn resets(&self) -> u32 {
        self.resets
    }
}

impl SystemControl for HostSystem {
    fn boot_info(&self) -> BootInfo {
        BootInfo {
            sysname: std::env::consts::OS.to_string(),
            nodename: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            release: env!("CARGO_PKG_VERSION").to_string(),
            version: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string(),
            machine: std::env::consts::ARCH.to_string(),
            ..BootInfo::default()
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
        warn!("reset requested");
    }
}

/// [`ArtifactFetcher`] that declines every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefusingFetcher;

impl ArtifactFetcher for RefusingFetcher {
    fn stage(&mut self, version: &str) -> Result<usize> {
        Err(Error::Update(format!(
            "updates are not supported on this platform (requested {version})"
        )))
    }
}
