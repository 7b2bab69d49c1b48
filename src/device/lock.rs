//! Lock actuation: pulse-driven open and close coils.
//!
//! Each move energises exactly one output and arms the pulse timer. When the
//! timer fires both outputs are released, so no coil stays powered past the
//! pulse window.

use std::time::Duration;

use embedded_hal::digital::OutputPin;
use tracing::{debug, info, warn};

use crate::device::hal::{OneShotTimer, pin_error};
use crate::error::Result;

/// Default coil pulse.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(1000);

/// Lock position.
///
/// Legal transitions: `Closed -> Opening -> Open -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

impl LockState {
    /// Wire name used in status events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LockState::Closed => "closed",
            LockState::Opening => "opening",
            LockState::Open => "open",
            LockState::Closing => "closing",
        }
    }

    /// Whether a pulse is in progress.
    #[must_use]
    pub const fn is_moving(self) -> bool {
        matches!(self, LockState::Opening | LockState::Closing)
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock state machine over two actuator outputs and a pulse timer.
pub struct Lock<O, C, T> {
    open_pin: O,
    close_pin: C,
    timer: T,
    pulse: Duration,
    state: LockState,
}

impl<O, C, T> Lock<O, C, T>
where
    O: OutputPin,
    C: OutputPin,
    T: OneShotTimer,
{
    /// Create a closed lock with both outputs released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if an output
    /// cannot be driven low.
    pub fn new(mut open_pin: O, mut close_pin: C, timer: T, pulse: Duration) -> Result<Self> {
        open_pin.set_low().map_err(|e| pin_error("open output", &e))?;
        close_pin
            .set_low()
            .map_err(|e| pin_error("close output", &e))?;
        Ok(Self {
            open_pin,
            close_pin,
            timer,
            pulse,
            state: LockState::Closed,
        })
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.state
    }

    #[must_use]
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Start opening. Only acts when closed; returns the new state if it
    /// moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if the output
    /// cannot be driven; both outputs are then released.
    pub fn open(&mut self) -> Result<Option<LockState>> {
        if self.state != LockState::Closed {
            debug!(state = %self.state, "open ignored");
            return Ok(None);
        }
        if let Err(e) = self.open_pin.set_high() {
            if let Err(release) = self.release() {
                warn!(error = %release, "outputs not released after drive failure");
            }
            return Err(pin_error("open output", &e));
        }
        self.begin(LockState::Opening)
    }

    /// Start closing. Only acts when open; returns the new state if it
    /// moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if the output
    /// cannot be driven; both outputs are then released.
    pub fn close(&mut self) -> Result<Option<LockState>> {
        if self.state != LockState::Open {
            debug!(state = %self.state, "close ignored");
            return Ok(None);
        }
        if let Err(e) = self.close_pin.set_high() {
            if let Err(release) = self.release() {
                warn!(error = %release, "outputs not released after drive failure");
            }
            return Err(pin_error("close output", &e));
        }
        self.begin(LockState::Closing)
    }

    fn begin(&mut self, moving: LockState) -> Result<Option<LockState>> {
        self.state = moving;
        self.timer.arm(self.pulse);
        info!(state = %moving, pulse_ms = self.pulse.as_millis() as u64, "lock pulse started");
        Ok(Some(moving))
    }

    /// End the pulse: release both outputs and commit the terminal state.
    ///
    /// Returns the committed state, or `None` if no pulse was running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if an output
    /// cannot be released. The state is still committed.
    pub fn finalize(&mut self) -> Result<Option<LockState>> {
        self.timer.cancel();
        let released = self.release();
        let committed = match self.state {
            LockState::Opening => LockState::Open,
            LockState::Closing => LockState::Closed,
            _ => return released.map(|()| None),
        };
        self.state = committed;
        info!(state = %committed, "lock pulse finished");
        released.map(|()| Some(committed))
    }

    /// Drive both outputs low, attempting both even if one fails.
    fn release(&mut self) -> Result<()> {
        let open = self.open_pin.set_low();
        let close = self.close_pin.set_low();
        open.map_err(|e| pin_error("open output", &e))?;
        close.map_err(|e| pin_error("close output", &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{ManualTimer, SimPin};

    fn lock() -> (Lock<SimPin, SimPin, ManualTimer>, SimPin, SimPin) {
        let open = SimPin::new(false);
        let close = SimPin::new(false);
        let lock = Lock::new(
            open.clone(),
            close.clone(),
            ManualTimer::new(),
            DEFAULT_PULSE,
        )
        .unwrap();
        (lock, open, close)
    }

    #[test]
    fn test_initial_state_released() {
        let open = SimPin::new(true);
        let close = SimPin::new(true);
        let lock = Lock::new(open.clone(), close.clone(), ManualTimer::new(), DEFAULT_PULSE)
            .unwrap();
        assert_eq!(lock.state(), LockState::Closed);
        assert!(!open.level());
        assert!(!close.level());
    }

    #[test]
    fn test_open_drives_open_output_and_arms_timer() {
        let (mut lock, open, close) = lock();
        assert_eq!(lock.open().unwrap(), Some(LockState::Opening));
        assert!(open.level());
        assert!(!close.level());
        assert!(lock.timer().is_armed());
        assert_eq!(lock.timer().last_duration(), Some(DEFAULT_PULSE));
    }

    #[test]
    fn test_open_is_idempotent_while_opening_or_open() {
        let (mut lock, open, _close) = lock();
        lock.open().unwrap();
        assert_eq!(lock.open().unwrap(), None);
        assert_eq!(lock.timer().arm_count(), 1);

        lock.finalize().unwrap();
        assert_eq!(lock.state(), LockState::Open);
        assert_eq!(lock.open().unwrap(), None);
        assert!(!open.level());
        assert_eq!(lock.timer().arm_count(), 1);
    }

    #[test]
    fn test_close_is_idempotent_while_closed_or_closing() {
        let (mut lock, _open, close) = lock();
        assert_eq!(lock.close().unwrap(), None);
        assert!(!close.level());

        lock.open().unwrap();
        // Moving: a close request does nothing.
        assert_eq!(lock.close().unwrap(), None);
        lock.finalize().unwrap();

        assert_eq!(lock.close().unwrap(), Some(LockState::Closing));
        assert!(close.level());
        assert_eq!(lock.close().unwrap(), None);
    }

    #[test]
    fn test_full_cycle() {
        let (mut lock, open, close) = lock();
        let mut seen = Vec::new();

        seen.extend(lock.open().unwrap());
        seen.extend(lock.finalize().unwrap());
        assert!(!open.level() && !close.level());
        seen.extend(lock.close().unwrap());
        seen.extend(lock.finalize().unwrap());
        assert!(!open.level() && !close.level());

        assert_eq!(
            seen,
            [
                LockState::Opening,
                LockState::Open,
                LockState::Closing,
                LockState::Closed
            ]
        );
    }

    #[test]
    fn test_spurious_finalize_is_noop() {
        let (mut lock, _open, _close) = lock();
        assert_eq!(lock.finalize().unwrap(), None);
        assert_eq!(lock.state(), LockState::Closed);
    }

    #[derive(Debug)]
    struct DriverFault;

    impl embedded_hal::digital::Error for DriverFault {
        fn kind(&self) -> embedded_hal::digital::ErrorKind {
            embedded_hal::digital::ErrorKind::Other
        }
    }

    /// Output whose driver refuses to go high.
    struct StuckLow(SimPin);

    impl embedded_hal::digital::ErrorType for StuckLow {
        type Error = DriverFault;
    }

    impl OutputPin for StuckLow {
        fn set_low(&mut self) -> std::result::Result<(), DriverFault> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> std::result::Result<(), DriverFault> {
            Err(DriverFault)
        }
    }

    #[test]
    fn test_drive_failure_releases_outputs() {
        let open = SimPin::new(false);
        let close = SimPin::new(false);
        let mut lock = Lock::new(
            StuckLow(open.clone()),
            close.clone(),
            ManualTimer::new(),
            DEFAULT_PULSE,
        )
        .unwrap();
        close.set(true);

        let err = lock.open().unwrap_err();
        assert!(matches!(err, crate::Error::Hardware(ref msg) if msg.contains("open output")));
        assert_eq!(lock.state(), LockState::Closed);
        assert!(!lock.timer().is_armed());
        assert!(!open.level() && !close.level());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(LockState::Opening.to_string(), "opening");
        assert_eq!(LockState::Closed.as_str(), "closed");
        assert!(LockState::Closing.is_moving());
        assert!(!LockState::Open.is_moving());
    }
}
