//! Door contact with edge debounce.
//!
//! The edge interrupt does one thing: if no debounce is running, it claims
//! the debounce flag and arms the settle timer. Bounces while the flag is set
//! are absorbed. When the timer fires, the main loop re-reads the contact and
//! reports the settled level.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embedded_hal::digital::InputPin;
use tracing::{debug, info};

use crate::device::hal::{OneShotTimer, pin_error};
use crate::error::Result;

/// Default settle window after the first edge.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Interrupt-side handle. Cheap to clone, safe to call from any context.
pub struct DoorInterrupt<T> {
    debouncing: Arc<AtomicBool>,
    timer: Arc<T>,
    settle: Duration,
}

impl<T> Clone for DoorInterrupt<T> {
    fn clone(&self) -> Self {
        Self {
            debouncing: Arc::clone(&self.debouncing),
            timer: Arc::clone(&self.timer),
            settle: self.settle,
        }
    }
}

impl<T: OneShotTimer> DoorInterrupt<T> {
    /// Handle an edge on the door contact.
    ///
    /// Returns `true` if this edge started a debounce window.
    pub fn on_edge(&self) -> bool {
        if self
            .debouncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.timer.arm(self.settle);
            true
        } else {
            false
        }
    }
}

/// Door contact: `true` (high) means open.
pub struct Door<I, T> {
    pin: I,
    open: bool,
    debouncing: Arc<AtomicBool>,
    timer: Arc<T>,
    settle: Duration,
}

impl<I: InputPin, T: OneShotTimer> Door<I, T> {
    /// Sample the contact once to seed the known state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if the pin cannot
    /// be read.
    pub fn new(mut pin: I, timer: T, settle: Duration) -> Result<Self> {
        let open = pin.is_high().map_err(|e| pin_error("door input", &e))?;
        Ok(Self {
            pin,
            open,
            debouncing: Arc::new(AtomicBool::new(false)),
            timer: Arc::new(timer),
            settle,
        })
    }

    /// Handle to wire into the edge interrupt.
    #[must_use]
    pub fn interrupt(&self) -> DoorInterrupt<T> {
        DoorInterrupt {
            debouncing: Arc::clone(&self.debouncing),
            timer: Arc::clone(&self.timer),
            settle: self.settle,
        }
    }

    /// Last reported level.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn is_debouncing(&self) -> bool {
        self.debouncing.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Settle timer fired: read the contact, end the debounce window and
    /// return the level to report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if the pin cannot
    /// be read. The debounce window still ends.
    pub fn finalize(&mut self) -> Result<bool> {
        let level = self.pin.is_high();
        self.timer.cancel();
        self.debouncing.store(false, Ordering::Release);
        let open = level.map_err(|e| pin_error("door input", &e))?;
        self.open = open;
        info!(open, "door settled");
        Ok(open)
    }

    /// Periodic comparator: returns the new level only if it differs from
    /// the last one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if the pin cannot
    /// be read.
    pub fn check(&mut self) -> Result<Option<bool>> {
        let open = self.pin.is_high().map_err(|e| pin_error("door input", &e))?;
        if open == self.open {
            return Ok(None);
        }
        debug!(open, "door changed between edges");
        self.open = open;
        Ok(Some(open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{ManualTimer, SimPin};

    fn door(level: bool) -> (Door<SimPin, ManualTimer>, SimPin) {
        let pin = SimPin::new(level);
        let door = Door::new(pin.clone(), ManualTimer::new(), DEFAULT_SETTLE).unwrap();
        (door, pin)
    }

    #[test]
    fn test_seeded_from_pin() {
        assert!(door(true).0.is_open());
        assert!(!door(false).0.is_open());
    }

    #[test]
    fn test_burst_of_edges_arms_once() {
        let (door, pin) = door(false);
        let irq = door.interrupt();

        pin.set(true);
        assert!(irq.on_edge());
        pin.set(false);
        assert!(!irq.on_edge());
        pin.set(true);
        assert!(!irq.on_edge());

        assert!(door.is_debouncing());
        assert_eq!(door.timer().arm_count(), 1);
        assert_eq!(door.timer().last_duration(), Some(DEFAULT_SETTLE));
    }

    #[test]
    fn test_finalize_reads_settled_level_and_rearms() {
        let (mut door, pin) = door(false);
        let irq = door.interrupt();

        pin.set(true);
        irq.on_edge();
        assert!(door.timer().fire());
        assert!(door.finalize().unwrap());
        assert!(door.is_open());
        assert!(!door.is_debouncing());

        // A fresh window can start after finalize.
        pin.set(false);
        assert!(irq.on_edge());
        assert_eq!(door.timer().arm_count(), 2);
    }

    #[test]
    fn test_finalize_reports_even_without_net_change() {
        let (mut door, pin) = door(false);
        pin.set(true);
        door.interrupt().on_edge();
        pin.set(false);
        door.timer().fire();
        assert!(!door.finalize().unwrap());
    }

    #[test]
    fn test_check_reports_only_changes() {
        let (mut door, pin) = door(false);
        assert_eq!(door.check().unwrap(), None);

        pin.set(true);
        assert_eq!(door.check().unwrap(), Some(true));
        assert_eq!(door.check().unwrap(), None);

        pin.set(false);
        assert_eq!(door.check().unwrap(), Some(false));
    }

    #[test]
    fn test_interrupt_from_other_thread() {
        let (door, _pin) = door(false);
        let irq = door.interrupt();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let irq = irq.clone();
                std::thread::spawn(move || irq.on_edge())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&s| s)
            .count();
        assert_eq!(started, 1);
        assert_eq!(door.timer().arm_count(), 1);
    }
}
