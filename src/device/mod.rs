//! Device controller: the lock actuator and the door contact.
//!
//! All state changes happen on the main loop. Timer expiries and door edges
//! only set flags; [`Controller::poll`] consumes them and queues the resulting
//! status events.
//!
//! # Example
//!
//! ```
//! use lockwire::device::{Controller, Device, LockControl, LockState};
//! use lockwire::device::sim::{ManualTimer, SimPin};
//! use lockwire::queue::OutboundQueue;
//!
//! let mut device = Device::builder("door-7")
//!     .build(
//!         SimPin::new(false),
//!         SimPin::new(false),
//!         SimPin::new(false),
//!         ManualTimer::new(),
//!         ManualTimer::new(),
//!     )
//!     .unwrap();
//! let mut out = OutboundQueue::default();
//!
//! device.open_lock(&mut out).unwrap();
//! assert_eq!(device.lock_state(), LockState::Opening);
//!
//! device.lock_timer().fire();
//! device.poll(&mut out).unwrap();
//! assert_eq!(device.lock_state(), LockState::Open);
//! assert_eq!(out.len(), 2);
//! ```

mod door;
pub mod hal;
mod lock;
pub mod sim;

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};

pub use door::{DEFAULT_SETTLE, Door, DoorInterrupt};
pub use hal::{OneShotTimer, TimerSignal};
pub use lock::{DEFAULT_PULSE, Lock, LockState};

use crate::envelope::Envelope;
use crate::error::Result;
use crate::queue::OutboundQueue;

/// Lock operations as seen by command handlers.
pub trait LockControl {
    /// Start opening; queues a status event if the lock moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the actuator cannot be driven.
    fn open_lock(&mut self, out: &mut OutboundQueue) -> Result<()>;

    /// Start closing; queues a status event if the lock moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the actuator cannot be driven.
    fn close_lock(&mut self, out: &mut OutboundQueue) -> Result<()>;

    fn lock_state(&self) -> LockState;
}

/// Main-loop servicing of timers and the door comparator.
pub trait Controller: LockControl {
    /// Finish any expired pulse or debounce window and queue the events.
    ///
    /// # Errors
    ///
    /// Returns a hardware or serialisation error. A lock error does not stop
    /// the door from being processed first.
    fn poll(&mut self, out: &mut OutboundQueue) -> Result<()>;

    /// Periodic door comparator; queues an event only on change.
    ///
    /// # Errors
    ///
    /// Returns a hardware or serialisation error.
    fn check_door(&mut self, out: &mut OutboundQueue) -> Result<()>;
}

/// Timing and identity for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    resource_uid: String,
    pulse: Duration,
    settle: Duration,
}

impl DeviceBuilder {
    #[must_use]
    pub fn pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    #[must_use]
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Take ownership of the pins and timers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hardware`](crate::Error::Hardware) if a pin cannot
    /// be initialised.
    pub fn build<LO, LC, DI, T>(
        self,
        open_pin: LO,
        close_pin: LC,
        door_pin: DI,
        lock_timer: T,
        door_timer: T,
    ) -> Result<Device<LO, LC, DI, T>>
    where
        LO: OutputPin,
        LC: OutputPin,
        DI: InputPin,
        T: OneShotTimer,
    {
        Ok(Device {
            lock: Lock::new(open_pin, close_pin, lock_timer, self.pulse)?,
            door: Door::new(door_pin, door_timer, self.settle)?,
            resource_uid: self.resource_uid,
        })
    }
}

/// The lock and door, plus the identifier reported with lock events.
pub struct Device<LO, LC, DI, T> {
    lock: Lock<LO, LC, T>,
    door: Door<DI, T>,
    resource_uid: String,
}

impl Device<(), (), (), ()> {
    /// Start configuring a device reporting as `resource_uid`.
    #[must_use]
    pub fn builder(resource_uid: impl Into<String>) -> DeviceBuilder {
        DeviceBuilder {
            resource_uid: resource_uid.into(),
            pulse: DEFAULT_PULSE,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl<LO, LC, DI, T> Device<LO, LC, DI, T>
where
    LO: OutputPin,
    LC: OutputPin,
    DI: InputPin,
    T: OneShotTimer,
{
    #[must_use]
    pub fn resource_uid(&self) -> &str {
        &self.resource_uid
    }

    #[must_use]
    pub fn door_open(&self) -> bool {
        self.door.is_open()
    }

    /// Handle for the door edge interrupt.
    #[must_use]
    pub fn door_interrupt(&self) -> DoorInterrupt<T> {
        self.door.interrupt()
    }

    #[must_use]
    pub fn lock_timer(&self) -> &T {
        self.lock.timer()
    }

    #[must_use]
    pub fn door_timer(&self) -> &T {
        self.door.timer()
    }

    fn emit_lock(&self, state: LockState, out: &mut OutboundQueue) -> Result<()> {
        out.push_envelope(&Envelope::resource_status_change(
            state.as_str(),
            &self.resource_uid,
        ))
    }
}

impl<LO, LC, DI, T> LockControl for Device<LO, LC, DI, T>
where
    LO: OutputPin,
    LC: OutputPin,
    DI: InputPin,
    T: OneShotTimer,
{
    fn open_lock(&mut self, out: &mut OutboundQueue) -> Result<()> {
        match self.lock.open()? {
            Some(state) => self.emit_lock(state, out),
            None => Ok(()),
        }
    }

    fn close_lock(&mut self, out: &mut OutboundQueue) -> Result<()> {
        match self.lock.close()? {
            Some(state) => self.emit_lock(state, out),
            None => Ok(()),
        }
    }

    fn lock_state(&self) -> LockState {
        self.lock.state()
    }
}

impl<LO, LC, DI, T> Controller for Device<LO, LC, DI, T>
where
    LO: OutputPin,
    LC: OutputPin,
    DI: InputPin,
    T: OneShotTimer,
{
    fn poll(&mut self, out: &mut OutboundQueue) -> Result<()> {
        let door = if self.door.timer().signal().take() {
            self.door
                .finalize()
                .and_then(|open| out.push_envelope(&Envelope::door_status(open)))
        } else {
            Ok(())
        };

        if self.lock.timer().signal().take() {
            if let Some(state) = self.lock.finalize()? {
                self.emit_lock(state, out)?;
            }
        }
        door
    }

    fn check_door(&mut self, out: &mut OutboundQueue) -> Result<()> {
        if let Some(open) = self.door.check()? {
            out.push_envelope(&Envelope::door_status(open))?;
        }
        Ok(())
    }
}
