//! Hardware capabilities the device controller is built on.
//!
//! Pins come from `embedded-hal`. One-shot timers are a small trait of our
//! own: firing only raises a [`TimerSignal`], which the main loop takes and
//! acts on. Nothing running in timer or interrupt context touches device
//! state directly.

use core::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Error;

/// Single-producer, single-consumer "timer fired" flag.
///
/// Raised from timer context, taken on the main loop.
#[derive(Debug, Default)]
pub struct TimerSignal(AtomicBool);

impl TimerSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark the timer as fired. Lock-free, allocation-free.
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume a pending firing, if any.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A one-shot timer exclusively owned by one part of the device controller.
///
/// `arm` and `cancel` may be called from interrupt context, so
/// implementations must not block.
pub trait OneShotTimer: Send + Sync {
    /// Start (or restart) the timer; it raises [`signal`](Self::signal)
    /// once after `duration`.
    fn arm(&self, duration: Duration);

    /// Disarm the timer. A firing that already happened stays raised.
    fn cancel(&self);

    /// The flag this timer raises when it fires.
    fn signal(&self) -> &TimerSignal;
}

/// Map an `embedded-hal` pin error into ours.
pub(crate) fn pin_error<E: embedded_hal::digital::Error>(what: &str, err: &E) -> Error {
    Error::Hardware(format!("{what}: {:?}", err.kind()))
}
