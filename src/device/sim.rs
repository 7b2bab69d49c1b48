//! Host stand-ins for pins and timers.
//!
//! [`SimPin`] and [`TokioTimer`] let the controller run on a workstation;
//! [`ManualTimer`] is fired by hand in tests.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::device::hal::{OneShotTimer, TimerSignal};

/// A digital line backed by an atomic. Clones share the level.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    level: Arc<AtomicBool>,
}

impl SimPin {
    #[must_use]
    pub fn new(level: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(level)),
        }
    }

    /// Drive the line from outside, e.g. a door sensor changing.
    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::Release);
    }

    #[must_use]
    pub fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level())
    }
}

/// Timer that only fires when told to.
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: AtomicBool,
    arms: AtomicUsize,
    last_ms: AtomicU64,
    signal: TimerSignal,
}

impl ManualTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire if armed. Returns whether it fired.
    pub fn fire(&self) -> bool {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.signal.raise();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// How many times `arm` has been called.
    #[must_use]
    pub fn arm_count(&self) -> usize {
        self.arms.load(Ordering::Acquire)
    }

    /// Duration passed to the most recent `arm`.
    #[must_use]
    pub fn last_duration(&self) -> Option<Duration> {
        (self.arm_count() > 0).then(|| Duration::from_millis(self.last_ms.load(Ordering::Acquire)))
    }
}

impl OneShotTimer for ManualTimer {
    fn arm(&self, duration: Duration) {
        self.last_ms
            .store(duration.as_millis() as u64, Ordering::Release);
        self.arms.fetch_add(1, Ordering::AcqRel);
        self.armed.store(true, Ordering::Release);
    }

    fn cancel(&self) {
        self.armed.store(false, Ordering::Release);
    }

    fn signal(&self) -> &TimerSignal {
        &self.signal
    }
}

/// One-shot timer on the tokio runtime.
#[derive(Debug)]
pub struct TokioTimer {
    handle: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
    signal: Arc<TimerSignal>,
}

impl TokioTimer {
    /// Bind to the runtime `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            task: Mutex::new(None),
            signal: Arc::new(TimerSignal::new()),
        }
    }

    /// Bind to the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl OneShotTimer for TokioTimer {
    fn arm(&self, duration: Duration) {
        let signal = Arc::clone(&self.signal);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(duration).await;
            signal.raise();
        });
        if let Ok(mut slot) = self.task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    fn cancel(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    fn signal(&self) -> &TimerSignal {
        &self.signal
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
