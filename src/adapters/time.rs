//! Monotonic clock adapters.
//!
//! - [`MonotonicClock`] wraps `std::time::Instant` for host runs.
//! - [`ManualClock`] is advanced explicitly; the simulated plant and the
//!   tests share one so that coil pulses and control periods move the same
//!   time base.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::app::ports::ClockPort;

/// Wall-clock milliseconds since construction.
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl ClockPort for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Shared, explicitly advanced clock.  Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}
