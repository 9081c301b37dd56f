//! Monotonic time sources.
//!
//! The framework never reads a hardware clock directly: every timestamp
//! comes through the [`Clock`] trait so that tests and simulation can
//! substitute a manually advanced clock.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic time source consumed by the cycle driver and state machines.
pub trait Clock {
    /// Current monotonic time [s]. The origin is arbitrary but fixed
    /// for the lifetime of the clock.
    fn now(&self) -> f64;
}

/// Wall clock backed by `std::time::Instant`.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for tests and deterministic simulation.
///
/// Cloning yields a handle onto the same underlying time value, so a
/// test can hand one clone to the driver and keep another to step time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    t: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        self.t.set(self.t.get() + dt);
    }

    /// Jump to an absolute time.
    pub fn set(&self, t: f64) {
        self.t.set(t);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.t.get()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
