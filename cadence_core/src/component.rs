//! Component trait surface.
//!
//! Everything the cycle driver manages implements [`Wired`]: it declares
//! its injection requests, accepts resolved bindings, and exposes its
//! reset cells, tunables and feedback values. Periodically executed
//! components additionally implement [`Component`]; state-machine logic
//! implements [`crate::fsm::MachineLogic`] instead and is driven through
//! a [`crate::fsm::StateMachine`] wrapper.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::inject::{Bindings, FieldRequest, InjectionError};
use crate::reset::Resettable;
use crate::telemetry::Value;
use crate::tunable::TunableCell;

// ─── Faults ─────────────────────────────────────────────────────────

/// Recoverable per-tick failure raised by component code.
///
/// A fault aborts the raising component's work for the current tick and
/// is reported through the error sink; it never stops the loop and never
/// touches other components.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TickFault {
    message: String,
}

impl TickFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for TickFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TickFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result of component code running inside a tick.
pub type TickResult = Result<(), TickFault>;

// ─── Tick context ───────────────────────────────────────────────────

/// Per-tick facts handed to `execute()`.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Monotonic timestamp of this tick [s].
    pub now: f64,
    /// Tick counter, starting at 0 for the first executed tick.
    pub tick: u64,
}

// ─── Feedback ───────────────────────────────────────────────────────

/// Collector for per-tick feedback values.
///
/// Components push name/value pairs during the feedback pass; the driver
/// publishes each under the component's telemetry prefix.
#[derive(Debug, Default)]
pub struct Feedback {
    entries: Vec<(String, Value)>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every collected entry, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.entries)
    }
}

// ─── Traits ─────────────────────────────────────────────────────────

/// Anything the driver wires and syncs: components and machine logic.
pub trait Wired: Any {
    /// Injection requests this object needs satisfied before any other
    /// lifecycle call.
    fn requests(&self) -> Vec<FieldRequest> {
        Vec::new()
    }

    /// Accept resolved bindings. Called exactly once, before `setup()`.
    fn wire(&mut self, _bindings: &Bindings) -> Result<(), InjectionError> {
        Ok(())
    }

    /// One-time initialization after the whole context is wired.
    /// Sibling components are live at this point.
    fn setup(&mut self) -> TickResult {
        Ok(())
    }

    /// Cells the driver restores after every tick.
    fn reset_fields(&mut self) -> Vec<&mut dyn Resettable> {
        Vec::new()
    }

    /// Tunable cells the driver syncs with the telemetry store.
    fn tunables(&mut self) -> Vec<&mut dyn TunableCell> {
        Vec::new()
    }

    /// Publish per-tick feedback values.
    fn feedback(&self, _out: &mut Feedback) {}
}

/// Periodically executed component.
pub trait Component: Wired {
    /// One tick of control logic. Runs every tick while the program is
    /// in an operating mode.
    fn execute(&mut self, ctx: &TickContext) -> TickResult;

    /// The program left the disabled state.
    fn on_enable(&mut self) -> TickResult {
        Ok(())
    }

    /// The program entered the disabled state. Must leave actuators safe.
    fn on_disable(&mut self) -> TickResult {
        Ok(())
    }
}

impl fmt::Display for TickContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {} @ {:.3}s", self.tick, self.now)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
