//! Key/value telemetry bridge.
//!
//! The framework treats the telemetry transport as an opaque store: tunable
//! fields are read from it, feedback values are published into it, and
//! nothing here knows whether the other side is a dashboard, a network
//! table, or a test assertion.

use std::collections::BTreeMap;

pub use serde_json::Value;

/// Narrow key/value bridge for tunable fields and feedback values.
pub trait Telemetry {
    /// Current value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value.
    fn publish(&mut self, key: &str, value: Value);
}

/// In-memory telemetry store.
///
/// The default store for programs without an external bridge, and the
/// assertion point for tests.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    entries: BTreeMap<String, Value>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published entries, keyed by full telemetry path.
    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }
}

impl Telemetry for MemoryTelemetry {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn publish(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }
}

// Lets a test hand the driver a store while keeping a handle to it.
impl<T: Telemetry> Telemetry for std::rc::Rc<std::cell::RefCell<T>> {
    fn get(&self, key: &str) -> Option<Value> {
        self.borrow().get(key)
    }

    fn publish(&mut self, key: &str, value: Value) {
        self.borrow_mut().publish(key, value);
    }
}

/// Telemetry sink that discards everything.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn publish(&mut self, _key: &str, _value: Value) {}
}

// ─── Tests ──────────────────────────────────────────────────────────
