//! Telemetry-backed tunable fields.
//!
//! A [`Tunable`] is a typed cell mirrored to a telemetry key. At startup
//! the driver seeds the telemetry store with the declared default (unless
//! the cell opts out), and before each tick it pulls the stored value back
//! into the cell. An operator editing the key on the other side of the
//! bridge therefore changes the in-loop value without a rebuild.
//!
//! Values cross the bridge as `serde_json::Value`; a stored value that no
//! longer decodes as `T` is logged and ignored rather than propagated as
//! a fault.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::telemetry::{Telemetry, Value};
use tracing::warn;

/// Object-safe view the cycle driver uses to sync tunable cells.
pub trait TunableCell {
    /// Key of this cell relative to its owner's telemetry prefix.
    fn key(&self) -> &str;

    /// Seed the telemetry store at startup.
    fn init(&mut self, prefix: &str, telemetry: &mut dyn Telemetry);

    /// Pull the stored value into the cell. Runs before every tick.
    fn pull(&mut self, telemetry: &dyn Telemetry);

    /// Push a locally written value back to the store, if one is pending.
    fn flush(&mut self, telemetry: &mut dyn Telemetry);
}

/// Typed tunable value mirrored to one telemetry key.
#[derive(Debug)]
pub struct Tunable<T> {
    key: String,
    full_key: String,
    value: T,
    write_default: bool,
    dirty: bool,
}

impl<T: Serialize + DeserializeOwned + Clone> Tunable<T> {
    /// Tunable whose default is written to the store at startup.
    pub fn new(key: impl Into<String>, default: T) -> Self {
        Self {
            key: key.into(),
            full_key: String::new(),
            value: default,
            write_default: true,
            dirty: false,
        }
    }

    /// Tunable that adopts an existing stored value but never seeds one.
    ///
    /// Used where the store key is shared and a freshly constructed cell
    /// must not clobber an operator's earlier edit.
    pub fn without_default_write(key: impl Into<String>, default: T) -> Self {
        Self {
            write_default: false,
            ..Self::new(key, default)
        }
    }

    /// Current value of the cell.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Write a new value locally; it reaches the store on the next flush.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }
}

fn full_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

impl<T: Serialize + DeserializeOwned + Clone> TunableCell for Tunable<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn init(&mut self, prefix: &str, telemetry: &mut dyn Telemetry) {
        self.full_key = full_key(prefix, &self.key);

        match telemetry.get(&self.full_key) {
            Some(stored) => self.adopt(stored),
            None if self.write_default => {
                match serde_json::to_value(&self.value) {
                    Ok(v) => telemetry.publish(&self.full_key, v),
                    Err(err) => warn!("tunable '{}' default not serializable: {err}", self.full_key),
                }
            }
            None => {}
        }
    }

    fn pull(&mut self, telemetry: &dyn Telemetry) {
        if let Some(stored) = telemetry.get(&self.full_key) {
            self.adopt(stored);
        }
    }

    fn flush(&mut self, telemetry: &mut dyn Telemetry) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        match serde_json::to_value(&self.value) {
            Ok(v) => telemetry.publish(&self.full_key, v),
            Err(err) => warn!("tunable '{}' value not serializable: {err}", self.full_key),
        }
    }
}

impl<T: Serialize + DeserializeOwned + Clone> Tunable<T> {
    fn adopt(&mut self, stored: Value) {
        match serde_json::from_value::<T>(stored) {
            Ok(v) => self.value = v,
            Err(err) => warn!("tunable '{}' holds an incompatible value: {err}", self.full_key),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
