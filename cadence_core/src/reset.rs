//! Per-tick reset cells.
//!
//! A [`ResetCell`] holds a value that callers (typically operator-input
//! code) may overwrite during a tick and that the cycle driver restores
//! to its declared default after every `execute()` pass. Actuator-style
//! requests therefore never persist past the tick that set them, so a
//! component that stops being commanded falls back to a safe value
//! instead of latching the last command.

use std::fmt;

/// Object-safe view the cycle driver uses to restore cells.
pub trait Resettable {
    /// Restore the cell to its declared default value.
    fn reset(&mut self);
}

/// Value that reverts to its default after every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetCell<T: Clone> {
    value: T,
    default: T,
}

impl<T: Clone> ResetCell<T> {
    pub fn new(default: T) -> Self {
        Self {
            value: default.clone(),
            default,
        }
    }

    /// Current value, valid for the remainder of this tick.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Overwrite the value for this tick only.
    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    /// The default the cell reverts to.
    pub fn default_value(&self) -> &T {
        &self.default
    }
}

impl<T: Clone + Default> Default for ResetCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone> Resettable for ResetCell<T> {
    fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

impl<T: Clone> std::ops::Deref for ResetCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + fmt::Display> fmt::Display for ResetCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
