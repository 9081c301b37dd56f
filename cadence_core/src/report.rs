//! Error sink boundary.
//!
//! Per-tick failures are isolated by the cycle driver and handed to an
//! [`ErrorSink`]; whether a report escalates (driver-station message,
//! operator alarm, process exit) is entirely the sink's policy.

use crate::component::TickFault;

/// Destination for isolated per-tick failures and mode-hook faults.
pub trait ErrorSink {
    /// Report a failure.
    ///
    /// `force` marks reports that bypass the driver's rate limiting
    /// (mode transitions and other rare, safety-critical paths).
    fn report(&mut self, message: &str, fault: Option<&TickFault>, force: bool);
}

/// Default sink: forwards every report to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&mut self, message: &str, fault: Option<&TickFault>, _force: bool) {
        match fault {
            Some(f) => tracing::error!("{message}: {f}"),
            None => tracing::error!("{message}"),
        }
    }
}

// Lets a test hand the driver a sink while keeping a handle to it.
impl<T: ErrorSink> ErrorSink for std::rc::Rc<std::cell::RefCell<T>> {
    fn report(&mut self, message: &str, fault: Option<&TickFault>, force: bool) {
        self.borrow_mut().report(message, fault, force);
    }
}

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub message: String,
    pub detail: Option<String>,
    pub forced: bool,
}

/// Sink that records every report, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<ReportEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[ReportEntry] {
        &self.reports
    }
}

impl ErrorSink for MemorySink {
    fn report(&mut self, message: &str, fault: Option<&TickFault>, force: bool) {
        self.reports.push(ReportEntry {
            message: message.to_string(),
            detail: fault.map(|f| f.to_string()),
            forced: force,
        });
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
