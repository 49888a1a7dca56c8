//! Injected diagnostics sink.
//!
//! The estimator and the batch wrapper report through a [`Diagnostics`]
//! handle instead of the global logger, so callers decide where messages go
//! and tests can inspect them.

use std::sync::Mutex;

use log::Level;

/// Receiver for diagnostic messages emitted during estimation.
pub trait Diagnostics: Send + Sync {
    /// Record a message at the given level.
    fn report(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.report(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, level: Level, message: &str) {
        log::log!(target: "smlm_density", level, "{}", message);
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far, in arrival order.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Messages recorded at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn report(&self, level: Level, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}
