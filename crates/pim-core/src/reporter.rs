//! Reporter trait for dependency injection
//!
//! This trait allows core logic to report progress and status without
//! being coupled to a specific console or output format.

use pim_schema::PluginName;

use crate::plugin::PluginState;

/// Progress sink for resolution and installation.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Resolving", "Downloading").
    fn section(&self, title: &str);

    /// A plugin moved to a new lifecycle state.
    fn state(&self, name: &PluginName, version: &str, state: PluginState);

    /// Updates the progress of a download.
    fn downloading(&self, name: &PluginName, version: &str, current: u64, total: Option<u64>);

    /// Marks a plugin operation as successfully completed.
    fn done(&self, name: &PluginName, version: &str, detail: &str);

    /// Marks a plugin operation as failed with a specific reason.
    fn failed(&self, name: &PluginName, version: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn state(&self, name: &PluginName, version: &str, state: PluginState) {
        (**self).state(name, version, state);
    }
    fn downloading(&self, name: &PluginName, version: &str, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn done(&self, name: &PluginName, version: &str, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, name: &PluginName, version: &str, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn state(&self, _: &PluginName, _: &str, _: PluginState) {}
    fn downloading(&self, _: &PluginName, _: &str, _: u64, _: Option<u64>) {}
    fn done(&self, _: &PluginName, _: &str, _: &str) {}
    fn failed(&self, _: &PluginName, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
