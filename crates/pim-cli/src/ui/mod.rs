//! Console presentation: live progress and final result rendering.

pub mod output;
pub mod reporter;

pub use output::{OutputFormat, Tabular, render};
pub use reporter::ConsoleReporter;
