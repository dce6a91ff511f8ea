//! Line-oriented console reporter.
//!
//! Progress goes to stderr so that rendered results on stdout stay
//! machine-readable.

use std::io::Write;

use crossterm::style::{Color, Stylize};
use pim_core::{PluginState, Reporter};
use pim_schema::PluginName;

const NAME_WIDTH: usize = 32;
const VERSION_WIDTH: usize = 16;

/// Colours used for each kind of line.
#[derive(Debug, Clone, Copy)]
struct Theme {
    name: Color,
    version: Color,
    success: Color,
    warning: Color,
    error: Color,
    secondary: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: Color::White,
            version: Color::Cyan,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            secondary: Color::DarkGrey,
        }
    }
}

/// [`Reporter`] that prints one line per event to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    theme: Theme,
    quiet: bool,
}

fn line(msg: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{msg}");
}

impl ConsoleReporter {
    /// Create a reporter. A quiet reporter prints only warnings, errors and
    /// failures.
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
        }
    }

    fn row(&self, name: &str, version: &str, detail: &str, color: Color) {
        let name = format!("{name:<NAME_WIDTH$}");
        let version = format!("{version:<VERSION_WIDTH$}");
        line(&format!(
            "  {} {} {}",
            name.with(self.theme.name),
            version.with(self.theme.version),
            detail.with(color)
        ));
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            line(&title.bold().to_string());
        }
    }

    fn state(&self, name: &PluginName, version: &str, state: PluginState) {
        tracing::debug!(plugin = %name, version, %state, "State change");
        if !self.quiet && state == PluginState::Satisfied {
            self.row(name, version, "satisfied", self.theme.secondary);
        }
    }

    fn downloading(&self, name: &PluginName, version: &str, current: u64, total: Option<u64>) {
        tracing::trace!(plugin = %name, version, current, ?total, "Download progress");
    }

    fn done(&self, name: &PluginName, version: &str, detail: &str) {
        if !self.quiet {
            self.row(name, version, detail, self.theme.success);
        }
    }

    fn failed(&self, name: &PluginName, version: &str, reason: &str) {
        self.row(name, version, reason, self.theme.error);
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            line(&msg.with(self.theme.secondary).to_string());
        }
    }

    fn warning(&self, msg: &str) {
        line(&format!("{} {msg}", "warning:".with(self.theme.warning).bold()));
    }

    fn error(&self, msg: &str) {
        line(&format!("{} {msg}", "error:".with(self.theme.error).bold()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        if self.quiet {
            return;
        }
        let noun = if count == 1 { "plugin" } else { "plugins" };
        let msg = format!("{count} {noun} {action} in {elapsed_secs:.1}s");
        line(&msg.with(self.theme.success).to_string());
    }
}
