//! Core library for pim.
//!
//! Metadata fetching and caching, inventory scanning, dependency resolution
//! and the download/install pipeline. Nothing here prints; progress goes
//! through [`Reporter`].

pub mod cache;
pub mod error;
pub mod inventory;
pub mod io;
pub mod metadata;
pub mod paths;
pub mod plugin;
pub mod reporter;
pub mod resolver;

pub use error::{DependencyConflict, PluginError};
pub use paths::*;
pub use plugin::{Plugin, PluginId, PluginRegistry, PluginState};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pim/", env!("CARGO_PKG_VERSION"));
