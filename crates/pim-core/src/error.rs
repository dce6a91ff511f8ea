//! Error kinds surfaced by resolution and installation.

use std::path::PathBuf;

use pim_schema::{ManifestError, VersionSpecError};
use thiserror::Error;

use crate::io::download::DownloadError;

/// A transitive requirement that is newer than a top-level pin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Plugin {plugin}:{plugin_version} depends on {dependency}:{required}, but there is an older version defined on the top level - {dependency}:{pinned} (required by {chain})"
)]
pub struct DependencyConflict {
    /// Plugin declaring the requirement.
    pub plugin: String,
    /// Version of the requiring plugin.
    pub plugin_version: String,
    /// The dependency that conflicts.
    pub dependency: String,
    /// Version the requiring plugin needs.
    pub required: String,
    /// Version pinned at the top level.
    pub pinned: String,
    /// Requirement chain from the top-level ancestor down to the dependency.
    pub chain: String,
}

fn join_messages(errors: &[PluginError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised by the core pipeline.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A metadata document could not be fetched or parsed. Fatal.
    #[error("Unable to retrieve update center information from {url}: {reason}")]
    UpdateCenterInfoRetrieval {
        /// Document location.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// A transitive requirement is newer than a top-level pin.
    #[error(transparent)]
    Dependency(#[from] DependencyConflict),

    /// A plugin needs a newer host than the one found.
    #[error("Plugin {plugin}:{version} requires host version {required}, but the host is {host}")]
    IncompatibleCore {
        /// Plugin name.
        plugin: String,
        /// Plugin version.
        version: String,
        /// Minimum host version.
        required: String,
        /// Detected host version.
        host: String,
    },

    /// Every independent problem found during one resolution pass.
    #[error("Plugin prerequisites not met:\n{}", join_messages(.0))]
    AggregatePrerequisitesNotMet(Vec<PluginError>),

    /// The plugin is unknown to every source consulted.
    #[error("Plugin {name} not found: {detail}")]
    NotFound {
        /// Plugin name.
        name: String,
        /// Where it was looked for.
        detail: String,
    },

    /// The plugin or cache directory could not be created. Fatal.
    #[error("Unable to create directory {}: {source}", path.display())]
    DirectoryCreation {
        /// Directory path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// Fetching or verifying an artifact failed.
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    /// An artifact's manifest could not be parsed.
    #[error("Invalid manifest in {}: {source}", path.display())]
    Manifest {
        /// Artifact path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: ManifestError,
    },

    /// An artifact or host archive is not a readable zip.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A version specifier could not be parsed.
    #[error("Invalid version: {0}")]
    Version(#[from] VersionSpecError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Wrap conflicts so callers always see one aggregate.
    pub fn aggregate(errors: Vec<PluginError>) -> Self {
        Self::AggregatePrerequisitesNotMet(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(plugin: &str) -> DependencyConflict {
        DependencyConflict {
            plugin: plugin.into(),
            plugin_version: "2.0".into(),
            dependency: "x".into(),
            required: "1.0.1".into(),
            pinned: "1.0".into(),
            chain: format!("{plugin}:2.0 -> x:1.0.1"),
        }
    }

    #[test]
    fn test_conflict_message_names_everything() {
        let msg = conflict("a").to_string();
        assert!(msg.contains("a:2.0"));
        assert!(msg.contains("x:1.0.1"));
        assert!(msg.contains("x:1.0"));
        assert!(msg.contains("required by a:2.0 -> x:1.0.1"));
    }

    #[test]
    fn test_aggregate_lists_every_message() {
        let err = PluginError::aggregate(vec![conflict("a").into(), conflict("b").into()]);
        let msg = err.to_string();
        assert!(msg.contains("Plugin a:2.0"));
        assert!(msg.contains("Plugin b:2.0"));
    }
}
