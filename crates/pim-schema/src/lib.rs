//! Shared types and wire formats for pim.
//!
//! Everything here is pure: no network, no filesystem. The version
//! comparator, checksum encoding, update-center documents and manifest
//! parsing live here so that both the core and any tooling read them the
//! same way.

pub mod hash;
pub mod manifest;
pub mod types;
pub mod update_center;
pub mod version;

// Re-exports
pub use hash::*;
pub use manifest::{MANIFEST_PATH, Manifest, ManifestDependency, ManifestError};
pub use types::*;
pub use update_center::{
    DependencySpec, PluginVersionInfo, PluginVersions, SecurityWarning, UpdateCenter,
    UpdateCenterPlugin,
};
pub use version::{VersionSpec, VersionSpecError};
