//! Snapshot of what is already present: installed artifacts, plugins
//! bundled in the host archive, and the host version.

use std::collections::BTreeMap;
use std::path::Path;

use pim_schema::{MANIFEST_PATH, PluginName, version};
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::io::archive::{HostArchive, read_plugin_manifest};

const BUNDLED_PREFIX: &str = "WEB-INF/plugins/";
const DETACHED_PREFIX: &str = "WEB-INF/detached-plugins/";
const ARCHIVE_EXTENSIONS: [&str; 2] = ["jpi", "hpi"];

/// Where an inventory version was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    /// `<plugin_dir>/<name>.jpi` or `.hpi`.
    Installed,
    /// `WEB-INF/plugins/<name>.hpi` in the host archive.
    Bundled,
}

/// Immutable per-run snapshot.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    installed: BTreeMap<PluginName, String>,
    bundled: BTreeMap<PluginName, String>,
    host_version: Option<String>,
}

fn archive_stem(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && ARCHIVE_EXTENSIONS.contains(&ext)).then_some(stem)
}

impl Inventory {
    /// An empty inventory (nothing installed, no host archive).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan the plugin directory and, if given, the host archive.
    ///
    /// A missing plugin directory counts as empty. Unreadable artifacts are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directory exists but cannot be
    /// listed, or the host archive cannot be read.
    pub fn scan(plugin_dir: &Path, host: Option<&dyn HostArchive>) -> Result<Self, PluginError> {
        let installed = installed_plugins(plugin_dir)?;
        let (bundled, host_version) = match host {
            Some(archive) => (bundled_plugins(archive)?, host_version(archive)),
            None => (BTreeMap::new(), None),
        };
        debug!(
            installed = installed.len(),
            bundled = bundled.len(),
            host = host_version.as_deref().unwrap_or("unknown"),
            "Inventory scanned"
        );
        Ok(Self {
            installed,
            bundled,
            host_version,
        })
    }

    /// Builder: record an installed plugin.
    #[must_use]
    pub fn with_installed(mut self, name: &str, version: &str) -> Self {
        self.installed.insert(PluginName::new(name), version.to_string());
        self
    }

    /// Builder: record a bundled plugin.
    #[must_use]
    pub fn with_bundled(mut self, name: &str, version: &str) -> Self {
        self.bundled.insert(PluginName::new(name), version.to_string());
        self
    }

    /// Override the detected host version.
    pub fn set_host_version(&mut self, version: Option<String>) {
        if version.is_some() {
            self.host_version = version;
        }
    }

    /// Installed artifacts by name.
    pub fn installed(&self) -> &BTreeMap<PluginName, String> {
        &self.installed
    }

    /// Bundled plugins by name.
    pub fn bundled(&self) -> &BTreeMap<PluginName, String> {
        &self.bundled
    }

    /// Host version, if known.
    pub fn host_version(&self) -> Option<&str> {
        self.host_version.as_deref()
    }

    /// Newest version present, installed or bundled.
    pub fn best_version(&self, name: &str) -> Option<(&str, InventorySource)> {
        let installed = self
            .installed
            .get(name)
            .map(|v| (v.as_str(), InventorySource::Installed));
        let bundled = self
            .bundled
            .get(name)
            .map(|v| (v.as_str(), InventorySource::Bundled));
        match (installed, bundled) {
            (Some(i), Some(b)) if version::compare(b.0, i.0).is_gt() => Some(b),
            (Some(i), _) => Some(i),
            (None, b) => b,
        }
    }
}

/// Versions of every `*.jpi`/`*.hpi` in `plugin_dir`, keyed by file stem.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn installed_plugins(plugin_dir: &Path) -> Result<BTreeMap<PluginName, String>, PluginError> {
    let mut out = BTreeMap::new();
    let entries = match std::fs::read_dir(plugin_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let path = entry?.path();
        let Some(stem) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(archive_stem)
        else {
            continue;
        };
        if !path.is_file() {
            continue;
        }
        match read_plugin_manifest(&path) {
            Ok(manifest) => match manifest.plugin_version() {
                Some(v) => {
                    out.insert(PluginName::new(stem), v.to_string());
                }
                None => warn!(path = %path.display(), "Installed artifact has no Plugin-Version"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable artifact"),
        }
    }
    Ok(out)
}

/// Versions of the plugins bundled in the host archive.
///
/// # Errors
///
/// Returns an error if the archive's entry list cannot be read.
pub fn bundled_plugins(archive: &dyn HostArchive) -> Result<BTreeMap<PluginName, String>, PluginError> {
    let mut out = BTreeMap::new();
    for entry in archive.list_entries()? {
        if entry.starts_with(DETACHED_PREFIX) {
            continue;
        }
        let Some(file_name) = entry.strip_prefix(BUNDLED_PREFIX) else {
            continue;
        };
        if file_name.contains('/') {
            continue;
        }
        let Some(stem) = archive_stem(file_name) else {
            continue;
        };

        let version = archive
            .extract_to_temp(&entry)
            .and_then(|tmp| read_plugin_manifest(tmp.path()));
        match version {
            Ok(manifest) => match manifest.plugin_version() {
                Some(v) => {
                    out.insert(PluginName::new(stem), v.to_string());
                }
                None => warn!(entry, "Bundled plugin has no Plugin-Version"),
            },
            Err(e) => warn!(entry, error = %e, "Skipping unreadable bundled plugin"),
        }
    }
    Ok(out)
}

/// Host version from the archive's own manifest.
pub fn host_version(archive: &dyn HostArchive) -> Option<String> {
    match archive.manifest() {
        Ok(manifest) => manifest.jenkins_version().map(str::to_string),
        Err(e) => {
            warn!(entry = MANIFEST_PATH, error = %e, "Unable to read host version");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::archive::{MemoryHostArchive, plugin_archive_bytes};
    use tempfile::TempDir;

    fn host() -> MemoryHostArchive {
        MemoryHostArchive::new()
            .with_entry(MANIFEST_PATH, b"Manifest-Version: 1.0\nJenkins-Version: 2.440.1\n".to_vec())
            .with_entry(
                "WEB-INF/plugins/matrix-auth.hpi",
                plugin_archive_bytes("Plugin-Version: 3.1\n"),
            )
            .with_entry(
                "WEB-INF/plugins/git.jpi",
                plugin_archive_bytes("Plugin-Version: 4.0\n"),
            )
            .with_entry(
                "WEB-INF/detached-plugins/ant.hpi",
                plugin_archive_bytes("Plugin-Version: 1.0\n"),
            )
            .with_entry("WEB-INF/plugins/README.txt", b"ignored".to_vec())
    }

    #[test]
    fn test_bundled_excludes_detached() {
        let bundled = bundled_plugins(&host()).unwrap();
        assert_eq!(bundled.len(), 2);
        assert_eq!(bundled.get("matrix-auth").map(String::as_str), Some("3.1"));
        assert!(!bundled.contains_key("ant"));
    }

    #[test]
    fn test_scan_reads_installed_and_host_version() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("git.jpi"),
            plugin_archive_bytes("Plugin-Version: 4.11.4\n"),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.hpi"), "not a zip").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let host = host();
        let inv = Inventory::scan(dir.path(), Some(&host)).unwrap();
        assert_eq!(inv.installed().get("git").map(String::as_str), Some("4.11.4"));
        assert_eq!(inv.installed().len(), 1);
        assert_eq!(inv.host_version(), Some("2.440.1"));
        // installed 4.11.4 beats bundled 4.0
        assert_eq!(
            inv.best_version("git"),
            Some(("4.11.4", InventorySource::Installed))
        );
        assert_eq!(
            inv.best_version("matrix-auth"),
            Some(("3.1", InventorySource::Bundled))
        );
    }

    #[test]
    fn test_missing_plugin_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let inv = Inventory::scan(&dir.path().join("absent"), None).unwrap();
        assert!(inv.installed().is_empty());
        assert_eq!(inv.host_version(), None);
    }

    #[test]
    fn test_bundled_newer_than_installed_wins() {
        let inv = Inventory::empty()
            .with_installed("git", "3.0")
            .with_bundled("git", "4.0");
        assert_eq!(inv.best_version("git"), Some(("4.0", InventorySource::Bundled)));
    }
}
