//! Moving verified artifacts into the plugin directory.
//!
//! The only mutation of an existing install is a rename to the single
//! backup slot followed by a rename of the verified temp file into place,
//! both under an exclusive advisory lock on `.<name>.lock`. The second
//! rename is the commit point.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pim_schema::PluginName;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::Reporter;
use crate::error::PluginError;
use crate::io::download::{DownloadError, DownloadRequest, UrlPolicy, VerifiedDownload};
use crate::paths::lock_path;
use crate::plugin::{Plugin, PluginState};

/// Suffix tried once when the derived URL answers 404.
pub const RENAME_SUFFIX: &str = "-plugin";

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    /// Final `<name>.jpi` path.
    pub path: PathBuf,
    /// `<name>.bak` path, when a previous artifact was moved aside.
    pub backup: Option<PathBuf>,
}

/// Commit a verified download as `<plugin_dir>/<name>.jpi`.
///
/// # Errors
///
/// Returns an error if the lock cannot be taken or either rename fails. A
/// failure before the final rename leaves the previous artifact at its
/// original name or in the backup slot.
pub fn install_artifact(
    plugin_dir: &Path,
    name: &PluginName,
    download: VerifiedDownload,
) -> Result<InstalledArtifact, PluginError> {
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(plugin_dir, name))?;
    lock.lock()?;

    let dest = plugin_dir.join(name.archive_file_name());
    let backup = if dest.exists() {
        let backup = plugin_dir.join(name.backup_file_name());
        std::fs::rename(&dest, &backup)?;
        debug!(plugin = %name, backup = %backup.display(), "Moved previous artifact aside");
        Some(backup)
    } else {
        None
    };

    download.file.persist(&dest).map_err(|e| e.error)?;
    lock.unlock()?;

    Ok(InstalledArtifact { path: dest, backup })
}

/// Result of installing one plugin.
#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    /// The plugin as installed (renamed if the fallback name was used).
    pub plugin: Plugin,
    /// URL the bytes came from.
    pub url: String,
    /// Bytes received.
    pub size: u64,
    /// Final location.
    pub artifact: InstalledArtifact,
}

/// Downloads, verifies and installs resolved plugins.
#[derive(Clone)]
pub struct PluginInstaller {
    client: Client,
    policy: UrlPolicy,
    plugin_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for PluginInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstaller")
            .field("policy", &self.policy)
            .field("plugin_dir", &self.plugin_dir)
            .finish_non_exhaustive()
    }
}

impl PluginInstaller {
    /// Create an installer writing into `plugin_dir`.
    pub fn new(
        client: Client,
        policy: UrlPolicy,
        plugin_dir: impl Into<PathBuf>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            client,
            policy,
            plugin_dir: plugin_dir.into(),
            reporter,
        }
    }

    async fn fetch(&self, plugin: &Plugin, url: &str) -> Result<VerifiedDownload, DownloadError> {
        let version = plugin.version_string();
        // Checksums describe update-center artifacts, not arbitrary URLs.
        let expected = plugin.checksum.as_ref().filter(|_| plugin.url.is_none());
        DownloadRequest {
            client: &self.client,
            name: plugin.name(),
            version: &version,
            url,
            dir: &self.plugin_dir,
            expected,
            reporter: &*self.reporter,
        }
        .execute()
        .await
    }

    /// Fetch `plugin`, verify it and move it into place.
    ///
    /// # Errors
    ///
    /// Returns the download or install failure; the plugin has been
    /// reported as [`PluginState::Failed`].
    pub async fn install(&self, plugin: Plugin) -> Result<InstalledPlugin, PluginError> {
        let name = plugin.name().clone();
        let version = plugin.version_string();
        match self.try_install(plugin).await {
            Ok(installed) => Ok(installed),
            Err(e) => {
                self.reporter.state(&name, &version, PluginState::Failed);
                self.reporter.failed(&name, &version, &e.to_string());
                Err(e)
            }
        }
    }

    async fn try_install(&self, mut plugin: Plugin) -> Result<InstalledPlugin, PluginError> {
        let version = plugin.version_string();
        self.reporter
            .state(plugin.name(), &version, PluginState::Downloading);

        let mut url = self.policy.download_url(&plugin);
        let download = match self.fetch(&plugin, &url).await {
            Err(DownloadError::NotFound { .. }) if plugin.url.is_none() => {
                let renamed = format!("{}{RENAME_SUFFIX}", plugin.name());
                warn!(plugin = %plugin.name(), %url, renamed, "Not found, retrying under alternate name");
                plugin.rename(renamed);
                url = self.policy.download_url(&plugin);
                self.fetch(&plugin, &url).await?
            }
            other => other?,
        };

        self.reporter
            .state(plugin.name(), &version, PluginState::ChecksumVerified);

        let size = download.size;
        let dir = self.plugin_dir.clone();
        let name = plugin.name().clone();
        let artifact = tokio::task::spawn_blocking(move || install_artifact(&dir, &name, download))
            .await
            .map_err(std::io::Error::other)??;

        info!(plugin = %plugin, path = %artifact.path.display(), "Installed");
        self.reporter
            .state(plugin.name(), &version, PluginState::Installed);
        self.reporter.done(plugin.name(), &version, "installed");

        Ok(InstalledPlugin {
            plugin,
            url,
            size,
            artifact,
        })
    }
}
