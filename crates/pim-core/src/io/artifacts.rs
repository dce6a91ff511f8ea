//! Reading dependency declarations straight from plugin artifacts.
//!
//! Used when neither metadata document describes the requested version.
//! An installed copy of the same version is preferred; otherwise the
//! artifact is fetched into a scratch directory that is removed afterwards.

use std::path::PathBuf;

use async_trait::async_trait;
use pim_schema::Manifest;
use reqwest::Client;
use tracing::debug;

use crate::NullReporter;
use crate::error::PluginError;
use crate::io::archive::read_plugin_manifest;
use crate::io::download::{DownloadRequest, UrlPolicy};
use crate::plugin::Plugin;
use crate::resolver::ManifestSource;

/// [`ManifestSource`] backed by the plugin directory and the download URLs.
#[derive(Debug, Clone)]
pub struct ArtifactManifestSource {
    client: Client,
    policy: UrlPolicy,
    plugin_dir: PathBuf,
}

impl ArtifactManifestSource {
    /// Create a source reading from `plugin_dir` and downloading via `policy`.
    pub fn new(client: Client, policy: UrlPolicy, plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            policy,
            plugin_dir: plugin_dir.into(),
        }
    }

    fn installed_manifest(&self, plugin: &Plugin) -> Option<Manifest> {
        let path = self.plugin_dir.join(plugin.archive_file_name());
        if !path.is_file() {
            return None;
        }
        let manifest = read_plugin_manifest(&path).ok()?;
        match plugin.exact_version() {
            Some(v) if manifest.plugin_version() != Some(v) => None,
            _ => Some(manifest),
        }
    }
}

#[async_trait]
impl ManifestSource for ArtifactManifestSource {
    async fn manifest(&self, plugin: &Plugin) -> Result<Manifest, PluginError> {
        if let Some(manifest) = self.installed_manifest(plugin) {
            debug!(plugin = %plugin, "Using installed manifest");
            return Ok(manifest);
        }

        let scratch = tempfile::TempDir::new()?;
        let url = self.policy.download_url(plugin);
        let version = plugin.version_string();
        debug!(plugin = %plugin, %url, "Fetching artifact for its manifest");
        let download = DownloadRequest {
            client: &self.client,
            name: plugin.name(),
            version: &version,
            url: &url,
            dir: scratch.path(),
            expected: None,
            reporter: &NullReporter,
        }
        .execute()
        .await?;

        read_plugin_manifest(download.path())
    }
}
