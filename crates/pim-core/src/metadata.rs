//! Update-center metadata: fetching, caching and lookup.

use std::sync::Arc;

use pim_schema::update_center::strip_jsonp;
use pim_schema::{
    DependencySpec, PluginVersions, SecurityWarning, Sha256Checksum, UpdateCenter, version,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::PluginError;
use crate::paths::{parent_url, url_origin};

/// Where the three metadata documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataUrls {
    /// Primary `update-center.json`.
    pub update_center: String,
    /// Experimental `update-center.json`.
    pub experimental: String,
    /// `plugin-versions.json`.
    pub plugin_versions: String,
}

impl MetadataUrls {
    /// Primary update-center URL, pinned to `host_version` when known.
    pub fn versioned_update_center(&self, host_version: Option<&str>) -> String {
        match host_version {
            Some(v) => {
                let sep = if self.update_center.contains('?') { '&' } else { '?' };
                format!("{}{sep}version={v}", self.update_center)
            }
            None => self.update_center.clone(),
        }
    }

    /// Base of the experimental update center.
    pub fn experimental_base(&self) -> String {
        parent_url(&self.experimental).to_string()
    }

    /// Default download root, derived from the primary update center's origin.
    pub fn download_base(&self) -> String {
        format!("{}/download", url_origin(&self.update_center))
    }
}

/// Fetches metadata documents through a [`Cache`].
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    cache: Arc<Cache>,
}

impl MetadataClient {
    /// Create a client.
    pub fn new(client: Client, cache: Arc<Cache>) -> Self {
        Self { client, cache }
    }

    /// Fetch and parse one document, serving it from the cache when fresh.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`PluginError::UpdateCenterInfoRetrieval`].
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str, key: &str) -> Result<T, PluginError> {
        self.fetch_located(url, key).await.map(|(doc, _)| doc)
    }

    /// Like [`fetch`](Self::fetch), also returning the URL the document was
    /// served from once redirects are followed.
    ///
    /// The location is cached next to the document under `<key>-location`.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`PluginError::UpdateCenterInfoRetrieval`].
    pub async fn fetch_located<T: DeserializeOwned>(
        &self,
        url: &str,
        key: &str,
    ) -> Result<(T, String), PluginError> {
        let retrieval = |reason: String| PluginError::UpdateCenterInfoRetrieval {
            url: url.to_string(),
            reason,
        };
        let location_key = format!("{key}-location");

        if let Some(cached) = self.cache.get(key)
            && let Some(location) = self
                .cache
                .get(&location_key)
                .and_then(|l| serde_json::from_str::<String>(&l).ok())
        {
            match serde_json::from_str(&cached) {
                Ok(doc) => return Ok((doc, location)),
                Err(e) => debug!(key, error = %e, "Discarding unparsable cache entry"),
            }
        }

        info!(url, "Fetching metadata");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| retrieval(e.to_string()))?;
        let location = response.url().to_string();
        if location != url {
            debug!(url, %location, "Followed redirect");
        }
        let body = response.text().await.map_err(|e| retrieval(e.to_string()))?;

        let json = strip_jsonp(&body);
        let doc = serde_json::from_str(json).map_err(|e| retrieval(e.to_string()))?;
        let located = serde_json::Value::String(location.clone()).to_string();
        for (k, payload) in [(key, json), (location_key.as_str(), located.as_str())] {
            if let Err(e) = self.cache.put(k, payload) {
                warn!(key = k, error = %e, "Unable to cache metadata");
            }
        }
        Ok((doc, location))
    }

    /// Fetch all three documents concurrently.
    ///
    /// `update_center_url` is the primary document to request, usually
    /// [`MetadataUrls::versioned_update_center`]; `host_version` keys its
    /// cache entry.
    ///
    /// # Errors
    ///
    /// Fails if any document cannot be fetched or parsed.
    pub async fn fetch_index(
        &self,
        update_center_url: &str,
        urls: &MetadataUrls,
        host_version: Option<&str>,
    ) -> Result<MetadataIndex, PluginError> {
        let uc_key = match host_version {
            Some(v) => format!("update-center-{v}"),
            None => "update-center".to_string(),
        };

        let ((update_center, update_center_location), experimental, plugin_versions) = tokio::try_join!(
            self.fetch_located::<UpdateCenter>(update_center_url, &uc_key),
            self.fetch::<UpdateCenter>(&urls.experimental, "experimental-update-center"),
            self.fetch::<PluginVersions>(&urls.plugin_versions, "plugin-versions"),
        )?;

        debug!(
            plugins = update_center.plugins.len(),
            experimental = experimental.plugins.len(),
            location = %update_center_location,
            "Metadata loaded"
        );

        Ok(MetadataIndex {
            update_center,
            update_center_location,
            experimental,
            plugin_versions,
        })
    }
}

/// What the metadata says about one specific release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Published checksum.
    pub sha256: Option<Sha256Checksum>,
    /// Minimum host version.
    pub required_core: Option<String>,
    /// Declared dependencies.
    pub dependencies: Vec<DependencySpec>,
}

/// The three documents of one run.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    /// Primary update center (possibly version-specific).
    pub update_center: UpdateCenter,
    /// URL the primary document was served from, after redirects.
    pub update_center_location: String,
    /// Experimental update center.
    pub experimental: UpdateCenter,
    /// Every published release.
    pub plugin_versions: PluginVersions,
}

impl MetadataIndex {
    /// Directory of the update center that served the primary document.
    ///
    /// A versioned request is redirected to a host-specific update center,
    /// whose `latest/` artifacts match the versions it lists.
    pub fn update_center_base(&self) -> &str {
        parent_url(&self.update_center_location)
    }

    /// Newest version in the primary update center.
    pub fn latest_version(&self, name: &str) -> Option<&str> {
        self.update_center.latest_version(name)
    }

    /// Newest version in the experimental update center.
    pub fn experimental_version(&self, name: &str) -> Option<&str> {
        self.experimental.latest_version(name)
    }

    /// Release info for `name` at `version`.
    ///
    /// `from_experimental` selects which update center describes a floating
    /// release. For a fixed version `plugin-versions.json` is consulted
    /// first, then either update center if its newest release is that version.
    pub fn release(&self, name: &str, version: &str, from_experimental: bool) -> Option<ReleaseInfo> {
        let primary = if from_experimental {
            &self.experimental
        } else {
            &self.update_center
        };
        let from_uc = |uc: &UpdateCenter| {
            uc.plugin(name).filter(|p| p.version == version).map(|p| ReleaseInfo {
                sha256: p.sha256.clone(),
                required_core: p.required_core.clone(),
                dependencies: p.dependencies.clone(),
            })
        };

        from_uc(primary)
            .or_else(|| {
                self.plugin_versions.get(name, version).map(|p| ReleaseInfo {
                    sha256: p.sha256.clone(),
                    required_core: p.required_core.clone(),
                    dependencies: p.dependencies.clone(),
                })
            })
            .or_else(|| from_uc(&self.update_center))
            .or_else(|| from_uc(&self.experimental))
    }

    /// Security warnings that apply to `version` of `name`.
    pub fn warnings_for<'a>(&'a self, name: &'a str, version: &'a str) -> Vec<&'a SecurityWarning> {
        self.update_center.warnings_for(name, version).collect()
    }

    /// Newest candidate across both update centers.
    ///
    /// The experimental update center is only consulted when
    /// `include_experimental` is set.
    pub fn newest_version(&self, name: &str, include_experimental: bool) -> Option<&str> {
        let primary = self.latest_version(name);
        let experimental = include_experimental
            .then(|| self.experimental_version(name))
            .flatten();
        match (primary, experimental) {
            (Some(p), Some(e)) if version::compare(e, p).is_gt() => Some(e),
            (Some(p), _) => Some(p),
            (None, e) => e,
        }
    }
}
