//! Shared per-run context.
//!
//! Groups the settings, HTTP client, metadata cache, reporter and the facts
//! derived from the host archive, so that each phase of a run takes one
//! argument.

use std::fmt;
use std::sync::Arc;

use pim_core::cache::Cache;
use pim_core::inventory;
use pim_core::io::archive::ZipHostArchive;
use pim_core::io::download::UrlPolicy;
use pim_core::metadata::MetadataIndex;
use pim_core::{Reporter, USER_AGENT};
use reqwest::Client;

use crate::config::Config;
use crate::ops::InstallError;

/// Groups common state used during a run.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub client: Client,
    pub cache: Arc<Cache>,
    pub reporter: Arc<dyn Reporter>,
    /// Host archive, when one was found.
    pub host: Option<ZipHostArchive>,
    /// Configured override, else the version read from the host archive.
    pub host_version: Option<String>,
    /// Update-center document to request, pinned to the host version when
    /// known.
    pub update_center_url: String,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("host_version", &self.host_version)
            .field("update_center_url", &self.update_center_url)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build the context for one run.
    ///
    /// Opens the host archive named by the config, if any; an archive that
    /// exists but is not a readable zip is an error.
    pub fn new(config: Config, reporter: Arc<dyn Reporter>) -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .tcp_nodelay(true)
            .pool_max_idle_per_host(config.workers)
            .build()?;

        let host = match &config.war {
            Some(path) => Some(
                ZipHostArchive::open(path)
                    .map_err(|e| InstallError::context("Unable to open host archive", e))?,
            ),
            None => None,
        };
        let host_version = config
            .host_version
            .clone()
            .or_else(|| host.as_ref().and_then(|a| inventory::host_version(a)));
        let update_center_url = config.urls.versioned_update_center(host_version.as_deref());
        let cache = Arc::new(Cache::new(&config.cache_dir));

        Ok(Self {
            config: Arc::new(config),
            client,
            cache,
            reporter,
            host,
            host_version,
            update_center_url,
        })
    }

    /// Download URL derivation for this run.
    ///
    /// `latest/` downloads come from the update center that actually served
    /// `index`, and only when the host version is known.
    pub fn url_policy(&self, index: &MetadataIndex) -> UrlPolicy {
        let urls = &self.config.urls;
        UrlPolicy {
            latest_base: self
                .host_version
                .as_ref()
                .map(|_| index.update_center_base().to_string()),
            experimental_base: urls.experimental_base(),
            incrementals_mirror: self.config.incrementals_mirror.clone(),
            download_base: urls.download_base(),
        }
    }
}
