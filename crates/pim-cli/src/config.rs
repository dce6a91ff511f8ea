//! Validated per-run settings.

use std::path::PathBuf;

use pim_core::Plugin;
use pim_core::metadata::MetadataUrls;
use pim_core::resolver::ResolverOptions;

use crate::Cli;
use crate::input::{self, InputError};
use crate::ui::OutputFormat;

/// Concurrent downloads.
pub const DEFAULT_WORKERS: usize = 4;

/// Immutable settings for one run, built from [`Cli`].
#[derive(Debug, Clone)]
pub struct Config {
    pub plugin_dir: PathBuf,
    /// Host archive, when the file exists.
    pub war: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub urls: MetadataUrls,
    pub incrementals_mirror: String,
    /// Overrides the version read from the host archive.
    pub host_version: Option<String>,
    pub plugins: Vec<Plugin>,
    pub resolver: ResolverOptions,
    pub skip_failed: bool,
    pub show_warnings: bool,
    pub show_available_updates: bool,
    pub show_plugins: bool,
    pub output: OutputFormat,
    pub dry_run: bool,
    pub quiet: bool,
    pub workers: usize,
}

fn default_cache_dir() -> PathBuf {
    pim_core::try_default_cache_dir().unwrap_or_else(|| std::env::temp_dir().join("pim-cache"))
}

impl Config {
    /// Settings with default URLs, for a plugin directory and a plugin list.
    pub fn new(plugin_dir: impl Into<PathBuf>, urls: MetadataUrls, plugins: Vec<Plugin>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            war: None,
            cache_dir: default_cache_dir(),
            urls,
            incrementals_mirror: "https://repo.jenkins-ci.org/incrementals".to_string(),
            host_version: None,
            plugins,
            resolver: ResolverOptions::default(),
            skip_failed: false,
            show_warnings: false,
            show_available_updates: false,
            show_plugins: false,
            output: OutputFormat::Text,
            dry_run: false,
            quiet: false,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Validate command-line input and read the plugin list.
    ///
    /// `--plugins` entries come before the file's entries. A host archive
    /// path that does not exist is dropped with a debug log.
    pub fn from_cli(cli: Cli) -> Result<Self, InputError> {
        let mut plugins = Vec::new();
        for (i, entry) in cli.plugins.iter().enumerate() {
            if let Some(plugin) = input::parse_plugin_line(entry, i + 1)? {
                plugins.push(plugin);
            }
        }
        if let Some(path) = &cli.plugin_file {
            plugins.extend(input::read_plugin_file(path)?);
        }

        let war = if cli.war.is_file() {
            Some(cli.war)
        } else {
            tracing::debug!(path = %cli.war.display(), "Host archive not found, ignoring");
            None
        };

        let urls = MetadataUrls {
            update_center: cli.jenkins_update_center,
            experimental: cli.jenkins_experimental_update_center,
            plugin_versions: cli.jenkins_plugin_info,
        };

        Ok(Self {
            plugin_dir: cli.plugin_download_directory,
            war,
            cache_dir: cli.cache_dir.unwrap_or_else(default_cache_dir),
            urls,
            incrementals_mirror: cli.jenkins_incrementals_repo_mirror,
            host_version: cli.jenkins_version.filter(|v| !v.trim().is_empty()),
            plugins,
            resolver: ResolverOptions {
                use_latest_specified: cli.latest_specified,
                use_latest_all: cli.latest,
            },
            skip_failed: cli.skip_failed_plugins,
            show_warnings: cli.view_security_warnings,
            show_available_updates: cli.available_updates,
            show_plugins: cli.list,
            output: cli.output,
            dry_run: cli.dry_run,
            quiet: cli.quiet,
            workers: DEFAULT_WORKERS,
        })
    }
}
