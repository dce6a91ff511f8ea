//! pim - plugin installation manager
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Resolves a list of requested plugins against the update center, works
//! out which transitive dependencies are already installed or bundled in
//! the host archive, and downloads and verifies the rest into the plugin
//! directory.
//!
//! # Plugin directory layout
//!
//! ```text
//! plugins/
//! ├── git.jpi            # installed artifact
//! ├── git.bak            # previous artifact, single backup slot
//! ├── .git.lock          # advisory lock held while swapping the two
//! └── failedplugins.txt  # names that failed on the last run
//! ```

pub mod config;
pub mod input;
pub mod ops;
pub mod ui;

pub use config::Config;
pub use ops::install::{InstallReport, install_plugins};
pub use ui::OutputFormat;

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pim")]
#[command(author, version, about = "pim - plugin installation manager")]
pub struct Cli {
    /// Directory plugins are installed into
    #[arg(
        long,
        short = 'd',
        env = "PLUGIN_DIR",
        default_value = "./plugins"
    )]
    pub plugin_download_directory: PathBuf,

    /// Host archive whose bundled plugins and version are taken into account
    #[arg(
        long,
        short = 'w',
        env = "JENKINS_WAR",
        default_value = "/usr/share/jenkins/jenkins.war"
    )]
    pub war: PathBuf,

    /// Plugins to install: name[:version[:url]]
    #[arg(long, short = 'p', num_args = 1..)]
    pub plugins: Vec<String>,

    /// File listing plugins to install (.txt or .yaml)
    #[arg(long, short = 'f')]
    pub plugin_file: Option<PathBuf>,

    /// Update center document
    #[arg(
        long,
        env = "JENKINS_UC",
        default_value = "https://updates.jenkins.io/update-center.json"
    )]
    pub jenkins_update_center: String,

    /// Experimental update center document
    #[arg(
        long,
        env = "JENKINS_UC_EXPERIMENTAL",
        default_value = "https://updates.jenkins.io/experimental/update-center.json"
    )]
    pub jenkins_experimental_update_center: String,

    /// Maven mirror serving incrementals builds
    #[arg(
        long,
        env = "JENKINS_INCREMENTALS_REPO_MIRROR",
        default_value = "https://repo.jenkins-ci.org/incrementals"
    )]
    pub jenkins_incrementals_repo_mirror: String,

    /// Document listing every published release of every plugin
    #[arg(
        long,
        env = "JENKINS_PLUGIN_INFO",
        default_value = "https://updates.jenkins.io/current/plugin-versions.json"
    )]
    pub jenkins_plugin_info: String,

    /// Host version, overriding the one read from the archive
    #[arg(long, env = "JENKINS_VERSION")]
    pub jenkins_version: Option<String>,

    /// Directory for cached metadata documents
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Float every plugin, dependencies included, to its newest release
    #[arg(long)]
    pub latest: bool,

    /// Float only the requested plugins to their newest release
    #[arg(long)]
    pub latest_specified: bool,

    /// Keep installing after a plugin fails
    #[arg(long)]
    pub skip_failed_plugins: bool,

    /// List security warnings for the resolved plugins
    #[arg(long)]
    pub view_security_warnings: bool,

    /// List requested plugins with a newer release available
    #[arg(long)]
    pub available_updates: bool,

    /// List the resolved plugin set
    #[arg(long, short = 'l')]
    pub list: bool,

    /// Format of listed results
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Resolve and report without downloading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Only print warnings and errors
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
