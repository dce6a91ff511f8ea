//! Install pipeline.
//!
//! One run goes through fixed phases: prepare directories, snapshot the
//! inventory, load metadata, resolve, then download what is missing with a
//! bounded worker pool. Resolution finishes before the first download
//! starts, and every install is individually atomic, so an aborted run
//! never leaves a half-written artifact behind.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use pim_core::inventory::Inventory;
use pim_core::io::archive::HostArchive;
use pim_core::io::artifacts::ArtifactManifestSource;
use pim_core::io::install::PluginInstaller;
use pim_core::metadata::MetadataClient;
use pim_core::resolver::{self, AvailableUpdate, PluginWarning, Resolution, Resolver};
use pim_core::{Plugin, PluginError, PluginState, Reporter, failed_plugins_path};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::ops::{Context, InstallError};
use crate::ui::Tabular;

/// One plugin of the resolved set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    pub name: String,
    pub version: String,
    pub state: PluginState,
}

impl Tabular for PluginListing {
    const KEY: &'static str = "plugins";
    const HEADERS: &'static [&'static str] = &["Plugin", "Version", "State"];

    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), self.version.clone(), self.state.to_string()]
    }

    fn text(&self) -> String {
        format!("{} {}", self.name, self.version)
    }
}

/// A plugin that could not be installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    pub name: String,
    pub version: String,
    pub reason: String,
}

impl Tabular for FailedPlugin {
    const KEY: &'static str = "failedPlugins";
    const HEADERS: &'static [&'static str] = &["Plugin", "Version", "Reason"];

    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), self.version.clone(), self.reason.clone()]
    }
}

/// Outcome of [`install_plugins`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    /// Every plugin of the resolved set with its final state.
    pub resolved: Vec<PluginListing>,
    /// Names already present at the resolved version or newer.
    pub satisfied: Vec<String>,
    /// Names installed by this run, after any rename.
    pub installed: Vec<String>,
    pub failed: Vec<FailedPlugin>,
    /// Names never attempted because an earlier install failed.
    pub skipped: Vec<String>,
    pub security_warnings: Vec<PluginWarning>,
    pub available_updates: Vec<AvailableUpdate>,
}

impl InstallReport {
    /// Returns `true` if nothing failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn set_state(&mut self, name: &str, state: PluginState) {
        if let Some(entry) = self.resolved.iter_mut().find(|p| p.name == name) {
            entry.state = state;
        }
    }
}

enum Outcome {
    Installed(String),
    Failed(String),
    Skipped,
}

/// Resolve `requested` and install everything not already present.
///
/// # Errors
///
/// Fails without installing anything when the plugin directory cannot be
/// created, metadata cannot be fetched, resolution finds conflicts or a
/// plugin needs a newer host. Individual download failures are reported in
/// the returned [`InstallReport`] instead.
pub async fn install_plugins(
    ctx: &Context,
    requested: Vec<Plugin>,
) -> Result<InstallReport, InstallError> {
    let config = &ctx.config;
    let start = Instant::now();
    let mut report = InstallReport::default();

    std::fs::create_dir_all(&config.plugin_dir).map_err(|source| {
        PluginError::DirectoryCreation {
            path: config.plugin_dir.clone(),
            source,
        }
    })?;
    ctx.cache.create()?;

    if requested.is_empty() {
        ctx.reporter.info("No plugins requested");
        return Ok(report);
    }

    let inventory = scan_inventory(ctx).await?;

    ctx.reporter.section("Resolving");
    info!(url = %ctx.update_center_url, "Loading update center metadata");
    let index = MetadataClient::new(ctx.client.clone(), Arc::clone(&ctx.cache))
        .fetch_index(
            &ctx.update_center_url,
            &config.urls,
            ctx.host_version.as_deref(),
        )
        .await?;

    if config.show_available_updates {
        report.available_updates = resolver::available_updates(&index, &requested);
    }

    let policy = ctx.url_policy(&index);
    debug!(latest_base = ?policy.latest_base, "Download policy ready");
    let manifests =
        ArtifactManifestSource::new(ctx.client.clone(), policy.clone(), &config.plugin_dir);
    let resolution = Resolver::new(
        &index,
        &inventory,
        &manifests,
        &*ctx.reporter,
        config.resolver,
    )
    .resolve(requested)
    .await?;
    resolver::check_core_compatibility(&resolution, inventory.host_version())?;

    for resolved in resolution.plugins.values() {
        let version = resolved.plugin.version_string();
        ctx.reporter
            .state(resolved.plugin.name(), &version, resolved.state);
        report.resolved.push(PluginListing {
            name: resolved.plugin.name().to_string(),
            version,
            state: resolved.state,
        });
    }
    report.satisfied = resolution
        .satisfied()
        .map(|r| r.plugin.name().to_string())
        .collect();

    if config.show_warnings {
        report.security_warnings = resolution.security_warnings(&index);
        for w in &report.security_warnings {
            ctx.reporter
                .warning(&format!("{} {} is affected by {}: {}", w.name, w.version, w.id, w.message));
        }
    }

    let pending: Vec<Plugin> = resolution.to_install().map(|r| r.plugin.clone()).collect();
    debug!(
        resolved = report.resolved.len(),
        satisfied = report.satisfied.len(),
        pending = pending.len(),
        "Resolution complete"
    );

    if config.dry_run {
        for plugin in &pending {
            ctx.reporter
                .done(plugin.name(), &plugin.version_string(), "would install");
        }
        return Ok(report);
    }
    if pending.is_empty() {
        ctx.reporter.info("All plugins are already installed");
        return Ok(report);
    }

    ctx.reporter.section("Downloading");
    let installer = PluginInstaller::new(
        ctx.client.clone(),
        policy,
        &config.plugin_dir,
        Arc::clone(&ctx.reporter),
    );
    let installed_as = download_all(ctx, &installer, pending, &mut report).await;
    fail_dependents(ctx, &resolution, &installed_as, &mut report);

    if !report.failed.is_empty() {
        write_failed_plugins(&config.plugin_dir, &report.failed)?;
    }
    ctx.reporter.summary(
        report.installed.len(),
        "installed",
        start.elapsed().as_secs_f64(),
    );
    Ok(report)
}

async fn scan_inventory(ctx: &Context) -> Result<Inventory, InstallError> {
    let plugin_dir = ctx.config.plugin_dir.clone();
    let host = ctx.host.clone();
    let mut inventory = tokio::task::spawn_blocking(move || {
        Inventory::scan(&plugin_dir, host.as_ref().map(|h| h as &dyn HostArchive))
    })
    .await
    .map_err(|e| InstallError::context("Inventory scan", e))??;

    inventory.set_host_version(ctx.host_version.clone());
    info!(
        installed = inventory.installed().len(),
        bundled = inventory.bundled().len(),
        host = inventory.host_version().unwrap_or("unknown"),
        "Inventory ready"
    );
    Ok(inventory)
}

/// Returns the file stem each installed plugin ended up under, keyed by
/// its resolved name.
async fn download_all(
    ctx: &Context,
    installer: &PluginInstaller,
    pending: Vec<Plugin>,
    report: &mut InstallReport,
) -> HashMap<String, String> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.workers.max(1)));
    let abort = Arc::new(AtomicBool::new(false));
    let skip_failed = ctx.config.skip_failed;

    let mut set = JoinSet::new();
    let mut tasks = HashMap::new();
    let mut installed_as = HashMap::new();

    for plugin in pending {
        let semaphore = Arc::clone(&semaphore);
        let abort = Arc::clone(&abort);
        let installer = installer.clone();
        let key = (plugin.name().clone(), plugin.version_string());

        let handle = set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Outcome::Skipped;
            };
            if abort.load(Ordering::Acquire) {
                return Outcome::Skipped;
            }
            match installer.install(plugin).await {
                Ok(installed) => Outcome::Installed(installed.plugin.name().to_string()),
                Err(e) => {
                    if !skip_failed {
                        abort.store(true, Ordering::Release);
                    }
                    Outcome::Failed(e.to_string())
                }
            }
        });
        tasks.insert(handle.id(), key);
    }

    while let Some(joined) = set.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(e) => {
                let reason = format!("Internal error: {e}");
                if let Some((name, version)) = tasks.get(&e.id()) {
                    ctx.reporter.failed(name, version, &reason);
                }
                (e.id(), Outcome::Failed(reason))
            }
        };
        let Some((name, version)) = tasks.remove(&id) else {
            continue;
        };

        match outcome {
            Outcome::Installed(stem) => {
                report.set_state(&name, PluginState::Installed);
                report.installed.push(stem.clone());
                installed_as.insert(name.to_string(), stem);
            }
            Outcome::Failed(reason) => {
                report.set_state(&name, PluginState::Failed);
                report.failed.push(FailedPlugin {
                    name: name.to_string(),
                    version,
                    reason,
                });
            }
            Outcome::Skipped => {
                ctx.reporter
                    .warning(&format!("Skipped {name} {version} after an earlier failure"));
                report.skipped.push(name.to_string());
            }
        }
    }

    report.installed.sort();
    report.failed.sort_by(|a, b| a.name.cmp(&b.name));
    report.skipped.sort();
    installed_as
}

/// Report plugins installed by this run as failed when a required
/// dependency failed, transitively.
///
/// The artifacts stay on disk; they are listed in `failedplugins.txt` with
/// the dependency that let them down.
fn fail_dependents(
    ctx: &Context,
    resolution: &Resolution,
    installed_as: &HashMap<String, String>,
    report: &mut InstallReport,
) {
    let mut failed: HashSet<String> = report.failed.iter().map(|f| f.name.clone()).collect();
    if failed.is_empty() {
        return;
    }

    loop {
        let mut newly_failed = Vec::new();
        for resolved in resolution.plugins.values() {
            let name = resolved.plugin.name().as_str();
            if failed.contains(name) || !installed_as.contains_key(name) {
                continue;
            }
            let broken = resolved
                .plugin
                .dependencies
                .iter()
                .filter(|d| !d.optional)
                .find(|d| failed.contains(d.name().as_str()));
            if let Some(dep) = broken {
                newly_failed.push((resolved, dep.name().to_string()));
            }
        }
        if newly_failed.is_empty() {
            break;
        }

        for (resolved, dep) in newly_failed {
            let name = resolved.plugin.name().to_string();
            let version = resolved.plugin.version_string();
            let reason = format!("Dependency {dep} failed to install");
            ctx.reporter
                .failed(resolved.plugin.name(), &version, &reason);
            report.set_state(&name, PluginState::Failed);
            if let Some(stem) = installed_as.get(&name) {
                report.installed.retain(|n| n != stem);
            }
            report.failed.push(FailedPlugin {
                name: name.clone(),
                version,
                reason,
            });
            failed.insert(name);
        }
    }
    report.failed.sort_by(|a, b| a.name.cmp(&b.name));
}

fn write_failed_plugins(plugin_dir: &Path, failed: &[FailedPlugin]) -> Result<(), InstallError> {
    let path = failed_plugins_path(plugin_dir);
    let body: String = failed.iter().map(|f| format!("{}\n", f.name)).collect();
    std::fs::write(&path, body)?;
    info!(path = %path.display(), count = failed.len(), "Recorded failed plugins");
    Ok(())
}
