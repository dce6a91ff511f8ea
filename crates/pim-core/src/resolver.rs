//! Breadth-first dependency resolution.
//!
//! Top-level requests seed the walk. Each frontier's dependency lookups run
//! concurrently, then their results are admitted one by one against a single
//! resolved map, so conflict detection never races. A transitive requirement
//! newer than a top-level pin is a conflict; conflicts are collected and
//! reported together once the walk is complete. Between two unpinned
//! requirements the newer one wins and is expanded again.
//!
//! Each `(name, version)` is admitted at most once, which bounds the walk.
//! Conflicting edges are recorded and never expanded.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use futures::future::join_all;
use pim_schema::{DependencySpec, Manifest, ManifestDependency, PluginName, VersionSpec, version};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Reporter;
use crate::error::{DependencyConflict, PluginError};
use crate::inventory::Inventory;
use crate::metadata::MetadataIndex;
use crate::plugin::{Plugin, PluginId, PluginRegistry, PluginState};

/// Version floating policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Float explicitly requested plugins to the newest release.
    pub use_latest_specified: bool,
    /// Float every plugin, dependencies included, to the newest release.
    pub use_latest_all: bool,
}

impl ResolverOptions {
    fn float_top_level(self) -> bool {
        self.use_latest_specified || self.use_latest_all
    }

    // use_latest_specified wins when both are set
    fn float_transitive(self) -> bool {
        self.use_latest_all && !self.use_latest_specified
    }
}

/// Reads a plugin artifact's own manifest.
///
/// Consulted when neither metadata document describes the version being
/// resolved, or the plugin comes from an explicit URL.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Manifest of `plugin` at its resolved version.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be located or read.
    async fn manifest(&self, plugin: &Plugin) -> Result<Manifest, PluginError>;
}

/// A [`ManifestSource`] that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoManifests;

#[async_trait]
impl ManifestSource for NoManifests {
    async fn manifest(&self, plugin: &Plugin) -> Result<Manifest, PluginError> {
        Err(PluginError::NotFound {
            name: plugin.name().to_string(),
            detail: "no manifest source configured".to_string(),
        })
    }
}

/// One entry of a finished resolution.
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    /// Node in [`Resolution::registry`].
    pub id: PluginId,
    /// The plugin at its resolved version.
    pub plugin: Plugin,
    /// [`PluginState::Satisfied`] or [`PluginState::VersionResolved`].
    pub state: PluginState,
    /// Requested explicitly.
    pub top_level: bool,
    /// Version fixed by the request rather than floating.
    pub pinned: bool,
}

impl ResolvedPlugin {
    /// Returns `true` if nothing needs to be downloaded.
    pub fn is_satisfied(&self) -> bool {
        self.state == PluginState::Satisfied
    }
}

/// A plugin with a newer release available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableUpdate {
    /// Plugin name.
    pub name: String,
    /// Requested version.
    pub current: String,
    /// Newest release.
    pub latest: String,
}

/// A security warning affecting a resolved plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginWarning {
    /// Plugin name.
    pub name: String,
    /// Affected version.
    pub version: String,
    /// Advisory id.
    pub id: String,
    /// Advisory summary.
    pub message: String,
    /// Advisory URL.
    pub url: String,
}

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Every node created during the walk, for provenance.
    pub registry: PluginRegistry,
    /// The resolved set, one entry per name.
    pub plugins: BTreeMap<PluginName, ResolvedPlugin>,
    /// Optional dependencies nobody else required.
    pub skipped_optional: Vec<PluginName>,
}

impl Resolution {
    /// Look up a resolved plugin.
    pub fn get(&self, name: &str) -> Option<&ResolvedPlugin> {
        self.plugins.get(name)
    }

    /// Plugins already present.
    pub fn satisfied(&self) -> impl Iterator<Item = &ResolvedPlugin> {
        self.plugins.values().filter(|p| p.is_satisfied())
    }

    /// Plugins that must be downloaded.
    pub fn to_install(&self) -> impl Iterator<Item = &ResolvedPlugin> {
        self.plugins.values().filter(|p| !p.is_satisfied())
    }

    /// Security warnings for every resolved plugin.
    pub fn security_warnings(&self, index: &MetadataIndex) -> Vec<PluginWarning> {
        let mut out = Vec::new();
        for resolved in self.plugins.values() {
            let name = resolved.plugin.name().as_str();
            let Some(version) = resolved.plugin.exact_version() else {
                continue;
            };
            for w in index.warnings_for(name, version) {
                out.push(PluginWarning {
                    name: name.to_string(),
                    version: version.to_string(),
                    id: w.id.clone(),
                    message: w.message.clone(),
                    url: w.url.clone(),
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: PluginId,
    pinned: bool,
    top_level: bool,
    state: PluginState,
}

#[derive(Default)]
struct Walk {
    registry: PluginRegistry,
    resolved: BTreeMap<PluginName, Entry>,
    seen: HashSet<(PluginName, String)>,
    next: Vec<PluginId>,
    deferred: Vec<PluginId>,
    errors: Vec<PluginError>,
}

struct Lookup {
    /// Version read from the manifest of an unversioned URL plugin.
    version: Option<String>,
    dependencies: Vec<Plugin>,
}

fn from_spec(dep: &DependencySpec) -> Plugin {
    Plugin::exact(dep.name.as_str(), &dep.version).with_optional(dep.optional)
}

fn from_manifest(dep: &ManifestDependency) -> Plugin {
    Plugin::exact(dep.name.as_str(), &dep.version).with_optional(dep.optional)
}

/// Move `plugin` to the newest release if that is an upgrade.
///
/// Incrementals builds and explicit URLs never float. Experimental
/// candidates are considered only for plugins already on a pre-release or
/// requested as experimental. Returns `true` if the version changed.
fn float_version(index: &MetadataIndex, plugin: &mut Plugin) -> bool {
    if plugin.url.is_some() || plugin.version.is_incrementals() {
        return false;
    }
    let name = plugin.name().as_str();
    let include_experimental =
        plugin.experimental || plugin.exact_version().is_some_and(version::is_experimental);
    let Some(candidate) = index.newest_version(name, include_experimental) else {
        return false;
    };
    if let Some(current) = plugin.exact_version()
        && !version::should_replace(current, candidate)
    {
        return false;
    }

    let from_experimental = index.latest_version(name) != Some(candidate);
    plugin.version = VersionSpec::Exact(candidate.to_string());
    plugin.latest = !from_experimental;
    plugin.experimental = from_experimental;
    true
}

/// Replace each plugin's version with the newest published release.
///
/// A pre-release is only replaced by a strictly newer version. Plugins
/// missing from both update centers, incrementals builds and plugins with an
/// explicit URL pass through unchanged.
pub fn latest_versions_of(index: &MetadataIndex, plugins: &[Plugin]) -> Vec<Plugin> {
    plugins
        .iter()
        .cloned()
        .map(|mut p| {
            float_version(index, &mut p);
            p
        })
        .collect()
}

/// Requested plugins with a newer release available.
pub fn available_updates(index: &MetadataIndex, plugins: &[Plugin]) -> Vec<AvailableUpdate> {
    plugins
        .iter()
        .filter_map(|p| {
            let current = p.exact_version()?;
            let mut floated = p.clone();
            float_version(index, &mut floated).then(|| AvailableUpdate {
                name: p.name().to_string(),
                current: current.to_string(),
                latest: floated.version_string(),
            })
        })
        .collect()
}

/// Reject plugins that need a newer host than `host_version`.
///
/// Satisfied plugins are not checked.
///
/// # Errors
///
/// Returns [`PluginError::AggregatePrerequisitesNotMet`] listing every
/// [`PluginError::IncompatibleCore`].
pub fn check_core_compatibility(
    resolution: &Resolution,
    host_version: Option<&str>,
) -> Result<(), PluginError> {
    let Some(host) = host_version else {
        return Ok(());
    };
    let errors: Vec<PluginError> = resolution
        .to_install()
        .filter_map(|r| {
            let required = r.plugin.required_core.as_deref()?;
            version::compare(required, host)
                .is_gt()
                .then(|| PluginError::IncompatibleCore {
                    plugin: r.plugin.name().to_string(),
                    version: r.plugin.version_string(),
                    required: required.to_string(),
                    host: host.to_string(),
                })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PluginError::aggregate(errors))
    }
}

/// Dependency resolver for one run.
pub struct Resolver<'a> {
    index: &'a MetadataIndex,
    inventory: &'a Inventory,
    manifests: &'a dyn ManifestSource,
    reporter: &'a dyn Reporter,
    options: ResolverOptions,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// Create a resolver over one run's metadata and inventory.
    pub fn new(
        index: &'a MetadataIndex,
        inventory: &'a Inventory,
        manifests: &'a dyn ManifestSource,
        reporter: &'a dyn Reporter,
        options: ResolverOptions,
    ) -> Self {
        Self {
            index,
            inventory,
            manifests,
            reporter,
            options,
        }
    }

    /// Resolve `requested` and everything it transitively requires.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AggregatePrerequisitesNotMet`] wrapping every
    /// conflict found, even when there is only one.
    pub async fn resolve(&self, requested: Vec<Plugin>) -> Result<Resolution, PluginError> {
        let mut walk = Walk::default();

        for mut plugin in requested {
            self.reporter
                .state(plugin.name(), &plugin.version_string(), PluginState::Requested);
            if self.options.float_top_level() {
                float_version(self.index, &mut plugin);
            }
            self.concretize(&mut plugin);
            plugin.parent = None;
            let id = walk.registry.insert(plugin);
            self.admit(&mut walk, id, true);
        }

        loop {
            while !walk.next.is_empty() {
                let mut frontier = std::mem::take(&mut walk.next);
                // nodes replaced by a newer requirement are not expanded
                frontier.retain(|&id| {
                    walk.resolved
                        .get(walk.registry.get(id).name())
                        .is_some_and(|e| e.id == id)
                });
                debug!(size = frontier.len(), "Expanding frontier");
                let lookups: Vec<_> = frontier
                    .iter()
                    .map(|&id| {
                        let plugin = walk.registry.get(id).clone();
                        async move { (id, self.lookup(&plugin).await) }
                    })
                    .collect();
                for (id, lookup) in join_all(lookups).await {
                    self.expand(&mut walk, id, lookup);
                }
            }

            // optional edges count once their target is required elsewhere
            let deferred = std::mem::take(&mut walk.deferred);
            for id in deferred {
                if walk.resolved.contains_key(walk.registry.get(id).name()) {
                    self.admit(&mut walk, id, false);
                } else {
                    walk.deferred.push(id);
                }
            }
            if walk.next.is_empty() {
                break;
            }
        }

        if !walk.errors.is_empty() {
            return Err(PluginError::aggregate(walk.errors));
        }

        let mut skipped_optional: Vec<PluginName> = walk
            .deferred
            .iter()
            .map(|&id| walk.registry.get(id).name().clone())
            .filter(|name| !walk.resolved.contains_key(name))
            .collect();
        skipped_optional.sort();
        skipped_optional.dedup();

        let plugins = walk
            .resolved
            .iter()
            .map(|(name, entry)| {
                let plugin = walk.registry.get(entry.id).clone();
                self.reporter
                    .state(name, &plugin.version_string(), entry.state);
                (
                    name.clone(),
                    ResolvedPlugin {
                        id: entry.id,
                        plugin,
                        state: entry.state,
                        top_level: entry.top_level,
                        pinned: entry.pinned,
                    },
                )
            })
            .collect();

        info!(
            resolved = walk.resolved.len(),
            nodes = walk.registry.len(),
            "Resolution complete"
        );

        Ok(Resolution {
            registry: walk.registry,
            plugins,
            skipped_optional,
        })
    }

    /// Fix floating versions and attach checksum and host requirement.
    fn concretize(&self, plugin: &mut Plugin) {
        let name = plugin.name().clone();
        let concrete = match &plugin.version {
            VersionSpec::Latest => self.index.latest_version(&name),
            VersionSpec::Experimental => self
                .index
                .experimental_version(&name)
                .or_else(|| self.index.latest_version(&name)),
            _ => None,
        };
        if let Some(v) = concrete {
            plugin.version = VersionSpec::Exact(v.to_string());
        } else if plugin.exact_version().is_none() && plugin.url.is_none() {
            warn!(plugin = %name, "Not found in the update center");
            self.reporter
                .warning(&format!("Plugin {name} not found in the update center"));
        }

        let Some(v) = plugin.exact_version() else {
            return;
        };
        if let Some(release) = self.index.release(&name, v, plugin.experimental) {
            if plugin.url.is_none() {
                plugin.checksum = release.sha256;
            }
            plugin.required_core = release.required_core;
        }
    }

    async fn lookup(&self, plugin: &Plugin) -> Lookup {
        if plugin.url.is_none()
            && let Some(v) = plugin.exact_version()
            && let Some(release) = self.index.release(plugin.name(), v, plugin.experimental)
        {
            return Lookup {
                version: None,
                dependencies: release.dependencies.iter().map(from_spec).collect(),
            };
        }

        match self.manifests.manifest(plugin).await {
            Ok(manifest) => Lookup {
                version: manifest.plugin_version().map(str::to_string),
                dependencies: manifest
                    .plugin_dependencies()
                    .iter()
                    .map(from_manifest)
                    .collect(),
            },
            Err(e) => {
                warn!(plugin = %plugin, error = %e, "Unable to determine dependencies");
                self.reporter.warning(&format!(
                    "Unable to determine dependencies of {plugin}, assuming none"
                ));
                Lookup {
                    version: None,
                    dependencies: Vec::new(),
                }
            }
        }
    }

    fn expand(&self, walk: &mut Walk, id: PluginId, lookup: Lookup) {
        let node = walk.registry.get_mut(id);
        if node.exact_version().is_none()
            && let Some(v) = lookup.version
        {
            node.version = VersionSpec::Exact(v);
        }
        node.dependencies.clone_from(&lookup.dependencies);
        self.reporter.state(
            node.name(),
            &node.version_string(),
            PluginState::DependencyExpanded,
        );

        for mut dep in lookup.dependencies {
            dep.parent = Some(id);
            if self.options.float_transitive() {
                float_version(self.index, &mut dep);
            }
            self.concretize(&mut dep);
            let optional = dep.optional;
            let child = walk.registry.insert(dep);
            if optional {
                walk.deferred.push(child);
            } else {
                self.admit(walk, child, false);
            }
        }
    }

    fn admit(&self, walk: &mut Walk, id: PluginId, top_level: bool) {
        let node = walk.registry.get(id);
        let name = node.name().clone();

        let Some(version) = node.exact_version().map(str::to_string) else {
            // unversioned URL plugin; its manifest will tell
            if !walk.resolved.contains_key(&name) {
                walk.resolved.insert(
                    name,
                    Entry {
                        id,
                        pinned: true,
                        top_level,
                        state: PluginState::VersionResolved,
                    },
                );
                walk.next.push(id);
            }
            return;
        };

        // every requiring edge is checked against the pin, even for a
        // (name, version) already admitted through another parent
        if let Some(existing) = walk.resolved.get(&name).copied() {
            let Some(existing_version) = walk.registry.get(existing.id).exact_version() else {
                return;
            };
            if version::compare(&version, existing_version) != Ordering::Greater {
                debug!(plugin = %name, %version, kept = existing_version, "Lower requirement dropped");
                return;
            }
            if existing.pinned && !top_level {
                let conflict = self.conflict(walk, id, existing_version);
                if node.optional {
                    warn!(%conflict, "Optional dependency dropped");
                    self.reporter.warning(&conflict.to_string());
                } else {
                    walk.errors.push(conflict.into());
                }
                return;
            }
            debug!(plugin = %name, %version, replaced = existing_version, "Newer requirement wins");
        }

        if !walk.seen.insert((name.clone(), version.clone())) {
            return;
        }

        let pinned = top_level && !node.latest && !node.experimental;
        let state = self.inventory_state(walk, id, &version, top_level);
        walk.resolved.insert(
            name,
            Entry {
                id,
                pinned,
                top_level,
                state,
            },
        );
        walk.next.push(id);
    }

    /// Decide whether the inventory already satisfies a requirement.
    ///
    /// A top-level request is satisfied only by the exact version; a
    /// dependency by any equal or newer version, which it then adopts.
    fn inventory_state(
        &self,
        walk: &mut Walk,
        id: PluginId,
        required: &str,
        top_level: bool,
    ) -> PluginState {
        let name = walk.registry.get(id).name().clone();
        let Some((have, source)) = self.inventory.best_version(&name) else {
            return PluginState::VersionResolved;
        };

        match version::compare(have, required) {
            Ordering::Equal => PluginState::Satisfied,
            Ordering::Greater if !top_level => {
                debug!(plugin = %name, required, have, ?source, "Satisfied by newer version");
                let node = walk.registry.get_mut(id);
                node.version = VersionSpec::Exact(have.to_string());
                node.checksum = None;
                self.concretize(node);
                PluginState::Satisfied
            }
            Ordering::Greater => PluginState::VersionResolved,
            Ordering::Less => {
                info!(plugin = %name, have, required, "Upgrade required");
                PluginState::VersionResolved
            }
        }
    }

    fn conflict(&self, walk: &Walk, id: PluginId, pinned: &str) -> DependencyConflict {
        let node = walk.registry.get(id);
        let (plugin, plugin_version) = node
            .parent
            .map(|p| walk.registry.get(p))
            .map(|p| (p.name().to_string(), p.version_string()))
            .unwrap_or_default();
        DependencyConflict {
            plugin,
            plugin_version,
            dependency: node.name().to_string(),
            required: node.version_string(),
            pinned: pinned.to_string(),
            chain: walk.registry.render_chain(id),
        }
    }
}
