//! Plugin requests and the arena that records who required whom.
//!
//! A [`Plugin`] is created when a request is parsed or a dependency edge is
//! discovered. Its `parent` is a [`PluginId`] into a [`PluginRegistry`]
//! rather than a pointer, so provenance chains can be rebuilt for error
//! messages without any ownership between nodes.

use std::fmt;

use pim_schema::{PluginName, Sha256Checksum, VersionSpec};

/// Index of a plugin inside a [`PluginRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(usize);

impl PluginId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle of a plugin through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginState {
    /// Parsed from the request list, nothing looked up yet.
    Requested,
    /// Dependencies have been looked up.
    DependencyExpanded,
    /// Version fixed, must be fetched.
    VersionResolved,
    /// Already present in the plugin directory or host archive.
    Satisfied,
    /// Transfer in progress.
    Downloading,
    /// Downloaded bytes matched the expected checksum.
    ChecksumVerified,
    /// Moved into place.
    Installed,
    /// Download or install failed.
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::DependencyExpanded => "dependency-expanded",
            Self::VersionResolved => "version-resolved",
            Self::Satisfied => "satisfied",
            Self::Downloading => "downloading",
            Self::ChecksumVerified => "checksum-verified",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A requested or resolved plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    name: PluginName,
    /// Requested version, concrete once resolved.
    pub version: VersionSpec,
    /// Explicit source; bypasses URL derivation when set.
    pub url: Option<String>,
    /// Edge may be dropped if unsatisfiable.
    pub optional: bool,
    /// Expected archive checksum from the metadata source.
    pub checksum: Option<Sha256Checksum>,
    /// Minimum host version from the metadata source.
    pub required_core: Option<String>,
    /// Version floats to whatever the primary index reports.
    pub latest: bool,
    /// Version comes from the experimental index.
    pub experimental: bool,
    /// Child requirements, filled in during resolution.
    pub dependencies: Vec<Plugin>,
    /// Requiring plugin, for provenance only.
    pub parent: Option<PluginId>,
}

impl Plugin {
    /// Create a plugin request; `latest`/`experimental` are derived from `version`.
    pub fn new(name: impl Into<PluginName>, version: VersionSpec) -> Self {
        let latest = version.is_latest();
        let experimental = version.is_experimental();
        Self {
            name: name.into(),
            version,
            url: None,
            optional: false,
            checksum: None,
            required_core: None,
            latest,
            experimental,
            dependencies: Vec::new(),
            parent: None,
        }
    }

    /// Request the newest version.
    pub fn latest(name: impl Into<PluginName>) -> Self {
        Self::new(name, VersionSpec::Latest)
    }

    /// Request an exact version.
    pub fn exact(name: impl Into<PluginName>, version: &str) -> Self {
        Self::new(name, VersionSpec::Exact(version.to_string()))
    }

    /// Builder: set an explicit download URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builder: mark the edge optional.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Plugin short name.
    pub fn name(&self) -> &PluginName {
        &self.name
    }

    /// Rename the plugin; file names follow.
    pub fn rename(&mut self, name: impl Into<PluginName>) {
        self.name = name.into();
    }

    /// `<name>.jpi`
    pub fn archive_file_name(&self) -> String {
        self.name.archive_file_name()
    }

    /// `<name>.bak`
    pub fn backup_file_name(&self) -> String {
        self.name.backup_file_name()
    }

    /// Incrementals group coordinate.
    pub fn group_id(&self) -> Option<&str> {
        self.version.group_id()
    }

    /// Concrete version string; `latest`/`experimental` before resolution.
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Concrete version, if resolved.
    pub fn exact_version(&self) -> Option<&str> {
        self.version.exact()
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Arena of every plugin node created during a resolution.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    nodes: Vec<Plugin>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    pub fn insert(&mut self, plugin: Plugin) -> PluginId {
        self.nodes.push(plugin);
        PluginId(self.nodes.len() - 1)
    }

    /// Look up a node.
    pub fn get(&self, id: PluginId) -> &Plugin {
        &self.nodes[id.0]
    }

    /// Mutable node access.
    pub fn get_mut(&mut self, id: PluginId) -> &mut Plugin {
        &mut self.nodes[id.0]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no nodes were recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk `parent` links from `id` to its top-level ancestor.
    ///
    /// The returned chain is ordered top-level first.
    pub fn chain(&self, id: PluginId) -> Vec<&Plugin> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.get(cur);
            chain.push(node);
            // parent ids always point backwards, so this terminates
            current = node.parent.filter(|p| p.0 < cur.0);
        }
        chain.reverse();
        chain
    }

    /// Render a provenance chain as `a:1.0 -> b:2.0 -> c:3.0`.
    pub fn render_chain(&self, id: PluginId) -> String {
        self.chain(id)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
