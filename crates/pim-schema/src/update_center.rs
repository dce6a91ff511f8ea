//! Wire types for update-center documents.
//!
//! Two documents are consumed:
//!
//! - `update-center.json`: newest release of every plugin, plus security warnings.
//! - `plugin-versions.json`: every published release of every plugin.
//!
//! Both may be served wrapped in a JSONP call (`updateCenter.post( … );`),
//! which [`strip_jsonp`] removes before parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::Sha256Checksum;

/// A dependency edge as published by an update center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Dependency short name.
    pub name: String,
    /// Minimum required version.
    pub version: String,
    /// Whether the edge may be dropped when unsatisfied.
    #[serde(default)]
    pub optional: bool,
}

/// Metadata of the newest release of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCenterPlugin {
    /// Plugin short name.
    pub name: String,
    /// Newest published version.
    pub version: String,
    /// Download URL of that version.
    #[serde(default)]
    pub url: String,
    /// Base64 SHA-256 of the archive.
    #[serde(default)]
    pub sha256: Option<Sha256Checksum>,
    /// Minimum host version this release runs on.
    #[serde(default, rename = "requiredCore")]
    pub required_core: Option<String>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

/// Host release info carried at the top of `update-center.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreInfo {
    /// Newest host version.
    pub version: String,
    /// Download URL of that version.
    #[serde(default)]
    pub url: String,
}

/// One version pattern a security warning applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningVersion {
    /// Regular expression matched against the whole version string.
    pub pattern: String,
}

/// A published security warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityWarning {
    /// Advisory identifier, e.g. `SECURITY-1234`.
    pub id: String,
    /// Name of the affected component.
    pub name: String,
    /// Component type (`plugin` or `core`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable summary.
    #[serde(default)]
    pub message: String,
    /// Advisory URL.
    #[serde(default)]
    pub url: String,
    /// Affected version patterns.
    #[serde(default)]
    pub versions: Vec<WarningVersion>,
}

impl SecurityWarning {
    /// Returns `true` if this warning concerns `version` of plugin `name`.
    ///
    /// Patterns that fail to compile are treated as non-matching.
    pub fn applies_to(&self, name: &str, version: &str) -> bool {
        if self.kind != "plugin" || self.name != name {
            return false;
        }
        self.versions.iter().any(|v| {
            regex::Regex::new(&format!("^(?:{})$", v.pattern)).is_ok_and(|re| re.is_match(version))
        })
    }
}

/// Parsed `update-center.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCenter {
    /// Host release info.
    #[serde(default)]
    pub core: Option<CoreInfo>,
    /// Newest release of each plugin keyed by name.
    #[serde(default)]
    pub plugins: BTreeMap<String, UpdateCenterPlugin>,
    /// Published security warnings.
    #[serde(default)]
    pub warnings: Vec<SecurityWarning>,
}

impl UpdateCenter {
    /// Look up a plugin.
    pub fn plugin(&self, name: &str) -> Option<&UpdateCenterPlugin> {
        self.plugins.get(name)
    }

    /// Newest version of a plugin, if listed.
    pub fn latest_version(&self, name: &str) -> Option<&str> {
        self.plugins.get(name).map(|p| p.version.as_str())
    }

    /// All warnings that apply to `version` of `name`.
    pub fn warnings_for<'a>(
        &'a self,
        name: &'a str,
        version: &'a str,
    ) -> impl Iterator<Item = &'a SecurityWarning> + 'a {
        self.warnings
            .iter()
            .filter(move |w| w.applies_to(name, version))
    }
}

/// Metadata of one specific release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginVersionInfo {
    /// Release version.
    pub version: String,
    /// Download URL.
    #[serde(default)]
    pub url: String,
    /// Base64 SHA-256 of the archive.
    #[serde(default)]
    pub sha256: Option<Sha256Checksum>,
    /// Minimum host version.
    #[serde(default, rename = "requiredCore")]
    pub required_core: Option<String>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

/// Parsed `plugin-versions.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginVersions {
    /// Plugin name -> version -> release metadata.
    #[serde(default)]
    pub plugins: BTreeMap<String, BTreeMap<String, PluginVersionInfo>>,
}

impl PluginVersions {
    /// Look up one release of a plugin.
    pub fn get(&self, name: &str, version: &str) -> Option<&PluginVersionInfo> {
        self.plugins.get(name).and_then(|v| v.get(version))
    }
}

/// Remove a JSONP wrapper (`ident( … );`) if present.
///
/// ```
/// use pim_schema::update_center::strip_jsonp;
///
/// assert_eq!(strip_jsonp("updateCenter.post(\n{\"a\":1}\n);"), "{\"a\":1}");
/// assert_eq!(strip_jsonp("{\"a\":1}"), "{\"a\":1}");
/// ```
pub fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].trim(),
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UC: &str = r#"updateCenter.post(
{
  "core": {"version": "2.440", "url": "https://example.com/jenkins.war"},
  "plugins": {
    "git": {
      "name": "git",
      "version": "5.2.1",
      "url": "https://example.com/git.hpi",
      "sha256": "abc=",
      "requiredCore": "2.387.3",
      "dependencies": [
        {"name": "git-client", "version": "4.6.0", "optional": false},
        {"name": "credentials", "version": "1.0"},
        {"name": "token-macro", "version": "2.0", "optional": true}
      ]
    }
  },
  "warnings": [
    {"id": "SECURITY-1", "name": "git", "type": "plugin", "message": "bad", "url": "https://example.com/adv",
     "versions": [{"pattern": "5[.]1(|[.-].*)"}]}
  ]
}
);"#;

    #[test]
    fn test_parse_wrapped_update_center() {
        let uc: UpdateCenter = serde_json::from_str(strip_jsonp(UC)).unwrap();
        let git = uc.plugin("git").unwrap();
        assert_eq!(git.version, "5.2.1");
        assert_eq!(git.required_core.as_deref(), Some("2.387.3"));
        assert_eq!(git.dependencies.len(), 3);
        assert!(!git.dependencies[1].optional);
        assert!(git.dependencies[2].optional);
        assert_eq!(uc.core.unwrap().version, "2.440");
    }

    #[test]
    fn test_security_warning_patterns() {
        let uc: UpdateCenter = serde_json::from_str(strip_jsonp(UC)).unwrap();
        assert_eq!(uc.warnings_for("git", "5.1").count(), 1);
        assert_eq!(uc.warnings_for("git", "5.1.2").count(), 1);
        assert_eq!(uc.warnings_for("git", "5.2.1").count(), 0);
        assert_eq!(uc.warnings_for("other", "5.1").count(), 0);
    }

    #[test]
    fn test_parse_plugin_versions() {
        let body = r#"{"plugins": {"git": {"4.0.0": {"version": "4.0.0", "dependencies": [{"name": "scm-api", "version": "2.6.3"}]}}}}"#;
        let pv: PluginVersions = serde_json::from_str(body).unwrap();
        assert_eq!(pv.get("git", "4.0.0").unwrap().dependencies[0].name, "scm-api");
        assert!(pv.get("git", "9.9").is_none());
    }
}
