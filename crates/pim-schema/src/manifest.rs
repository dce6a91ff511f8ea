//! `META-INF/MANIFEST.MF` parsing.
//!
//! Only the main section is read. Lines longer than 72 bytes are wrapped by
//! the JAR tooling with a single leading space on each continuation line.

use std::collections::BTreeMap;

use thiserror::Error;

/// Path of the manifest inside a plugin or host archive.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Errors raised while reading a manifest.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ManifestError {
    /// A line was neither `Key: value` nor a continuation.
    #[error("Malformed manifest line {line}: '{content}'")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        content: String,
    },

    /// A required attribute was absent.
    #[error("Manifest has no '{0}' attribute")]
    MissingAttribute(&'static str),
}

/// A dependency declared in `Plugin-Dependencies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    /// Dependency short name.
    pub name: String,
    /// Minimum version.
    pub version: String,
    /// `resolution:=optional` was set.
    pub optional: bool,
}

/// Main-section attributes of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] for a line without a `:` separator.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut attributes = BTreeMap::new();
        let mut current: Option<(String, String)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            if let Some(cont) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(cont);
                    continue;
                }
                return Err(ManifestError::Malformed {
                    line: idx + 1,
                    content: line.to_string(),
                });
            }

            if let Some((k, v)) = current.take() {
                attributes.insert(k, v);
            }

            if line.is_empty() {
                if attributes.is_empty() {
                    continue;
                }
                break;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| ManifestError::Malformed {
                line: idx + 1,
                content: line.to_string(),
            })?;
            current = Some((key.trim().to_string(), value.trim_start().to_string()));
        }

        if let Some((k, v)) = current {
            attributes.insert(k, v);
        }

        Ok(Self { attributes })
    }

    /// Raw attribute lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// `Plugin-Version`.
    pub fn plugin_version(&self) -> Option<&str> {
        self.get("Plugin-Version")
    }

    /// `Short-Name`.
    pub fn short_name(&self) -> Option<&str> {
        self.get("Short-Name")
    }

    /// Host version declared by a host archive, or the host version a plugin
    /// was built against.
    pub fn jenkins_version(&self) -> Option<&str> {
        self.get("Jenkins-Version")
            .or_else(|| self.get("Implementation-Version"))
    }

    /// Parse `Plugin-Dependencies` (`name:version[;resolution:=optional]`, comma separated).
    pub fn plugin_dependencies(&self) -> Vec<ManifestDependency> {
        let Some(raw) = self.get("Plugin-Dependencies") else {
            return Vec::new();
        };

        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let coord = parts.next()?;
                let (name, version) = coord.split_once(':')?;
                let optional = parts.any(|p| p.trim() == "resolution:=optional");
                Some(ManifestDependency {
                    name: name.trim().to_string(),
                    version: version.trim().to_string(),
                    optional,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MF: &str = "Manifest-Version: 1.0\r\n\
Short-Name: workflow-job\r\n\
Plugin-Version: 2.40\r\n\
Jenkins-Version: 2.222.4\r\n\
Plugin-Dependencies: workflow-api:2.40,workflow-step-api:2.23,trilead-api:1.0.\r\n \
4;resolution:=optional\r\n\
\r\n\
Name: ignored/section\r\n\
Plugin-Version: 9.9\r\n";

    #[test]
    fn test_parse_main_section() {
        let m = Manifest::parse(MF).unwrap();
        assert_eq!(m.short_name(), Some("workflow-job"));
        assert_eq!(m.plugin_version(), Some("2.40"));
        assert_eq!(m.jenkins_version(), Some("2.222.4"));
    }

    #[test]
    fn test_continuation_lines_and_dependencies() {
        let m = Manifest::parse(MF).unwrap();
        let deps = m.plugin_dependencies();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "workflow-api");
        assert_eq!(deps[0].version, "2.40");
        assert!(!deps[0].optional);
        assert_eq!(deps[2].name, "trilead-api");
        assert_eq!(deps[2].version, "1.0.4");
        assert!(deps[2].optional);
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(
            Manifest::parse("Manifest-Version 1.0\n"),
            Err(ManifestError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_no_dependencies() {
        let m = Manifest::parse("Plugin-Version: 1.0\n").unwrap();
        assert!(m.plugin_dependencies().is_empty());
    }
}
