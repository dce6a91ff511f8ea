//! Name newtypes.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// A plugin short name (the artifact id, e.g. `workflow-aggregator`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginName(String);

impl PluginName {
    /// Create a new plugin name; surrounding whitespace is trimmed.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_string())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Archive file name used in the plugin directory (`<name>.jpi`).
    pub fn archive_file_name(&self) -> String {
        format!("{}.jpi", self.0)
    }

    /// Backup file name for the single backup slot (`<name>.bak`).
    pub fn backup_file_name(&self) -> String {
        format!("{}.bak", self.0)
    }
}

impl std::fmt::Display for PluginName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PluginName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PluginName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PluginName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PluginName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PluginName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for PluginName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PluginName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_follow_name() {
        let name = PluginName::new(" git ");
        assert_eq!(name, "git");
        assert_eq!(name.archive_file_name(), "git.jpi");
        assert_eq!(name.backup_file_name(), "git.bak");
    }
}
