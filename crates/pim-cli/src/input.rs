//! Plugin list parsing.
//!
//! Two formats are accepted. The text format holds one
//! `name[:version[:url]]` per line with `#` comments; the YAML format holds
//! `plugins: [{artifactId, groupId?, source: {version?, url?}}]`.

use std::path::{Path, PathBuf};

use pim_core::Plugin;
use pim_schema::{VersionSpec, VersionSpecError};
use serde::Deserialize;
use thiserror::Error;

/// Problems reading a plugin list.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {source}")]
    Version {
        line: usize,
        #[source]
        source: VersionSpecError,
    },

    #[error("Invalid plugin YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const URL_SCHEMES: [&str; 3] = ["http://", "https://", "file:"];

fn looks_like_url(s: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| s.starts_with(scheme))
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parse one `name[:version[:url]]` entry. Blank and comment lines yield
/// `None`.
///
/// An empty version means `latest`. `name:<url>` is accepted as shorthand
/// for `name::<url>`.
pub fn parse_plugin_line(line: &str, line_no: usize) -> Result<Option<Plugin>, InputError> {
    let entry = strip_comment(line).trim();
    if entry.is_empty() {
        return Ok(None);
    }

    let (name, rest) = match entry.split_once(':') {
        Some((name, rest)) => (name.trim(), Some(rest.trim())),
        None => (entry, None),
    };
    if name.is_empty() {
        return Err(InputError::Syntax {
            line: line_no,
            message: format!("missing plugin name in '{entry}'"),
        });
    }

    let (version, url) = match rest {
        None => ("", None),
        Some(rest) if looks_like_url(rest) => ("", Some(rest)),
        Some(rest) => match rest.split_once(':') {
            Some((version, url)) => (version.trim(), Some(url.trim()).filter(|u| !u.is_empty())),
            None => (rest, None),
        },
    };

    let spec = if version.is_empty() {
        VersionSpec::Latest
    } else {
        VersionSpec::parse(version).map_err(|source| InputError::Version {
            line: line_no,
            source,
        })?
    };

    let mut plugin = Plugin::new(name, spec);
    if let Some(url) = url {
        plugin = plugin.with_url(url);
    }
    Ok(Some(plugin))
}

/// Parse a whole text plugin list.
pub fn parse_plugin_text(text: &str) -> Result<Vec<Plugin>, InputError> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(plugin) = parse_plugin_line(line, idx + 1)? {
            out.push(plugin);
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct PluginList {
    #[serde(default)]
    plugins: Vec<YamlPlugin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlPlugin {
    artifact_id: String,
    group_id: Option<String>,
    #[serde(default)]
    source: YamlSource,
}

#[derive(Debug, Default, Deserialize)]
struct YamlSource {
    version: Option<String>,
    url: Option<String>,
}

impl YamlPlugin {
    fn into_plugin(self, index: usize) -> Result<Plugin, InputError> {
        let version = self.source.version.as_deref().map(str::trim).unwrap_or("");
        let spec = match (self.group_id, version) {
            (_, "") => VersionSpec::Latest,
            (Some(group_id), v) if !v.eq_ignore_ascii_case("latest") => VersionSpec::Incrementals {
                group_id,
                version: v.to_string(),
            },
            (_, v) => VersionSpec::parse(v).map_err(|source| InputError::Version {
                line: index + 1,
                source,
            })?,
        };

        let mut plugin = Plugin::new(self.artifact_id.trim(), spec);
        if let Some(url) = self.source.url {
            plugin = plugin.with_url(url);
        }
        Ok(plugin)
    }
}

/// Parse a YAML plugin list.
///
/// A `groupId` together with a version selects an incrementals build.
/// Errors report the entry's position in the list as its line.
pub fn parse_plugin_yaml(text: &str) -> Result<Vec<Plugin>, InputError> {
    let list: PluginList = serde_yaml::from_str(text)?;
    list.plugins
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            if p.artifact_id.trim().is_empty() {
                return Err(InputError::Syntax {
                    line: i + 1,
                    message: "missing artifactId".to_string(),
                });
            }
            p.into_plugin(i)
        })
        .collect()
}

/// Read a plugin list, choosing the format by extension.
pub fn read_plugin_file(path: &Path) -> Result<Vec<Plugin>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => parse_plugin_yaml(&text),
        _ => parse_plugin_text(&text),
    }
}
