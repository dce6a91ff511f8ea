//! Well-known file locations and URL helpers.

use std::path::{Path, PathBuf};

/// Name of the side file listing plugins that failed to install.
pub const FAILED_PLUGINS_FILE: &str = "failedplugins.txt";

/// Returns the default metadata cache directory, or None if no cache or home
/// directory can be resolved.
pub fn try_default_cache_dir() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("PIM_CACHE_DIR") {
        return Some(PathBuf::from(val));
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .map(|c| c.join("pim"))
}

/// Side file with failed plugin names: `<plugin_dir>/failedplugins.txt`
pub fn failed_plugins_path(plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(FAILED_PLUGINS_FILE)
}

/// Advisory lock file for one plugin: `<plugin_dir>/.<name>.lock`
pub fn lock_path(plugin_dir: &Path, name: &str) -> PathBuf {
    plugin_dir.join(format!(".{name}.lock"))
}

/// Strip the last path segment of a URL (`…/update-center.json` -> `…`).
pub fn parent_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    match path.rfind('/') {
        Some(idx) if !path[..idx].ends_with('/') => &path[..idx],
        _ => path,
    }
}

/// Reduce a URL to `scheme://host[:port]`.
pub fn url_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    let rest = &url[scheme_end + 3..];
    match rest.find('/') {
        Some(idx) => &url[..scheme_end + 3 + idx],
        None => url,
    }
}

/// Join URL segments with exactly one `/` between each.
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for seg in segments {
        let seg = seg.trim_matches('/');
        if seg.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(seg);
    }
    out
}
