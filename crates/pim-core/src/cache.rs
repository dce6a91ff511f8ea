//! TTL-bounded on-disk cache for metadata documents.
//!
//! Layout: `<cache_dir>/<key>.json`, one whole document per key. Expiry is
//! judged from the file's modification time, so entries written by an
//! earlier invocation sharing the directory are honoured.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::PluginError;

/// Default time-to-live for cached documents.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Persistent on-disk cache of JSON documents keyed by logical name.
///
/// Reads never lock. Writes go through a temp file in the same directory
/// followed by a rename, so a concurrent reader sees either the old or the
/// new document and concurrent writers to one key resolve to last-write-wins.
#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
    created: AtomicBool,
}

impl Cache {
    /// Create a cache rooted at `dir` with the default TTL.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ttl(dir, DEFAULT_TTL)
    }

    /// Create a cache rooted at `dir` with a custom TTL.
    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            created: AtomicBool::new(false),
        }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Ensure the backing directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DirectoryCreation`] if the directory cannot be created.
    pub fn create(&self) -> Result<(), PluginError> {
        if self.created.load(Ordering::Acquire) {
            return Ok(());
        }
        let existed = self.dir.is_dir();
        std::fs::create_dir_all(&self.dir).map_err(|source| PluginError::DirectoryCreation {
            path: self.dir.clone(),
            source,
        })?;
        if !existed && !self.created.swap(true, Ordering::AcqRel) {
            info!(dir = %self.dir.display(), "Created cache directory");
        }
        self.created.store(true, Ordering::Release);
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Store `payload` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn put(&self, key: &str, payload: &str) -> Result<(), PluginError> {
        self.create()?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, payload.as_bytes())?;
        tmp.persist(self.entry_path(key)).map_err(|e| e.error)?;
        debug!(key, "Cached document");
        Ok(())
    }

    /// Fetch the payload for `key` if present and younger than the TTL.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        if self.is_expired(modified) {
            debug!(key, "Cache entry expired");
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(payload) => {
                debug!(key, "Cache hit");
                Some(payload)
            }
            Err(e) => {
                warn!(key, error = %e, "Unreadable cache entry");
                None
            }
        }
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        // A clock that went backwards makes the entry look fresh.
        SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age > self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_miss_when_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::new(tmp.path().join("cache"));
        assert_eq!(cache.get("update-center"), None);
    }

    #[test]
    fn test_create_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::new(tmp.path().join("a/b"));
        cache.create().unwrap();
        cache.create().unwrap();
        assert!(tmp.path().join("a/b").is_dir());
    }

    #[test]
    fn test_fresh_entry_returns_last_payload() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::new(tmp.path());
        cache.put("uc", r#"{"v":1}"#).unwrap();
        assert_eq!(cache.get("uc").as_deref(), Some(r#"{"v":1}"#));

        cache.put("uc", r#"{"v":2}"#).unwrap();
        assert_eq!(cache.get("uc").as_deref(), Some(r#"{"v":2}"#));
        assert!(tmp.path().join("uc.json").is_file());
    }

    #[test]
    fn test_stale_entry_is_a_miss_but_file_remains() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_ttl(tmp.path(), Duration::from_secs(60));
        cache.put("uc", "{}").unwrap();

        let path = tmp.path().join("uc.json");
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        assert_eq!(cache.get("uc"), None);
        assert!(path.exists());
    }

    #[test]
    fn test_entry_written_by_another_instance_is_visible() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("plugin-versions.json"), "{}").unwrap();
        let cache = Cache::new(tmp.path());
        assert_eq!(cache.get("plugin-versions").as_deref(), Some("{}"));
    }
}
