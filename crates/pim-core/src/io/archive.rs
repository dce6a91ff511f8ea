//! Host archive access.
//!
//! The host `.war` is only ever read through [`HostArchive`], which exposes
//! the three operations inventory scanning needs. [`ZipHostArchive`] reads a
//! real archive on disk; [`MemoryHostArchive`] holds entries in memory.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pim_schema::{MANIFEST_PATH, Manifest};
use tempfile::NamedTempFile;

use crate::error::PluginError;

/// Read-only view of a zip-structured host archive.
pub trait HostArchive: Send + Sync {
    /// All entry names, in archive order.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    fn list_entries(&self) -> Result<Vec<String>, PluginError>;

    /// Full contents of one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing or unreadable.
    fn open_entry(&self, name: &str) -> Result<Vec<u8>, PluginError>;

    /// Copy one entry to a temporary file that is deleted on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read or the file written.
    fn extract_to_temp(&self, name: &str) -> Result<NamedTempFile, PluginError> {
        let bytes = self.open_entry(name)?;
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        Ok(tmp)
    }

    /// Manifest of the archive itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or malformed.
    fn manifest(&self) -> Result<Manifest, PluginError> {
        let bytes = self.open_entry(MANIFEST_PATH)?;
        parse_manifest(Path::new(MANIFEST_PATH), &bytes)
    }
}

/// A host archive on disk.
///
/// The central directory is read once at [`open`](Self::open); clones share
/// the same handle.
#[derive(Debug, Clone)]
pub struct ZipHostArchive {
    path: PathBuf,
    archive: Arc<Mutex<zip::ZipArchive<std::fs::File>>>,
}

impl ZipHostArchive {
    /// Open `path`, failing early if it is not a readable zip.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not a zip archive.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PluginError> {
        let path = path.into();
        let archive = zip::ZipArchive::new(std::fs::File::open(&path)?)?;
        Ok(Self {
            path,
            archive: Arc::new(Mutex::new(archive)),
        })
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // a panic mid-read leaves no state worth discarding
    fn archive(&self) -> MutexGuard<'_, zip::ZipArchive<std::fs::File>> {
        self.archive.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostArchive for ZipHostArchive {
    fn list_entries(&self) -> Result<Vec<String>, PluginError> {
        Ok(self.archive().file_names().map(str::to_string).collect())
    }

    fn open_entry(&self, name: &str) -> Result<Vec<u8>, PluginError> {
        let mut archive = self.archive();
        let mut entry = archive.by_name(name)?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// An archive held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHostArchive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryHostArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl HostArchive for MemoryHostArchive {
    fn list_entries(&self) -> Result<Vec<String>, PluginError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn open_entry(&self, name: &str) -> Result<Vec<u8>, PluginError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or(PluginError::Zip(zip::result::ZipError::FileNotFound))
    }
}

fn parse_manifest(path: &Path, bytes: &[u8]) -> Result<Manifest, PluginError> {
    let text = String::from_utf8_lossy(bytes);
    Manifest::parse(&text).map_err(|source| PluginError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `META-INF/MANIFEST.MF` from a plugin archive.
///
/// # Errors
///
/// Returns an error if the reader is not a zip, has no manifest, or the
/// manifest is malformed.
pub fn read_manifest_from<R: Read + Seek>(path: &Path, reader: R) -> Result<Manifest, PluginError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut entry = archive.by_name(MANIFEST_PATH)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    parse_manifest(path, &buf)
}

/// Read the manifest of a plugin archive on disk.
///
/// # Errors
///
/// See [`read_manifest_from`].
pub fn read_plugin_manifest(path: &Path) -> Result<Manifest, PluginError> {
    let file = std::fs::File::open(path)?;
    read_manifest_from(path, file)
}

/// Build a minimal plugin archive holding only a manifest.
#[cfg(test)]
pub(crate) fn plugin_archive_bytes(manifest: &str) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file(MANIFEST_PATH, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}
