//! Content-addressed extraction of bundled engine resources
//!
//! Resources (engine library, default model, keyword files) are read from a
//! [`ResourceSource`] and written to `<cache_root>/<sha256>/<logical path>`.
//! A file that already exists at its hashed path is reused as-is; the hash in
//! the path is the validity check. Writes go through a temporary file and an
//! atomic rename so concurrent processes never observe a partial artifact.

use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{PorcupineError, Result};

/// Name of the cache directory under the system temp dir
pub const CACHE_DIR_NAME: &str = "porcupine";

/// Read-only store of bundled resources addressed by `/`-separated logical paths.
pub trait ResourceSource: Send + Sync {
    /// Bytes of the resource at `logical_path`.
    fn read(&self, logical_path: &str) -> io::Result<Cow<'_, [u8]>>;

    /// File names directly inside the logical directory `dir`, sorted.
    fn list(&self, dir: &str) -> io::Result<Vec<String>>;
}

/// Resource bundle laid out on disk (`lib/`, `resources/` under `root`).
#[derive(Debug, Clone)]
pub struct BundleDirectory {
    root: PathBuf,
}

impl BundleDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, logical_path: &str) -> PathBuf {
        logical_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl ResourceSource for BundleDirectory {
    fn read(&self, logical_path: &str) -> io::Result<Cow<'_, [u8]>> {
        fs::read(self.resolve(logical_path)).map(Cow::Owned)
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory resource bundle, e.g. assets compiled in with `include_bytes!`.
#[derive(Debug, Default, Clone)]
pub struct MemoryBundle {
    files: HashMap<String, Cow<'static, [u8]>>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource at `logical_path`, replacing any previous entry.
    pub fn insert(&mut self, logical_path: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        self.files.insert(logical_path.into(), bytes.into());
    }

    pub fn with(mut self, logical_path: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(logical_path, bytes);
        self
    }
}

impl ResourceSource for MemoryBundle {
    fn read(&self, logical_path: &str) -> io::Result<Cow<'_, [u8]>> {
        self.files
            .get(logical_path)
            .map(|bytes| Cow::Borrowed(bytes.as_ref()))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no bundled resource {}", logical_path))
            })
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names: Vec<String> = self
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no bundled directory {}", dir),
            ));
        }

        names.sort();
        Ok(names)
    }
}

/// One extracted resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Hex SHA-256 of the resource bytes
    pub content_hash: String,

    /// Logical path inside the bundle
    pub logical_path: String,

    /// Absolute path of the extracted file
    pub extracted_path: PathBuf,
}

/// Filesystem cache of extracted resources, shared across sessions and processes
#[derive(Debug, Clone)]
pub struct ResourceCache {
    root: PathBuf,
}

impl ResourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache under `<temp_dir>/porcupine`
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join(CACHE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract `logical_path` from `source` and return the extracted file path.
    ///
    /// Idempotent: a second call for identical bytes returns the same path
    /// without touching the file.
    pub fn extract(&self, source: &dyn ResourceSource, logical_path: &str) -> Result<PathBuf> {
        self.extract_entry(source, logical_path)
            .map(|entry| entry.extracted_path)
    }

    /// Like [`extract`](Self::extract) but also reports the content hash.
    pub fn extract_entry(&self, source: &dyn ResourceSource, logical_path: &str) -> Result<CacheEntry> {
        self.extract_with_mode(source, logical_path, false)
    }

    /// Extract a shared library; on Unix the file is made executable.
    pub fn extract_library(&self, source: &dyn ResourceSource, logical_path: &str) -> Result<PathBuf> {
        self.extract_with_mode(source, logical_path, true)
            .map(|entry| entry.extracted_path)
    }

    fn extract_with_mode(
        &self,
        source: &dyn ResourceSource,
        logical_path: &str,
        executable: bool,
    ) -> Result<CacheEntry> {
        let bytes = source
            .read(logical_path)
            .map_err(|e| PorcupineError::resource(logical_path, e))?;

        let content_hash = content_hash(&bytes);
        let destination = self.slot(&content_hash, logical_path);

        if destination.exists() {
            debug!("Cache hit for {} at {}", logical_path, destination.display());
        } else {
            write_atomically(&destination, &bytes, executable)
                .map_err(|e| PorcupineError::resource(logical_path, e))?;
            info!("Extracted {} to {}", logical_path, destination.display());
        }

        Ok(CacheEntry {
            content_hash,
            logical_path: logical_path.to_string(),
            extracted_path: destination,
        })
    }

    fn slot(&self, content_hash: &str, logical_path: &str) -> PathBuf {
        logical_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.join(content_hash), |path, segment| path.join(segment))
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_atomically(destination: &Path, bytes: &[u8], executable: bool) -> io::Result<()> {
    let parent = destination.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "cache destination has no parent directory")
    })?;
    fs::create_dir_all(parent)?;

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    match staged.persist(destination) {
        Ok(_) => Ok(()),
        // Another writer got there first with identical bytes. On Windows the
        // rename fails outright once that copy is loaded.
        Err(_) if destination.exists() => {
            debug!("{} was written concurrently, keeping it", destination.display());
            Ok(())
        }
        Err(e) => Err(e.error),
    }
}
