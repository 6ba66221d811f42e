//! Content-addressed file cache
//!
//! Artifacts live as flat files under `cache/<namespace>/`; the filename
//! encodes the cache key, so the path is deterministic from the key and no
//! two distinct artifacts collide. Writes are atomic (write to a sibling
//! temp file, then rename) so a concurrent reader never sees a partial
//! artifact; re-putting the same key overwrites (last write wins).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::pdf::types::Zoom;

/// Reserved filename in the temp namespace: process-wide configuration,
/// never a cache artifact, always excluded from garbage collection.
pub const SETTINGS_FILE: &str = "settings.json";

/// Logical cache partition with its own eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Item thumbnails; keep-N eviction
    Icons,
    /// Rendered page rasters; keep-N eviction
    Pages,
    /// Conversion scratch and one-off artifacts; TTL eviction
    Temp,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Icons, Namespace::Pages, Namespace::Temp];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Namespace::Icons => "icons",
            Namespace::Pages => "pages",
            Namespace::Temp => "temp",
        }
    }
}

/// File-based artifact cache rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for namespace in Namespace::ALL {
            fs::create_dir_all(root.join(namespace.dir_name()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a namespace.
    pub fn dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }

    /// Deterministic path for a key. Fails on keys that would escape the
    /// namespace directory.
    pub fn path(&self, namespace: Namespace, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir(namespace).join(key))
    }

    /// Path of the artifact if it exists, `None` on a miss.
    pub fn get(&self, namespace: Namespace, key: &str) -> Result<Option<PathBuf>> {
        let path = self.path(namespace, key)?;
        Ok(path.is_file().then_some(path))
    }

    /// Read an artifact's bytes, `None` on a miss.
    pub fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(namespace, key)? {
            Some(path) => Ok(Some(fs::read(path)?)),
            None => Ok(None),
        }
    }

    /// Store an artifact. Atomic at the file level: a concurrent reader sees
    /// either the previous artifact or the complete new one.
    pub fn put(&self, namespace: Namespace, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(namespace, key)?;
        let tmp = self.staging_path(namespace, key)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// In-flight sibling for an atomic write. Appends to the full key
    /// rather than swapping the extension, so keys that differ only in
    /// extension never share a staging file.
    fn staging_path(&self, namespace: Namespace, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir(namespace).join(format!("{}.tmp-write", key)))
    }

    /// Remove an artifact; returns whether it existed.
    pub fn remove(&self, namespace: Namespace, key: &str) -> Result<bool> {
        let path = self.path(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Key for a rendered page raster.
    pub fn page_key(item_id: &str, page: i64, zoom: Zoom) -> String {
        format!("{}-{}-{}.png", sanitize_id(item_id), page, u32::from(zoom))
    }

    /// Key for an item thumbnail.
    pub fn icon_key(item_id: &str) -> String {
        format!("{}.png", sanitize_id(item_id))
    }

    /// Key for an item's parsed bookmark outline.
    pub fn outline_key(item_id: &str) -> String {
        format!("{}-outline.json", sanitize_id(item_id))
    }

    /// Content-hash key for artifacts without a natural identifier
    /// (e.g. converted office documents in the temp namespace).
    pub fn content_key(bytes: &[u8], ext: &str) -> String {
        let digest = Sha256::digest(bytes);
        format!("{}.{}", hex::encode(&digest[..16]), ext)
    }
}

/// Strip anything that could interfere with the flat-filename key encoding.
pub(crate) fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::Validation("empty cache key".to_string()));
    }
    if key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(AppError::Validation(format!(
            "cache key '{}' must not contain path separators",
            key
        )));
    }
    Ok(())
}
