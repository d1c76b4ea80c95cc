//! File cache for scene assets.
//!
//! Everything the scene builder reads from disk goes through a
//! [`FileCache`], so once a scene is built the cache holds exactly the files
//! a worker needs to rebuild it. On the wire each file becomes an
//! [`AssetEntry`] with base64 encoded contents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Wire form of one cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub path: String,
    /// Base64 encoded file contents.
    pub data: String,
}

/// File contents keyed by the path as written in the scene file.
#[derive(Debug, Clone, Default)]
pub struct FileCache {
    files: BTreeMap<String, Vec<u8>>,

    /// Base directory for resolving relative paths
    base_dir: Option<PathBuf>,
}

impl FileCache {
    /// Create a new empty cache. Relative paths resolve against the
    /// working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache with a base directory for relative paths, normally the
    /// directory containing the scene file.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            files: BTreeMap::new(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Return the file's contents, reading it from disk on first use.
    pub fn read(&mut self, path: &str) -> CoreResult<&[u8]> {
        if !self.files.contains_key(path) {
            let full_path = self.resolve_path(path);
            let bytes = std::fs::read(&full_path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CoreError::MissingAsset(path.to_string()),
                _ => CoreError::Io(e),
            })?;
            log::debug!("Cached {} ({:.1} KB)", path, bytes.len() as f32 / 1024.0);
            self.files.insert(path.to_string(), bytes);
        }
        Ok(self.files[path].as_slice())
    }

    /// Insert file contents directly.
    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    /// Get a cached file without touching the disk.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Encode every cached file for transmission.
    pub fn encode(&self) -> Vec<AssetEntry> {
        self.files
            .iter()
            .map(|(path, bytes)| AssetEntry {
                path: path.clone(),
                data: STANDARD.encode(bytes),
            })
            .collect()
    }

    /// Rebuild a cache from received entries. The result has no base
    /// directory, so lookups of files that were not shipped fail.
    pub fn decode(entries: &[AssetEntry]) -> CoreResult<Self> {
        let mut cache = FileCache::new();
        for entry in entries {
            cache.insert(entry.path.clone(), STANDARD.decode(&entry.data)?);
        }
        log::debug!(
            "Decoded {} assets ({:.1} KB)",
            cache.len(),
            cache.total_size_bytes() as f32 / 1024.0
        );
        Ok(cache)
    }

    /// Resolve a path relative to the base directory.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);

        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(base) = &self.base_dir {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}
