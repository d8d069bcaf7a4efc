//! Result cache keyed by the SHA-256 of the source document's bytes.
//!
//! Entries live at `<dir>/<sha256-hex>.json`. Writes go through a temp file in
//! the same directory and are renamed into place, so a reader never sees a
//! half-written entry.

use std::io::Write;
use std::path::{Path, PathBuf};

use rob2_core::ResultRow;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::StoreError;

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_key(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached rows for `key`. A missing entry is `None`; so is an unreadable
    /// one, which is logged and left to be overwritten.
    pub fn get(&self, key: &str) -> Option<Vec<ResultRow>> {
        let path = self.path_for(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache entry unreadable");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(rows) => {
                info!(key, "cache hit");
                Some(rows)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache entry corrupt, ignoring");
                None
            }
        }
    }

    /// Cached rows for the document at `source`, keyed by its content.
    pub fn get_for(&self, source: &Path) -> Result<Option<Vec<ResultRow>>, StoreError> {
        let bytes = std::fs::read(source).map_err(|e| StoreError::io(source, e))?;
        Ok(self.get(&content_key(&bytes)))
    }

    /// Store `rows` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, rows: &[ResultRow]) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path_for(key);

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let json = serde_json::to_vec_pretty(rows)?;
        tmp.write_all(&json).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        info!(key, path = %path.display(), rows = rows.len(), "cached evaluation");
        Ok(path)
    }

    pub fn put_for(&self, source: &Path, rows: &[ResultRow]) -> Result<PathBuf, StoreError> {
        let bytes = std::fs::read(source).map_err(|e| StoreError::io(source, e))?;
        self.put(&content_key(&bytes), rows)
    }
}
