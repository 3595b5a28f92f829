// File system storage for cached feature records
// One JSON file per clip at {root}/fold{fold}/{stem}.json
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::models::{record_checksum, CacheEntry, CacheKey, FeatureRecord, CACHE_FORMAT_VERSION};

/// Extension of serialized cache records
pub const CACHE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Refusing to store record for {}: {reason}", path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    /// The entry exists but cannot be trusted; treat it as absent and re-derive it
    #[error("Corrupt cache entry {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Maps cache keys to record files under a root directory.
///
/// Holds no state besides the root, so every call stands alone and
/// calls for distinct keys never touch the same file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Eagerly create the directories for a known fold set
    pub fn prepare(&self, folds: &[u32]) -> StorageResult<()> {
        for &fold in folds {
            let dir = self.fold_dir(fold);
            fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        }
        Ok(())
    }

    pub fn fold_dir(&self, fold: u32) -> PathBuf {
        self.root.join(format!("fold{}", fold))
    }

    /// Canonical record path for a clip. Pure; never touches the filesystem.
    pub fn path_for(&self, fold: u32, filename: &str) -> PathBuf {
        self.path_for_key(&CacheKey::new(fold, filename))
    }

    pub fn path_for_key(&self, key: &CacheKey) -> PathBuf {
        self.fold_dir(key.fold)
            .join(format!("{}.{}", key.stem, CACHE_EXTENSION))
    }

    pub fn exists(&self, fold: u32, filename: &str) -> bool {
        self.path_for(fold, filename).is_file()
    }

    /// Persist a record at its canonical path.
    ///
    /// The record is written to a temporary sibling and renamed into place,
    /// so the canonical path only ever holds a complete record.
    pub fn write(&self, fold: u32, filename: &str, record: &FeatureRecord) -> StorageResult<PathBuf> {
        let path = self.path_for(fold, filename);
        if let Some((row, frame)) = record.first_non_finite() {
            return Err(StorageError::InvalidRecord {
                path,
                reason: format!("non-finite value at row {}, frame {}", row, frame),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let entry = CacheEntry::seal(record.clone()).map_err(|source| StorageError::Serialize {
            path: path.clone(),
            source,
        })?;
        let bytes = serde_json::to_vec(&entry).map_err(|source| StorageError::Serialize {
            path: path.clone(),
            source,
        })?;

        let tmp_path = path.with_extension(format!("{}.tmp", CACHE_EXTENSION));
        let mut file = fs::File::create(&tmp_path).map_err(io_error(&tmp_path))?;
        file.write_all(&bytes).map_err(io_error(&tmp_path))?;
        file.sync_all().map_err(io_error(&tmp_path))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Load and check the record for a clip
    pub fn read(&self, fold: u32, filename: &str) -> StorageResult<FeatureRecord> {
        let path = self.path_for(fold, filename);
        let bytes = fs::read(&path).map_err(io_error(&path))?;

        let corrupt = |reason: String| StorageError::Corrupt {
            path: path.clone(),
            reason,
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("unreadable record: {}", e)))?;

        if entry.format_version != CACHE_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                entry.format_version
            )));
        }

        let checksum = record_checksum(&entry.record)
            .map_err(|e| corrupt(format!("record cannot be re-serialized: {}", e)))?;
        if checksum != entry.sha256 {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        entry.record.validate_shape().map_err(corrupt)?;
        Ok(entry.record)
    }

    /// Whether a record exists and reads back cleanly
    pub fn is_valid(&self, fold: u32, filename: &str) -> bool {
        self.read(fold, filename).is_ok()
    }
}
