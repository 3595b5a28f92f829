// State management module
// Feature cache layout, record models and on-disk persistence

pub mod models;
pub mod storage;

pub use models::{CacheEntry, CacheKey, FeatureRecord, CACHE_FORMAT_VERSION};
pub use storage::{CacheStore, StorageError, StorageResult, CACHE_EXTENSION};
