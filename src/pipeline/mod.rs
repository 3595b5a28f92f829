// Pipeline execution module
// Batch extraction, cache verification and feature index construction

pub mod batch;
pub mod index;
pub mod trace;
pub mod verify;

use thiserror::Error;

use crate::audio::FeatureError;
use crate::config::ConfigError;
use crate::manifest::{IndexError, ManifestError};
use crate::state::StorageError;

pub use batch::{BatchOptions, BatchProcessor, BatchReport, RowFailure, RowOutcome};
pub use index::IndexBuilder;
pub use trace::{read_trace_file, RunTrace, TraceEntry, TraceError, TraceWriter};
pub use verify::{Verifier, VerifyReport};

/// Errors that stop a whole command. Per-row problems never end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Invalid feature settings: {0}")]
    Feature(#[from] FeatureError),

    #[error("Failed to prepare cache directories: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),
}
