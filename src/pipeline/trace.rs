// Batch run tracing
// Append-only JSONL trace file recording each extraction run

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A single trace entry in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    /// Identifies the run; every entry of one batch run shares it
    pub run_id: Uuid,

    /// Stage name (e.g., "extract", "row_failed")
    pub stage: String,

    /// Progress fraction [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage: stage.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL trace file
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry, creating the file and its directory if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json_line = entry.to_json_line()?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Trace sink for one run. Failures to write are logged and otherwise ignored.
pub struct RunTrace {
    run_id: Uuid,
    writer: Option<TraceWriter>,
}

impl RunTrace {
    pub fn new(writer: Option<TraceWriter>) -> Self {
        RunTrace {
            run_id: Uuid::new_v4(),
            writer,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&self, stage: &str, progress: f32, message: impl Into<String>, data: Option<serde_json::Value>) {
        let Some(writer) = &self.writer else {
            return;
        };

        let mut entry = TraceEntry::new(self.run_id, stage, progress, message);
        entry.data = data;

        if let Err(e) = writer.write(&entry) {
            log::warn!("Failed to write trace entry to {}: {}", writer.path().display(), e);
        }
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
