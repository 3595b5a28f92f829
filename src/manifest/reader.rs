// Corpus manifest reader
// Parses the CSV listing of clips and rejects anything without a usable identity

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::state::CacheKey;

/// Columns every manifest must carry. Others (fsID, start, end, ...) are ignored.
pub const REQUIRED_COLUMNS: [&str; 4] = ["slice_file_name", "fold", "class", "classID"];

/// Errors that make a manifest unusable. Always fatal for a batch.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to open manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Csv(#[from] csv::Error),

    #[error("Manifest is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("Malformed manifest row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Duplicate manifest entry at line {line}: fold {fold}, file {filename}")]
    DuplicateRow {
        line: u64,
        fold: u32,
        filename: String,
    },

    #[error("Manifest entries share cache key fold{fold}/{stem} at line {line}: {first} and {second}")]
    KeyCollision {
        line: u64,
        fold: u32,
        stem: String,
        first: String,
        second: String,
    },
}

/// One clip listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    #[serde(rename = "slice_file_name")]
    pub filename: String,

    pub fold: u32,

    #[serde(rename = "class")]
    pub class_label: String,

    #[serde(rename = "classID")]
    pub class_id: u32,
}

impl ManifestRow {
    /// Location of the source clip: {audio_root}/fold{fold}/{filename}
    pub fn source_path(&self, audio_root: &Path) -> PathBuf {
        audio_root
            .join(format!("fold{}", self.fold))
            .join(&self.filename)
    }

    fn check(&self) -> Result<(), String> {
        if self.fold == 0 {
            return Err("fold must be a positive integer".to_string());
        }
        if self.filename.contains(['/', '\\']) || self.filename.starts_with('.') {
            return Err(format!("'{}' is not a plain file name", self.filename));
        }
        match self.filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok(()),
            _ => Err(format!("'{}' has no file extension", self.filename)),
        }
    }
}

/// Validated, ordered list of manifest rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Parse and validate. The whole manifest is rejected on the first bad row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(ManifestError::MissingColumn(column));
            }
        }

        let mut rows = Vec::new();
        let mut seen: HashMap<CacheKey, String> = HashMap::new();

        for (idx, result) in rdr.deserialize::<ManifestRow>().enumerate() {
            // Line 1 is the header
            let line = idx as u64 + 2;
            let row = result.map_err(|e| ManifestError::MalformedRow {
                line,
                reason: e.to_string(),
            })?;
            row.check()
                .map_err(|reason| ManifestError::MalformedRow { line, reason })?;

            // Distinct filenames with the same stem would share one cache entry
            let key = CacheKey::new(row.fold, &row.filename);
            if let Some(first) = seen.get(&key) {
                if *first == row.filename {
                    return Err(ManifestError::DuplicateRow {
                        line,
                        fold: row.fold,
                        filename: row.filename,
                    });
                }
                return Err(ManifestError::KeyCollision {
                    line,
                    fold: key.fold,
                    stem: key.stem,
                    first: first.clone(),
                    second: row.filename,
                });
            }
            seen.insert(key, row.filename.clone());
            rows.push(row);
        }

        Ok(Manifest { rows })
    }

    pub fn from_rows(rows: Vec<ManifestRow>) -> Self {
        Manifest { rows }
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct folds in ascending order
    pub fn folds(&self) -> Vec<u32> {
        let mut folds: Vec<u32> = self.rows.iter().map(|r| r.fold).collect();
        folds.sort_unstable();
        folds.dedup();
        folds
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestRow;
    type IntoIter = std::slice::Iter<'a, ManifestRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
