// Feature index file
// Secondary manifest listing only clips whose features are cached

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INDEX_COLUMNS: [&str; 5] = ["original_file", "fold", "class", "classID", "mfcc_path"];

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error writing feature index {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in feature index: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureIndexRow {
    pub original_file: String,
    pub fold: u32,
    #[serde(rename = "class")]
    pub class_label: String,
    #[serde(rename = "classID")]
    pub class_id: u32,
    pub mfcc_path: String,
}

/// Write the index, replacing any previous file. The header is always written.
pub fn write_index(path: &Path, rows: &[FeatureIndexRow]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(INDEX_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

pub fn read_index(path: &Path) -> Result<Vec<FeatureIndexRow>, IndexError> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_index_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("processed_data").join("mfcc_metadata.csv");

        let rows = vec![FeatureIndexRow {
            original_file: "a.wav".to_string(),
            fold: 1,
            class_label: "dog_bark".to_string(),
            class_id: 3,
            mfcc_path: "processed_data/mfccs/fold1/a.json".to_string(),
        }];
        write_index(&path, &rows).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "original_file,fold,class,classID,mfcc_path\na.wav,1,dog_bark,3,processed_data/mfccs/fold1/a.json\n"
        );
        assert_eq!(read_index(&path).unwrap(), rows);
    }

    #[test]
    fn test_empty_index_keeps_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.csv");

        write_index(&path, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "original_file,fold,class,classID,mfcc_path\n"
        );
        assert!(read_index(&path).unwrap().is_empty());
    }
}
