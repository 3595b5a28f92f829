// Data models for the feature cache
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::audio::FeatureMatrix;

/// Identity of one cached clip: its fold and its filename without extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub fold: u32,
    pub stem: String,
}

impl CacheKey {
    pub fn new(fold: u32, filename: &str) -> Self {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        CacheKey { fold, stem }
    }
}

/// Features of one clip plus the provenance needed to use them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub features: FeatureMatrix,
    pub class_id: u32,
    pub original_file: String,
    pub sample_rate: u32,
    pub coefficient_count: usize,
}

impl FeatureRecord {
    /// Number of frames per coefficient row
    pub fn frame_count(&self) -> usize {
        self.features.first().map_or(0, |row| row.len())
    }

    /// Check the matrix matches the declared coefficient count and is rectangular
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.features.len() != self.coefficient_count {
            return Err(format!(
                "expected {} coefficient rows, found {}",
                self.coefficient_count,
                self.features.len()
            ));
        }

        let frames = self.frame_count();
        if let Some(row) = self.features.iter().position(|row| row.len() != frames) {
            return Err(format!(
                "row {} has {} frames, expected {}",
                row,
                self.features[row].len(),
                frames
            ));
        }

        if let Some((row, frame)) = self.first_non_finite() {
            return Err(format!("non-finite value at row {}, frame {}", row, frame));
        }

        Ok(())
    }

    /// Position of the first NaN or infinite coefficient. JSON has no encoding for them.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.features.iter().enumerate().find_map(|(row, values)| {
            values
                .iter()
                .position(|v| !v.is_finite())
                .map(|frame| (row, frame))
        })
    }
}

/// Current on-disk envelope version
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// On-disk envelope around a record; the checksum covers the serialized record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format_version: u32,
    pub sha256: String,
    pub record: FeatureRecord,
}

impl CacheEntry {
    pub fn seal(record: FeatureRecord) -> Result<Self, serde_json::Error> {
        let sha256 = record_checksum(&record)?;
        Ok(CacheEntry {
            format_version: CACHE_FORMAT_VERSION,
            sha256,
            record,
        })
    }
}

/// SHA256 over the record's canonical JSON form
pub fn record_checksum(record: &FeatureRecord) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rows: usize, frames: usize) -> FeatureRecord {
        FeatureRecord {
            features: vec![vec![0.25; frames]; rows],
            class_id: 3,
            original_file: "100032-3-0-0.wav".to_string(),
            sample_rate: 22050,
            coefficient_count: rows,
        }
    }

    #[test]
    fn test_cache_key_strips_extension() {
        let key = CacheKey::new(5, "100263-2-0-117.wav");
        assert_eq!(key.fold, 5);
        assert_eq!(key.stem, "100263-2-0-117");
    }

    #[test]
    fn test_cache_key_keeps_inner_dots() {
        let key = CacheKey::new(1, "take.2.wav");
        assert_eq!(key.stem, "take.2");
    }

    #[test]
    fn test_cache_key_is_stable() {
        assert_eq!(CacheKey::new(3, "a.wav"), CacheKey::new(3, "a.wav"));
        assert_ne!(CacheKey::new(3, "a.wav"), CacheKey::new(4, "a.wav"));
    }

    #[test]
    fn test_validate_shape() {
        assert!(record(40, 216).validate_shape().is_ok());

        let mut wrong_rows = record(40, 216);
        wrong_rows.coefficient_count = 13;
        assert!(wrong_rows.validate_shape().is_err());

        let mut ragged = record(4, 10);
        ragged.features[2].pop();
        assert!(ragged.validate_shape().is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut rec = record(4, 10);
        assert_eq!(rec.first_non_finite(), None);

        rec.features[1][7] = f32::NAN;
        assert_eq!(rec.first_non_finite(), Some((1, 7)));
        assert!(rec.validate_shape().is_err());

        rec.features[1][7] = 0.0;
        rec.features[3][0] = f32::NEG_INFINITY;
        assert_eq!(rec.first_non_finite(), Some((3, 0)));
    }

    #[test]
    fn test_checksum_tracks_content() {
        let a = record(2, 3);
        let mut b = a.clone();
        assert_eq!(record_checksum(&a).unwrap(), record_checksum(&b).unwrap());

        b.features[0][0] = 0.5;
        assert_ne!(record_checksum(&a).unwrap(), record_checksum(&b).unwrap());
    }

    #[test]
    fn test_seal_sets_version() {
        let entry = CacheEntry::seal(record(1, 1)).unwrap();
        assert_eq!(entry.format_version, CACHE_FORMAT_VERSION);
        assert_eq!(entry.sha256.len(), 64);
    }
}
