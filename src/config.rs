// Pipeline configuration
// Defaults follow the UrbanSound8K layout; a JSON file and CLI flags override them

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::NormalizeConfig;
use crate::pipeline::BatchOptions;
use crate::state::CacheStore;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Corpus manifest CSV
    pub manifest_path: PathBuf,

    /// Root of the source clips, laid out as fold{N}/{file}
    pub audio_root: PathBuf,

    /// Root of the feature cache
    pub cache_root: PathBuf,

    /// Where the feature index CSV is written
    pub index_path: PathBuf,

    /// Optional JSONL trace of extraction runs
    pub trace_path: Option<PathBuf>,

    pub target_duration_secs: u32,
    pub sample_rate: u32,
    pub coefficient_count: usize,

    /// Fold directories to create before extraction; created lazily when unset
    pub folds: Option<Vec<u32>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            manifest_path: PathBuf::from("UrbanSound8K.csv"),
            audio_root: PathBuf::from("urban_data"),
            cache_root: PathBuf::from("processed_data/mfccs"),
            index_path: PathBuf::from("processed_data/mfcc_metadata.csv"),
            trace_path: None,
            target_duration_secs: 5,
            sample_rate: 22050,
            coefficient_count: 40,
            folds: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.target_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "target_duration_secs must be positive".to_string(),
            ));
        }
        if self.coefficient_count == 0 {
            return Err(ConfigError::Invalid(
                "coefficient_count must be positive".to_string(),
            ));
        }
        if let Some(folds) = &self.folds {
            if folds.contains(&0) {
                return Err(ConfigError::Invalid("folds must be positive".to_string()));
            }
        }
        Ok(())
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(&self.cache_root)
    }

    pub fn normalize_config(&self) -> NormalizeConfig {
        NormalizeConfig {
            target_duration_secs: self.target_duration_secs,
            sample_rate: self.sample_rate,
        }
    }

    pub fn batch_options(&self, revalidate: bool) -> BatchOptions {
        BatchOptions {
            normalize: self.normalize_config(),
            coefficient_count: self.coefficient_count,
            revalidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_corpus_layout() {
        let config = Config::default();
        assert_eq!(config.normalize_config().target_samples(), 110250);
        assert_eq!(config.coefficient_count, 40);
        assert_eq!(
            config.cache_store().path_for(1, "a.wav"),
            PathBuf::from("processed_data/mfccs/fold1/a.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sample_rate": 16000, "folds": [1, 2] }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.folds, Some(vec![1, 2]));
        assert_eq!(config.coefficient_count, 40);
        assert_eq!(config.audio_root, PathBuf::from("urban_data"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "n_mfcc": 40 }"#).unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            folds: Some(vec![0, 1]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
