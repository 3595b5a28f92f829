// Batch feature extraction
// Walks the manifest, computes missing records and leaves cached ones alone

use indicatif::ProgressBar;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::audio::{normalize, DecodeFailure, FeatureError, MfccConfig, MfccExtractor, NormalizeConfig};
use crate::manifest::{Manifest, ManifestRow};
use crate::pipeline::trace::RunTrace;
use crate::state::{CacheStore, FeatureRecord, StorageError};

/// Why a single row produced no record. Never aborts the batch.
#[derive(Debug, Error)]
pub enum RowFailure {
    #[error(transparent)]
    Decode(#[from] DecodeFailure),

    #[error("Feature extraction failed: {0}")]
    Extract(#[from] FeatureError),

    #[error("Failed to store features: {0}")]
    Store(#[from] StorageError),
}

/// Result of processing one manifest row
#[derive(Debug)]
pub enum RowOutcome {
    /// A record was already cached; nothing was done
    AlreadyCached,

    /// A record was computed and written. `replaced` is set when a corrupt
    /// entry was overwritten during revalidation.
    Written { path: PathBuf, replaced: bool },

    Failed(RowFailure),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub normalize: NormalizeConfig,
    pub coefficient_count: usize,

    /// Read existing entries and recompute the ones that fail to load
    pub revalidate: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            normalize: NormalizeConfig::default(),
            coefficient_count: 40,
            revalidate: false,
        }
    }
}

/// Counts for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub already_cached: usize,
    pub written: usize,
    pub replaced_corrupt: usize,
    pub failed: usize,
}

impl BatchReport {
    fn tally(&mut self, outcome: &RowOutcome) {
        self.total += 1;
        match outcome {
            RowOutcome::AlreadyCached => self.already_cached += 1,
            RowOutcome::Written { replaced, .. } => {
                self.written += 1;
                if *replaced {
                    self.replaced_corrupt += 1;
                }
            }
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Drives normalize -> extract -> store for every manifest row, in order
pub struct BatchProcessor {
    store: CacheStore,
    audio_root: PathBuf,
    options: BatchOptions,
    extractor: MfccExtractor,
    trace: RunTrace,
    progress: Option<ProgressBar>,
}

impl BatchProcessor {
    pub fn new(
        store: CacheStore,
        audio_root: impl Into<PathBuf>,
        options: BatchOptions,
    ) -> Result<Self, FeatureError> {
        let extractor = MfccExtractor::new(MfccConfig::with_rate(
            options.normalize.sample_rate,
            options.coefficient_count,
        ))?;

        Ok(BatchProcessor {
            store,
            audio_root: audio_root.into(),
            options,
            extractor,
            trace: RunTrace::disabled(),
            progress: None,
        })
    }

    pub fn with_trace(mut self, trace: RunTrace) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process every row. Per-row failures are logged and counted, never returned.
    pub fn run(&self, manifest: &Manifest) -> BatchReport {
        let total = manifest.len();
        let mut report = BatchReport::default();

        log::info!(
            "Extracting features for {} manifest rows into {}",
            total,
            self.store.root().display()
        );
        self.trace.record(
            "extract",
            0.0,
            format!("Starting extraction of {} rows", total),
            None,
        );

        for (idx, row) in manifest.iter().enumerate() {
            let outcome = self.process_row(row);

            match &outcome {
                RowOutcome::AlreadyCached => self.log_row(|| {
                    log::debug!("Skipping fold{}/{}: already cached", row.fold, row.filename)
                }),
                RowOutcome::Written { path, replaced } => self.log_row(|| {
                    log::debug!("Wrote {} (replaced corrupt entry: {})", path.display(), replaced)
                }),
                RowOutcome::Failed(failure) => {
                    self.log_row(|| {
                        log::warn!("Skipping fold{}/{}: {}", row.fold, row.filename, failure)
                    });
                    self.trace.record(
                        "row_failed",
                        (idx + 1) as f32 / total as f32,
                        failure.to_string(),
                        Some(serde_json::json!({
                            "fold": row.fold,
                            "filename": row.filename,
                        })),
                    );
                }
            }

            report.tally(&outcome);
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        log::info!(
            "Batch completed: {} written, {} already cached, {} failed ({} corrupt entries replaced)",
            report.written,
            report.already_cached,
            report.failed,
            report.replaced_corrupt
        );
        self.trace.record(
            "extract",
            1.0,
            "Batch completed",
            serde_json::to_value(&report).ok(),
        );

        report
    }

    /// Process a single row, skipping it when its record already exists
    pub fn process_row(&self, row: &ManifestRow) -> RowOutcome {
        let path = self.store.path_for(row.fold, &row.filename);
        let mut replaced = false;

        if path.is_file() {
            if !self.options.revalidate {
                return RowOutcome::AlreadyCached;
            }
            match self.store.read(row.fold, &row.filename) {
                Ok(_) => return RowOutcome::AlreadyCached,
                Err(StorageError::Corrupt { reason, .. }) => {
                    self.log_row(|| {
                        log::warn!("Recomputing corrupt entry {}: {}", path.display(), reason)
                    });
                    replaced = true;
                }
                Err(e) => return RowOutcome::Failed(e.into()),
            }
        }

        let written = self
            .compute(row)
            .and_then(|record| {
                self.store
                    .write(row.fold, &row.filename, &record)
                    .map_err(RowFailure::from)
            });

        match written {
            Ok(path) => RowOutcome::Written { path, replaced },
            Err(failure) => RowOutcome::Failed(failure),
        }
    }

    /// Emit per-row log lines with the progress bar hidden, so they are not overdrawn
    fn log_row<F: FnOnce()>(&self, emit: F) {
        match &self.progress {
            Some(progress) => progress.suspend(emit),
            None => emit(),
        }
    }

    fn compute(&self, row: &ManifestRow) -> Result<FeatureRecord, RowFailure> {
        let source = row.source_path(&self.audio_root);
        let audio = normalize(&source, &self.options.normalize)?;
        let features = self.extractor.extract(&audio.samples)?;

        Ok(FeatureRecord {
            features,
            class_id: row.class_id,
            original_file: row.filename.clone(),
            sample_rate: audio.sample_rate,
            coefficient_count: self.options.coefficient_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_tone(path: &Path, sample_rate: u32, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..len {
            let t = i as f32 / sample_rate as f32;
            let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8000.0;
            writer.write_sample(s as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn row(fold: u32, filename: &str) -> ManifestRow {
        ManifestRow {
            filename: filename.to_string(),
            fold,
            class_label: "dog_bark".to_string(),
            class_id: 3,
        }
    }

    fn small_options() -> BatchOptions {
        BatchOptions {
            normalize: NormalizeConfig {
                target_duration_secs: 1,
                sample_rate: 8000,
            },
            coefficient_count: 13,
            revalidate: false,
        }
    }

    #[test]
    fn test_process_row_writes_record() {
        let temp_dir = TempDir::new().unwrap();
        let audio_root = temp_dir.path().join("audio");
        write_tone(&audio_root.join("fold1").join("a.wav"), 8000, 4000);

        let store = CacheStore::new(temp_dir.path().join("cache"));
        let processor = BatchProcessor::new(store.clone(), &audio_root, small_options()).unwrap();

        let outcome = processor.process_row(&row(1, "a.wav"));
        assert!(matches!(outcome, RowOutcome::Written { replaced: false, .. }));

        let record = store.read(1, "a.wav").unwrap();
        assert_eq!(record.class_id, 3);
        assert_eq!(record.original_file, "a.wav");
        assert_eq!(record.sample_rate, 8000);
        assert_eq!(record.coefficient_count, 13);
        assert_eq!(record.features.len(), 13);
        assert_eq!(record.frame_count(), 1 + 8000 / 512);
    }

    #[test]
    fn test_existing_entry_is_skipped_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache"));
        let path = store.path_for(1, "a.wav");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"placeholder").unwrap();

        // No source audio exists, so any attempt to recompute would fail
        let processor = BatchProcessor::new(store, temp_dir.path().join("audio"), small_options()).unwrap();
        let outcome = processor.process_row(&row(1, "a.wav"));

        assert!(matches!(outcome, RowOutcome::AlreadyCached));
        assert_eq!(fs::read(&path).unwrap(), b"placeholder");
    }

    #[test]
    fn test_missing_source_is_decode_failure() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache"));
        let processor = BatchProcessor::new(store.clone(), temp_dir.path().join("audio"), small_options()).unwrap();

        let outcome = processor.process_row(&row(2, "missing.wav"));
        assert!(matches!(outcome, RowOutcome::Failed(RowFailure::Decode(_))));
        assert!(!store.exists(2, "missing.wav"));
    }

    #[test]
    fn test_revalidate_replaces_corrupt_entry() {
        let temp_dir = TempDir::new().unwrap();
        let audio_root = temp_dir.path().join("audio");
        write_tone(&audio_root.join("fold1").join("a.wav"), 8000, 8000);

        let store = CacheStore::new(temp_dir.path().join("cache"));
        let path = store.path_for(1, "a.wav");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"truncated").unwrap();

        let options = BatchOptions {
            revalidate: true,
            ..small_options()
        };
        let processor = BatchProcessor::new(store.clone(), &audio_root, options).unwrap();

        let outcome = processor.process_row(&row(1, "a.wav"));
        assert!(matches!(outcome, RowOutcome::Written { replaced: true, .. }));
        assert!(store.is_valid(1, "a.wav"));

        // A healthy entry is left alone on the next pass
        let outcome = processor.process_row(&row(1, "a.wav"));
        assert!(matches!(outcome, RowOutcome::AlreadyCached));
    }

    #[test]
    fn test_run_counts_outcomes_and_continues_past_failures() {
        let temp_dir = TempDir::new().unwrap();
        let audio_root = temp_dir.path().join("audio");
        write_tone(&audio_root.join("fold1").join("b.wav"), 16000, 20000);
        let corrupt = audio_root.join("fold2").join("c.wav");
        fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
        fs::write(&corrupt, b"RIFF....WAVEjunk").unwrap();

        let store = CacheStore::new(temp_dir.path().join("cache"));
        let manifest = Manifest::from_rows(vec![row(2, "c.wav"), row(1, "b.wav")]);
        let processor = BatchProcessor::new(store.clone(), &audio_root, small_options()).unwrap();

        let report = processor.run(&manifest);
        assert_eq!(
            report,
            BatchReport {
                total: 2,
                already_cached: 0,
                written: 1,
                replaced_corrupt: 0,
                failed: 1,
            }
        );
        assert!(store.exists(1, "b.wav"));
        assert!(!store.exists(2, "c.wav"));
    }

    #[test]
    fn test_run_with_progress_bar_logs_failures_and_advances() {
        let temp_dir = TempDir::new().unwrap();
        let audio_root = temp_dir.path().join("audio");
        write_tone(&audio_root.join("fold1").join("b.wav"), 8000, 8000);

        let store = CacheStore::new(temp_dir.path().join("cache"));
        let manifest = Manifest::from_rows(vec![
            row(1, "missing.wav"),
            row(1, "b.wav"),
            row(2, "gone.wav"),
        ]);
        let progress = ProgressBar::hidden();
        let processor = BatchProcessor::new(store.clone(), &audio_root, small_options())
            .unwrap()
            .with_progress(progress.clone());

        let report = processor.run(&manifest);
        assert_eq!(report.failed, 2);
        assert_eq!(report.written, 1);
        assert_eq!(progress.position(), 3);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_invalid_coefficient_count_rejected() {
        let options = BatchOptions {
            coefficient_count: 0,
            ..small_options()
        };
        assert!(BatchProcessor::new(CacheStore::new("cache"), "audio", options).is_err());
    }
}
