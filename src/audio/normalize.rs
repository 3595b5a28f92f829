// Fixed-length clip normalization
// Decode, downmix, resample, then pad or trim to an exact sample count

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::ingest::{ingest_file, AudioError};
use crate::audio::resample::resample;

/// A clip that could not be decoded. Callers skip the item and carry on.
#[derive(Debug, Error)]
#[error("Failed to decode {}: {cause}", path.display())]
pub struct DecodeFailure {
    pub path: PathBuf,
    #[source]
    pub cause: AudioError,
}

/// Mono audio at a fixed rate and an exact length
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Target clip shape for normalization
#[derive(Debug, Clone, Copy)]
pub struct NormalizeConfig {
    pub target_duration_secs: u32,
    pub sample_rate: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        NormalizeConfig {
            target_duration_secs: 5,
            sample_rate: 22050,
        }
    }
}

impl NormalizeConfig {
    /// Exact number of samples every normalized clip has
    pub fn target_samples(&self) -> usize {
        self.target_duration_secs as usize * self.sample_rate as usize
    }
}

/// Load the clip at `path` and force it to `config.target_samples()` samples
pub fn normalize(path: &Path, config: &NormalizeConfig) -> Result<NormalizedAudio, DecodeFailure> {
    let fail = |cause: AudioError| DecodeFailure {
        path: path.to_path_buf(),
        cause,
    };

    let audio = ingest_file(path).map_err(fail)?;
    let mono = audio.to_mono();
    let resampled = resample(&mono, audio.sample_rate, config.sample_rate).map_err(fail)?;

    Ok(NormalizedAudio {
        samples: fit_to_length(resampled, config.target_samples()),
        sample_rate: config.sample_rate,
    })
}

/// Keep the leading `target` samples, or right-pad with silence up to `target`
pub fn fit_to_length(mut samples: Vec<f32>, target: usize) -> Vec<f32> {
    samples.resize(target, 0.0);
    samples
}
