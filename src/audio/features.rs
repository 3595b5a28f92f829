// MFCC feature extraction
// Centered STFT -> mel power spectrum -> dB -> DCT-II, then per-frame rescaling

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;
use thiserror::Error;

use crate::audio::mel;

/// Coefficient-major feature matrix: `[coefficient_count][frames]`
pub type FeatureMatrix = Vec<Vec<f32>>;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for MFCC extraction
#[derive(Debug, Clone)]
pub struct MfccConfig {
    pub sample_rate: u32,

    /// Number of cepstral coefficients kept per frame
    pub coefficient_count: usize,

    /// FFT window size in samples
    pub fft_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Mel bands fed into the DCT
    pub num_mels: usize,

    pub low_freq: f64,

    /// Upper edge of the mel filterbank; `None` means Nyquist
    pub high_freq: Option<f64>,

    /// Dynamic range kept below the loudest bin, in dB
    pub top_db: Option<f64>,
}

impl Default for MfccConfig {
    fn default() -> Self {
        MfccConfig {
            sample_rate: 22050,
            coefficient_count: 40,
            fft_size: 2048,
            hop_size: 512,
            num_mels: 128,
            low_freq: 0.0,
            high_freq: None,
            top_db: Some(80.0),
        }
    }
}

impl MfccConfig {
    pub fn with_rate(sample_rate: u32, coefficient_count: usize) -> Self {
        MfccConfig {
            sample_rate,
            coefficient_count,
            ..Default::default()
        }
    }

    /// Number of frames produced for an input of `num_samples`
    pub fn frame_count(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_size
    }
}

/// MFCC extractor with precomputed window, filterbank and DCT basis
pub struct MfccExtractor {
    config: MfccConfig,
    window: Vec<f64>,
    mel_bank: Vec<Vec<f64>>,
    dct: Vec<Vec<f64>>,
    fft: Arc<dyn RealToComplex<f64>>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Result<Self, FeatureError> {
        if config.fft_size < 2 || config.hop_size == 0 || config.sample_rate == 0 {
            return Err(FeatureError::InvalidConfig(format!(
                "fft_size={} hop_size={} sample_rate={}",
                config.fft_size, config.hop_size, config.sample_rate
            )));
        }
        if config.coefficient_count == 0 || config.coefficient_count > config.num_mels {
            return Err(FeatureError::InvalidConfig(format!(
                "coefficient_count must be in 1..={}, got {}",
                config.num_mels, config.coefficient_count
            )));
        }

        let high_freq = config
            .high_freq
            .unwrap_or(config.sample_rate as f64 / 2.0);
        let mel_bank = mel::mel_filter_bank(
            config.num_mels,
            config.fft_size,
            config.sample_rate as usize,
            config.low_freq,
            high_freq,
        );
        let window = mel::hann_window(config.fft_size);
        let dct = dct_basis(config.coefficient_count, config.num_mels);
        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(config.fft_size);

        Ok(MfccExtractor {
            config,
            window,
            mel_bank,
            dct,
            fft,
        })
    }

    /// Compute the rescaled `[coefficient_count][frames]` MFCC matrix
    pub fn extract(&self, samples: &[f32]) -> Result<FeatureMatrix, FeatureError> {
        let mut mfcc = self.mfcc(samples)?;
        normalize_frames(&mut mfcc);
        Ok(mfcc)
    }

    /// Raw MFCCs before per-frame rescaling
    pub fn mfcc(&self, samples: &[f32]) -> Result<FeatureMatrix, FeatureError> {
        let log_mel = self.log_mel_spectrogram(samples)?;
        let frames = log_mel.len();

        let mut out = vec![vec![0.0f32; frames]; self.config.coefficient_count];
        for (t, mel_frame) in log_mel.iter().enumerate() {
            for (k, basis) in self.dct.iter().enumerate() {
                let c: f64 = basis.iter().zip(mel_frame).map(|(b, m)| b * m).sum();
                out[k][t] = c as f32;
            }
        }
        Ok(out)
    }

    /// Mel power spectrogram in dB, frame-major `[frames][num_mels]`
    fn log_mel_spectrogram(&self, samples: &[f32]) -> Result<Vec<Vec<f64>>, FeatureError> {
        let n_fft = self.config.fft_size;
        let hop = self.config.hop_size;
        let pad = n_fft / 2;

        // Center frames on their hop position with silent padding at both ends
        let mut padded = vec![0.0f64; samples.len() + n_fft];
        for (dst, &src) in padded[pad..pad + samples.len()].iter_mut().zip(samples) {
            *dst = src as f64;
        }

        let num_frames = self.config.frame_count(samples.len());
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        let mut frames = Vec::with_capacity(num_frames);
        for t in 0..num_frames {
            let start = t * hop;
            for (i, slot) in input.iter_mut().enumerate() {
                *slot = padded[start + i] * self.window[i];
            }

            self.fft
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            let power: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
            let mel_frame: Vec<f64> = self
                .mel_bank
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    power_to_db(energy)
                })
                .collect();
            frames.push(mel_frame);
        }

        if let Some(top_db) = self.config.top_db {
            let peak = frames
                .iter()
                .flatten()
                .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
            let floor = peak - top_db;
            for v in frames.iter_mut().flatten() {
                *v = v.max(floor);
            }
        }

        Ok(frames)
    }
}

/// Convenience wrapper: MFCCs with the default frame parameters
pub fn extract_features(
    samples: &[f32],
    sample_rate: u32,
    coefficient_count: usize,
) -> Result<FeatureMatrix, FeatureError> {
    MfccExtractor::new(MfccConfig::with_rate(sample_rate, coefficient_count))?.extract(samples)
}

/// Power to decibels relative to 1.0, clamped at 1e-10 (-100 dB)
fn power_to_db(power: f64) -> f64 {
    10.0 * power.max(1e-10).log10()
}

/// Orthonormal DCT-II basis, `[coefficients][inputs]`
fn dct_basis(coefficients: usize, inputs: usize) -> Vec<Vec<f64>> {
    let n = inputs as f64;
    (0..coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..inputs)
                .map(|i| {
                    scale * (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos()
                })
                .collect()
        })
        .collect()
}

/// Scale each frame (column) so its largest absolute coefficient is 1.0.
/// Frames with a negligible peak are left as they are.
pub fn normalize_frames(matrix: &mut FeatureMatrix) {
    let frames = matrix.first().map_or(0, |row| row.len());

    for t in 0..frames {
        let peak = matrix.iter().fold(0.0f32, |acc, row| acc.max(row[t].abs()));
        if peak < f32::MIN_POSITIVE {
            continue;
        }
        for row in matrix.iter_mut() {
            row[t] /= peak;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_default_shape_for_five_second_clip() {
        let samples = sine(440.0, 22050, 110250);
        let features = extract_features(&samples, 22050, 40).unwrap();

        assert_eq!(features.len(), 40);
        assert!(features.iter().all(|row| row.len() == 216));
    }

    #[test]
    fn test_frames_are_rescaled_to_unit_peak() {
        let samples = sine(1000.0, 22050, 22050);
        let features = extract_features(&samples, 22050, 40).unwrap();

        for t in 0..features[0].len() {
            let peak = features.iter().fold(0.0f32, |acc, row| acc.max(row[t].abs()));
            assert!((peak - 1.0).abs() < 1e-5, "frame {} peak {}", t, peak);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let samples = sine(330.0, 22050, 22050);
        let extractor = MfccExtractor::new(MfccConfig::default()).unwrap();

        let first = extractor.extract(&samples).unwrap();
        let second = extractor.extract(&samples).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_silence_yields_finite_values() {
        let features = extract_features(&vec![0.0; 22050], 22050, 40).unwrap();
        assert!(features.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_normalize_frames_skips_zero_columns() {
        let mut matrix = vec![vec![2.0, 0.0], vec![-4.0, 0.0]];
        normalize_frames(&mut matrix);
        assert_eq!(matrix, vec![vec![0.5, 0.0], vec![-1.0, 0.0]]);
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_basis(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f64 = basis[a].iter().zip(&basis[b]).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_invalid_coefficient_count_rejected() {
        let config = MfccConfig {
            coefficient_count: 200,
            ..Default::default()
        };
        assert!(matches!(
            MfccExtractor::new(config),
            Err(FeatureError::InvalidConfig(_))
        ));
    }
}
