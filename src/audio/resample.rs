// Sample rate conversion
// Wraps rubato's FFT resampler for whole-clip, single-channel conversion

use rubato::{FftFixedInOut, Resampler};

use crate::audio::AudioError;

/// Frames fed to the resampler per processing block
const CHUNK_SIZE: usize = 1024;

/// Resample a mono clip from `from_rate` to `to_rate`.
///
/// The output holds `ceil(len * to_rate / from_rate)` samples with the
/// resampler's group delay removed, so the clip stays aligned with its source.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::InvalidData);
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut chunk = Vec::with_capacity(resampler.input_frames_max());
    let mut pos = 0;

    // Keep feeding (zero-padded once the input runs out) until the delayed tail is flushed
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(samples.len());

        chunk.clear();
        chunk.extend_from_slice(&samples[pos..end]);
        chunk.resize(needed, 0.0);
        pos = end;

        let processed = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}
