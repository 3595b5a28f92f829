// Audio processing module
// Clip decoding, fixed-length normalization and MFCC extraction

pub mod features;
pub mod ingest;
pub mod mel;
pub mod normalize;
pub mod resample;

pub use features::{extract_features, FeatureError, FeatureMatrix, MfccConfig, MfccExtractor};
pub use ingest::{ingest_file, ingest_wav, AudioData, AudioError};
pub use normalize::{fit_to_length, normalize, DecodeFailure, NormalizeConfig, NormalizedAudio};
