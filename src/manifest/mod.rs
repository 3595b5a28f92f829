// Tabular inputs and outputs
// The corpus manifest (read-only) and the derived feature index

pub mod index;
pub mod reader;

pub use index::{read_index, write_index, FeatureIndexRow, IndexError};
pub use reader::{Manifest, ManifestError, ManifestRow, REQUIRED_COLUMNS};
