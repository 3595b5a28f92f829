// Feature index construction
// Lists every manifest row that has a cached record, rebuilt from scratch each run

use std::path::Path;

use crate::manifest::{write_index, FeatureIndexRow, IndexError, Manifest};
use crate::state::CacheStore;

pub struct IndexBuilder<'a> {
    store: &'a CacheStore,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(store: &'a CacheStore) -> Self {
        IndexBuilder { store }
    }

    /// One index row per manifest row whose cache entry exists, in manifest order
    pub fn build(&self, manifest: &Manifest) -> Vec<FeatureIndexRow> {
        manifest
            .iter()
            .filter_map(|row| {
                let path = self.store.path_for(row.fold, &row.filename);
                if !path.is_file() {
                    return None;
                }

                Some(FeatureIndexRow {
                    original_file: row.filename.clone(),
                    fold: row.fold,
                    class_label: row.class_label.clone(),
                    class_id: row.class_id,
                    mfcc_path: path.to_string_lossy().into_owned(),
                })
            })
            .collect()
    }

    /// Build the index and write it to `index_path`, returning the row count
    pub fn build_and_write(&self, manifest: &Manifest, index_path: &Path) -> Result<usize, IndexError> {
        let rows = self.build(manifest);
        write_index(index_path, &rows)?;

        log::info!(
            "Wrote feature index with {} of {} rows to {}",
            rows.len(),
            manifest.len(),
            index_path.display()
        );
        Ok(rows.len())
    }
}
