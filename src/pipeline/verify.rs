// Cache completeness check
// Read-only reconciliation of the manifest against the feature cache

use serde::Serialize;
use std::fmt;

use crate::manifest::Manifest;
use crate::state::CacheStore;

/// Corpus-wide completeness summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyReport {
    pub total: usize,

    /// Rows without a usable entry (corrupt entries included in deep mode)
    pub missing: usize,

    /// Entries present on disk that failed to load; always 0 for shallow checks
    pub corrupt: usize,

    /// Percentage of rows with an entry. An empty manifest reports 100.0.
    pub success_rate: f64,
}

impl VerifyReport {
    fn from_counts(total: usize, missing: usize, corrupt: usize) -> Self {
        let success_rate = if total == 0 {
            100.0
        } else {
            (total - missing) as f64 / total as f64 * 100.0
        };

        VerifyReport {
            total,
            missing,
            corrupt,
            success_rate,
        }
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total files: {}", self.total)?;
        writeln!(f, "Missing processed files: {}", self.missing)?;
        if self.corrupt > 0 {
            writeln!(f, "Corrupt processed files: {}", self.corrupt)?;
        }
        write!(f, "Success rate: {:.2}%", self.success_rate)
    }
}

pub struct Verifier<'a> {
    store: &'a CacheStore,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a CacheStore) -> Self {
        Verifier { store }
    }

    /// Count rows whose cache entry exists
    pub fn verify(&self, manifest: &Manifest) -> VerifyReport {
        let missing = manifest
            .iter()
            .filter(|row| !self.store.exists(row.fold, &row.filename))
            .count();

        VerifyReport::from_counts(manifest.len(), missing, 0)
    }

    /// Like `verify`, but entries must also load cleanly; corrupt ones count as missing
    pub fn verify_deep(&self, manifest: &Manifest) -> VerifyReport {
        let mut missing = 0;
        let mut corrupt = 0;

        for row in manifest {
            if !self.store.exists(row.fold, &row.filename) {
                missing += 1;
                continue;
            }
            if let Err(e) = self.store.read(row.fold, &row.filename) {
                log::warn!("Counting fold{}/{} as missing: {}", row.fold, row.filename, e);
                missing += 1;
                corrupt += 1;
            }
        }

        VerifyReport::from_counts(manifest.len(), missing, corrupt)
    }
}
