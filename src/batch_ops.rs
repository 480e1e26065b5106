//! Parallel extraction of many catalog entries.
//!
//! Workers share only the read-only class key ring and backup directory;
//! each file owns its output, so one failure never touches another file.

use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::backup::BackupDirectory;
use crate::catalog::CatalogEntry;
use crate::decryptor::extract_entry_to;
use crate::error::BackupError;
use crate::keyring::ClassKeyRing;

/// Result of extracting one entry.
#[derive(Debug)]
pub struct ExtractOutcome {
    pub entry: CatalogEntry,
    pub destination: PathBuf,
    /// Bytes written, or why this file failed.
    pub result: Result<u64, BackupError>,
}

/// `out_dir/<domain>/<relative_path>`, refusing paths that climb out of `out_dir`.
pub fn output_path(out_dir: &Path, entry: &CatalogEntry) -> Result<PathBuf, BackupError> {
    let mut path = out_dir.to_path_buf();
    for part in [entry.domain.as_str(), entry.relative_path.as_str()] {
        for component in Path::new(part).components() {
            match component {
                Component::Normal(c) => path.push(c),
                Component::CurDir => {}
                _ => return Err(BackupError::UnsafePath(format!("{}/{}", entry.domain, entry.relative_path))),
            }
        }
    }
    Ok(path)
}

pub fn extract_batch(
    source: &BackupDirectory,
    ring: &ClassKeyRing,
    entries: Vec<CatalogEntry>,
    out_dir: &Path,
) -> Vec<ExtractOutcome> {
    entries
        .into_par_iter()
        .map(|entry| {
            let (destination, result) = match output_path(out_dir, &entry) {
                Ok(dest) => {
                    let result = extract_entry_to(source, ring, &entry, &dest);
                    (dest, result)
                }
                Err(e) => (out_dir.to_path_buf(), Err(e)),
            };
            if let Err(e) = &result {
                warn!(file_id = %entry.file_id, path = %entry.relative_path, error = %e, "file extraction failed");
            }
            ExtractOutcome {
                entry,
                destination,
                result,
            }
        })
        .collect()
}
