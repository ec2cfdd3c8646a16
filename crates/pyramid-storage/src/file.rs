//! JSON file taxonomy cache.
//!
//! The whole taxonomy is written as one pretty-printed JSON object mapping
//! coarse label names to their sorted fine label names. `save` writes a
//! temporary file next to the cache and renames it into place, so a reader
//! sees either the previous file or the new one. There is no locking between
//! concurrent writers; the last rename wins.

use pyramid_core::{PyramidError, Result, Taxonomy, TaxonomyStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Taxonomy cache backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileTaxonomyStore {
    path: PathBuf,
}

impl FileTaxonomyStore {
    /// Create a store rooted at `path`. Nothing is touched until `save`/`load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaxonomyStore for FileTaxonomyStore {
    fn save(&self, taxonomy: &Taxonomy) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(taxonomy)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            PyramidError::Storage(format!(
                "Failed to move taxonomy into {}: {}",
                self.path.display(),
                e.error
            ))
        })?;
        info!(
            path = %self.path.display(),
            coarse_labels = taxonomy.len(),
            fine_labels = taxonomy.fine_count(),
            "Saved taxonomy"
        );
        Ok(())
    }

    fn load(&self) -> Result<Taxonomy> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PyramidError::TaxonomyNotFound {
                    path: self.path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let taxonomy: Taxonomy = serde_json::from_str(&contents)?;
        debug!(
            path = %self.path.display(),
            coarse_labels = taxonomy.len(),
            "Loaded taxonomy"
        );
        Ok(taxonomy)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
