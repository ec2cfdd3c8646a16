//! In-memory taxonomy store for testing.
//!
//! Data is lost when the struct is dropped.

use pyramid_core::{PyramidError, Result, Taxonomy, TaxonomyStore};
use std::sync::RwLock;

/// Process-local taxonomy store.
#[derive(Debug, Default)]
pub struct InMemoryTaxonomyStore {
    taxonomy: RwLock<Option<Taxonomy>>,
}

impl InMemoryTaxonomyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `taxonomy`.
    pub fn with_taxonomy(taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy: RwLock::new(Some(taxonomy)),
        }
    }
}

impl TaxonomyStore for InMemoryTaxonomyStore {
    fn save(&self, taxonomy: &Taxonomy) -> Result<()> {
        let mut slot = self
            .taxonomy
            .write()
            .map_err(|_| PyramidError::Storage("taxonomy lock poisoned".to_string()))?;
        *slot = Some(taxonomy.clone());
        Ok(())
    }

    fn load(&self) -> Result<Taxonomy> {
        let slot = self
            .taxonomy
            .read()
            .map_err(|_| PyramidError::Storage("taxonomy lock poisoned".to_string()))?;
        slot.clone().ok_or_else(|| PyramidError::TaxonomyNotFound {
            path: self.location(),
        })
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
