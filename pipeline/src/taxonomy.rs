//! Derive the coarse→fine taxonomy from a labeled training split.

use crate::corpus::{CorpusSource, LabeledSplit};
use pyramid_core::{LabelNames, PyramidError, Result, Taxonomy, TaxonomyStore};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

/// Scan `train` once and collect, per coarse label name, the fine label
/// names observed under it. Buckets come out sorted lexicographically, so the
/// result does not depend on sample order.
///
/// # Errors
///
/// - [`PyramidError::UnknownLabelId`] if a label id has no name.
/// - [`PyramidError::ConflictingCoarseLabel`] if a fine label shows up under
///   two coarse labels.
pub fn build_taxonomy(train: &LabeledSplit, names: &LabelNames) -> Result<Taxonomy> {
    let mut buckets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut owner: HashMap<&str, &str> = HashMap::new();

    for label in &train.labels {
        let coarse = names.coarse_name(label.coarse)?;
        let fine = names.fine_name(label.fine)?;

        match owner.get(fine) {
            Some(&first) if first != coarse => {
                return Err(PyramidError::ConflictingCoarseLabel {
                    fine: fine.to_string(),
                    first: first.to_string(),
                    second: coarse.to_string(),
                });
            }
            Some(_) => {}
            None => {
                owner.insert(fine, coarse);
            }
        }

        buckets.entry(coarse).or_default().insert(fine);
    }

    let taxonomy = Taxonomy::from_buckets(
        buckets
            .into_iter()
            .map(|(coarse, fines)| (coarse, fines.into_iter().collect::<Vec<_>>())),
    );
    info!(
        samples = train.len(),
        coarse_labels = taxonomy.len(),
        fine_labels = taxonomy.fine_count(),
        "Built taxonomy"
    );
    Ok(taxonomy)
}

/// Rescan the hierarchical training corpus and overwrite the cached taxonomy.
pub fn rebuild_taxonomy(source: &dyn CorpusSource, store: &dyn TaxonomyStore) -> Result<Taxonomy> {
    let corpus = source.load_hierarchical()?;
    let taxonomy = build_taxonomy(&corpus.train, &corpus.names)?;
    store.save(&taxonomy)?;
    info!(location = %store.location(), "Taxonomy cache rebuilt");
    Ok(taxonomy)
}
