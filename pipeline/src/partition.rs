//! Split the hierarchical corpus into the joint, gate and test collections.
//!
//! Each coarse bucket of the taxonomy holds exactly `bucket_size` sorted fine
//! names. The first `joint_per_bucket` go to the joint set, the first
//! `gate_per_bucket` to the gate set, the remainder to the test-only set.
//!
//! | Output | Source | Filter | Route |
//! |--------|--------|--------|-------|
//! | `joint` | train | fine name in joint set | none |
//! | `gate` | train | fine name in gate set | fine if in joint set, else coarse |
//! | `test` | test | none | fine if in joint set, else coarse |
//!
//! Gate routes exist only for samples that passed the gate filter, while every
//! test sample gets one from joint membership alone. A gate-only label is thus
//! routed coarse in both places, and a test-only label is routed coarse at
//! test time without ever having been seen by the gate.

use crate::corpus::{HierarchicalCorpus, LabeledSplit};
use pyramid_core::{PartitionConfig, PyramidError, Result, Route, Taxonomy};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Global fine-label sets derived from a taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSets {
    /// Fine labels the joint classifier is trained on.
    pub joint: BTreeSet<String>,
    /// Fine labels used to train the routing gate. Superset of `joint`.
    pub gate: BTreeSet<String>,
    /// Fine labels only ever seen at test time.
    pub test_only: BTreeSet<String>,
}

impl LabelSets {
    /// Derive the three sets from `taxonomy` under `policy`.
    ///
    /// A taxonomy read back from a cache is checked again here: every bucket
    /// must hold `policy.bucket_size` distinct names, and no fine name may sit
    /// under two coarse labels.
    ///
    /// # Errors
    ///
    /// - [`PyramidError::EmptyTaxonomy`] if there is no bucket at all.
    /// - [`PyramidError::SchemaViolation`] for the first bucket whose count of
    ///   distinct names differs from `policy.bucket_size`.
    /// - [`PyramidError::ConflictingCoarseLabel`] for a fine name shared by
    ///   two buckets.
    /// - [`PyramidError::Config`] for an inconsistent policy.
    pub fn derive(taxonomy: &Taxonomy, policy: &PartitionConfig) -> Result<Self> {
        policy.validate()?;
        if taxonomy.is_empty() {
            return Err(PyramidError::EmptyTaxonomy);
        }

        let mut owner: HashMap<&str, &str> = HashMap::new();
        let mut sets = LabelSets::default();
        for (coarse, fines) in taxonomy.iter() {
            let distinct: BTreeSet<&str> = fines.iter().map(String::as_str).collect();
            if fines.len() != policy.bucket_size || distinct.len() != fines.len() {
                return Err(PyramidError::SchemaViolation {
                    coarse: coarse.to_string(),
                    expected: policy.bucket_size,
                    found: distinct.len(),
                });
            }
            for fine in distinct {
                if let Some(first) = owner.insert(fine, coarse) {
                    return Err(PyramidError::ConflictingCoarseLabel {
                        fine: fine.to_string(),
                        first: first.to_string(),
                        second: coarse.to_string(),
                    });
                }
            }
            sets.joint
                .extend(fines[..policy.joint_per_bucket].iter().cloned());
            sets.gate
                .extend(fines[..policy.gate_per_bucket].iter().cloned());
            sets.test_only
                .extend(fines[policy.gate_per_bucket..].iter().cloned());
        }
        Ok(sets)
    }

    /// Fine when `fine` is a joint label, coarse otherwise.
    fn route(&self, fine: &str) -> Route {
        if self.joint.contains(fine) {
            Route::Fine
        } else {
            Route::Coarse
        }
    }
}

/// A split whose samples each carry a routing flag.
#[derive(Debug, Clone)]
pub struct RoutedSplit {
    /// Images and `[fine, coarse]` labels.
    pub split: LabeledSplit,
    /// One route per sample.
    pub routes: Vec<Route>,
}

impl RoutedSplit {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no sample is present.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Numeric routing flags (`0` fine, `1` coarse).
    pub fn flags(&self) -> Vec<u8> {
        self.routes.iter().map(|r| r.flag()).collect()
    }

    /// Count of samples routed to `route`.
    pub fn count(&self, route: Route) -> usize {
        self.routes.iter().filter(|&&r| r == route).count()
    }
}

/// Result of [`partition`]. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct PyramidPartition {
    /// The sets the filters were computed from.
    pub sets: LabelSets,
    /// Training samples for the joint fine+coarse classifier.
    pub joint: LabeledSplit,
    /// Training samples for the routing gate.
    pub gate: RoutedSplit,
    /// Every test sample, with its route.
    pub test: RoutedSplit,
}

/// Partition `corpus` according to `taxonomy` and `policy`.
///
/// Outputs keep the scan order of their source split. Inputs are not
/// modified.
///
/// # Errors
///
/// Everything [`LabelSets::derive`] rejects, plus
/// [`PyramidError::EmptySplit`] when a non-empty training split has no
/// sample with a joint label, which happens when the taxonomy was built from
/// a different corpus.
pub fn partition(
    corpus: &HierarchicalCorpus,
    taxonomy: &Taxonomy,
    policy: &PartitionConfig,
) -> Result<PyramidPartition> {
    let sets = LabelSets::derive(taxonomy, policy)?;

    let mut joint_idx = Vec::new();
    let mut gate_idx = Vec::new();
    let mut gate_routes = Vec::new();
    for (i, label) in corpus.train.labels.iter().enumerate() {
        let fine = corpus.names.fine_name(label.fine)?;
        if sets.joint.contains(fine) {
            joint_idx.push(i);
        }
        if sets.gate.contains(fine) {
            gate_idx.push(i);
            gate_routes.push(sets.route(fine));
        }
    }

    let test_routes = corpus
        .test
        .labels
        .iter()
        .map(|label| Ok(sets.route(corpus.names.fine_name(label.fine)?)))
        .collect::<Result<Vec<_>>>()?;

    if joint_idx.is_empty() && !corpus.train.is_empty() {
        return Err(PyramidError::EmptySplit {
            split: "joint".to_string(),
        });
    }

    let joint = corpus.train.select(&joint_idx)?;
    let gate = RoutedSplit {
        split: corpus.train.select(&gate_idx)?,
        routes: gate_routes,
    };
    let test = RoutedSplit {
        split: corpus.test.clone(),
        routes: test_routes,
    };

    info!(
        joint_labels = sets.joint.len(),
        gate_labels = sets.gate.len(),
        test_only_labels = sets.test_only.len(),
        joint_samples = joint.len(),
        gate_samples = gate.len(),
        test_samples = test.len(),
        "Partitioned corpus"
    );

    Ok(PyramidPartition {
        sets,
        joint,
        gate,
        test,
    })
}
