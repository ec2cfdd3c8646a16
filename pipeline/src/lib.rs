//! CIFAR pyramid preparation pipeline
//!
//! Builds a coarse→fine label taxonomy from the CIFAR-100 training corpus,
//! partitions the corpus into joint, gate and test collections with routing
//! flags, and normalizes every split with training-split statistics.
//!
//! # Modules
//!
//! - [`corpus`]: raw splits, the [`corpus::CorpusSource`] seam, CIFAR binary loader
//! - [`taxonomy`]: taxonomy construction and cache rebuild
//! - [`partition`]: joint/gate/test partitioning with routing flags
//! - [`normalize`]: train-fitted centering and scaling
//! - [`encode`]: seeded shuffling, hold-out splits, one-hot targets
//! - [`datasets`]: dataset-level entry points
//! - [`config`]: YAML configuration loading

pub mod config;
pub mod corpus;
pub mod datasets;
pub mod encode;
pub mod normalize;
pub mod partition;
pub mod taxonomy;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::corpus::{
        CifarBinaryLoader, CorpusSource, FlatCorpus, HierarchicalCorpus, InMemoryCorpus,
        LabeledSplit, Split,
    };
    pub use crate::datasets::{load_classification, prepare_pyramid, ClassificationData, PyramidData};
    pub use crate::normalize::Normalizer;
    pub use crate::partition::{partition, LabelSets, PyramidPartition, RoutedSplit};
    pub use crate::taxonomy::{build_taxonomy, rebuild_taxonomy};
    pub use pyramid_core::{
        DatasetId, LabelNames, LabelPair, PipelineConfig, PyramidError, Route, Taxonomy,
        TaxonomyStore,
    };
    pub use pyramid_storage::{FileTaxonomyStore, InMemoryTaxonomyStore};
}
