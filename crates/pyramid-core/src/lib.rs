//! Core types and traits for the CIFAR pyramid pipeline.
//!
//! This crate holds everything the other crates agree on: label identifiers,
//! the coarse→fine [`Taxonomy`], routing flags, the closed set of supported
//! datasets, pipeline configuration and the shared error type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// The `[fine, coarse]` label ids carried by every hierarchical sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelPair {
    /// Fine (subclass) label id.
    pub fine: u32,
    /// Coarse (superclass) label id.
    pub coarse: u32,
}

impl LabelPair {
    /// Create a label pair.
    pub fn new(fine: u32, coarse: u32) -> Self {
        Self { fine, coarse }
    }
}

/// Label granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// Most specific class.
    Fine,
    /// Superclass grouping several fine labels.
    Coarse,
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Fine => write!(f, "fine"),
            LabelKind::Coarse => write!(f, "coarse"),
        }
    }
}

/// Id→name lookup tables for both label granularities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNames {
    /// Fine label names indexed by fine id.
    pub fine: Vec<String>,
    /// Coarse label names indexed by coarse id.
    pub coarse: Vec<String>,
}

impl LabelNames {
    /// Create lookup tables from the two name lists.
    pub fn new(fine: Vec<String>, coarse: Vec<String>) -> Self {
        Self { fine, coarse }
    }

    /// Name of a fine label id.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::UnknownLabelId`] if `id` is outside the table.
    pub fn fine_name(&self, id: u32) -> Result<&str> {
        lookup(&self.fine, LabelKind::Fine, id)
    }

    /// Name of a coarse label id.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::UnknownLabelId`] if `id` is outside the table.
    pub fn coarse_name(&self, id: u32) -> Result<&str> {
        lookup(&self.coarse, LabelKind::Coarse, id)
    }
}

fn lookup(table: &[String], kind: LabelKind, id: u32) -> Result<&str> {
    table
        .get(id as usize)
        .map(String::as_str)
        .ok_or(PyramidError::UnknownLabelId { kind, id })
}

/// Per-sample routing flag: which granularity the model is expected to predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Predict the fine label (flag `0`).
    Fine,
    /// Predict the coarse label (flag `1`).
    Coarse,
}

impl Route {
    /// Numeric flag consumed by the training loop.
    pub fn flag(self) -> u8 {
        match self {
            Route::Fine => 0,
            Route::Coarse => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Coarse label name → lexicographically sorted fine label names.
///
/// Keys iterate in sorted order. Bucket contents are kept exactly as given,
/// so a taxonomy loaded from a cache compares equal to the one that was saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxonomy {
    buckets: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// Create an empty taxonomy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a taxonomy from raw buckets, sorting and deduplicating each one.
    pub fn from_buckets<I, K, V>(buckets: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let buckets = buckets
            .into_iter()
            .map(|(coarse, fines)| {
                let mut fines: Vec<String> = fines.into_iter().map(Into::into).collect();
                fines.sort();
                fines.dedup();
                (coarse.into(), fines)
            })
            .collect();
        Self { buckets }
    }

    /// Fine names observed under `coarse`, if any.
    pub fn fine_labels(&self, coarse: &str) -> Option<&[String]> {
        self.buckets.get(coarse).map(Vec::as_slice)
    }

    /// Iterate `(coarse, fines)` in coarse-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.buckets
            .iter()
            .map(|(coarse, fines)| (coarse.as_str(), fines.as_slice()))
    }

    /// Coarse label names in sorted order.
    pub fn coarse_labels(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Number of coarse buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no bucket exists.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of fine labels across all buckets.
    pub fn fine_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Persistent home of the taxonomy.
///
/// `save` fully replaces whatever was stored before; `load` fails with
/// [`PyramidError::TaxonomyNotFound`] when nothing has been saved yet.
pub trait TaxonomyStore: Send + Sync {
    /// Persist `taxonomy`, replacing any previous state.
    fn save(&self, taxonomy: &Taxonomy) -> Result<()>;

    /// Load the previously saved taxonomy.
    fn load(&self) -> Result<Taxonomy>;

    /// Human-readable location, used in log lines.
    fn location(&self) -> String;
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// Datasets the pipeline knows how to prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetId {
    /// CIFAR-10, flat labels.
    Cifar10,
    /// CIFAR-100 restricted to the 20 coarse labels.
    Cifar100Coarse,
    /// CIFAR-100 restricted to the 100 fine labels.
    Cifar100Fine,
    /// Joint split of the pyramid partition, fine labels only.
    Cifar100JointFineOnly,
}

impl DatasetId {
    /// Every supported dataset.
    pub const ALL: [DatasetId; 4] = [
        DatasetId::Cifar10,
        DatasetId::Cifar100Coarse,
        DatasetId::Cifar100Fine,
        DatasetId::Cifar100JointFineOnly,
    ];

    /// Identifier used on the command line and in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetId::Cifar10 => "cifar10",
            DatasetId::Cifar100Coarse => "cifar100_coarse",
            DatasetId::Cifar100Fine => "cifar100_fine",
            DatasetId::Cifar100JointFineOnly => "cifar100_joint_fine_only",
        }
    }

    /// Width of the one-hot target vector.
    pub fn n_classes(self) -> usize {
        match self {
            DatasetId::Cifar10 => 10,
            DatasetId::Cifar100Coarse => 20,
            DatasetId::Cifar100Fine | DatasetId::Cifar100JointFineOnly => 100,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = PyramidError;

    fn from_str(s: &str) -> Result<Self> {
        DatasetId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| PyramidError::UnknownDatasetIdentifier(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level pipeline configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw corpus locations and split sizes.
    #[serde(default)]
    pub data: DataConfig,
    /// Taxonomy cache settings.
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    /// Per-bucket partition sizes.
    #[serde(default)]
    pub partition: PartitionConfig,
    /// Normalization settings.
    #[serde(default)]
    pub normalization: NormalizationConfig,
    /// Seed for every shuffle performed after partitioning.
    #[serde(default = "default_shuffle_seed")]
    pub shuffle_seed: u64,
    /// Fraction of the joint split kept for training by `cifar100_joint_fine_only`.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_shuffle_seed() -> u64 {
    42
}

fn default_holdout_fraction() -> f64 {
    0.85
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            partition: PartitionConfig::default(),
            normalization: NormalizationConfig::default(),
            shuffle_seed: default_shuffle_seed(),
            holdout_fraction: default_holdout_fraction(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the pipeline cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.partition.validate()?;
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(PyramidError::Config(format!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if !(self.normalization.epsilon >= 0.0) {
            return Err(PyramidError::Config(format!(
                "normalization.epsilon must be non-negative, got {}",
                self.normalization.epsilon
            )));
        }
        Ok(())
    }
}

/// Raw corpus locations and how many samples of each split to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of the CIFAR-10 binary distribution.
    #[serde(default = "default_cifar10_dir")]
    pub cifar10_dir: PathBuf,
    /// Directory of the CIFAR-100 binary distribution.
    #[serde(default = "default_cifar100_dir")]
    pub cifar100_dir: PathBuf,
    /// Leading training samples kept for training.
    #[serde(default = "default_num_training")]
    pub num_training: usize,
    /// Training samples after `num_training` kept for validation.
    #[serde(default)]
    pub num_validation: usize,
    /// Leading test samples kept for testing.
    #[serde(default = "default_num_test")]
    pub num_test: usize,
}

fn default_cifar10_dir() -> PathBuf {
    PathBuf::from("data/cifar-10-batches-bin")
}

fn default_cifar100_dir() -> PathBuf {
    PathBuf::from("data/cifar-100-binary")
}

fn default_num_training() -> usize {
    50_000
}

fn default_num_test() -> usize {
    10_000
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cifar10_dir: default_cifar10_dir(),
            cifar100_dir: default_cifar100_dir(),
            num_training: default_num_training(),
            num_validation: 0,
            num_test: default_num_test(),
        }
    }
}

/// Where the taxonomy cache lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Path of the JSON cache, relative to the working directory.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("coarse_to_fine_map.json")
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
        }
    }
}

/// How each coarse bucket is divided between the joint, gate and test-only sets.
///
/// The first `joint_per_bucket` sorted names go to the joint set, the first
/// `gate_per_bucket` to the gate set, and the rest to the test-only set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Names per bucket exposed to the joint classifier.
    #[serde(default = "default_joint_per_bucket")]
    pub joint_per_bucket: usize,
    /// Names per bucket used to train the routing gate.
    #[serde(default = "default_gate_per_bucket")]
    pub gate_per_bucket: usize,
    /// Exact number of fine names every bucket must hold.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: usize,
}

fn default_joint_per_bucket() -> usize {
    2
}

fn default_gate_per_bucket() -> usize {
    4
}

fn default_bucket_size() -> usize {
    5
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            joint_per_bucket: default_joint_per_bucket(),
            gate_per_bucket: default_gate_per_bucket(),
            bucket_size: default_bucket_size(),
        }
    }
}

impl PartitionConfig {
    /// Require `0 < joint <= gate < bucket_size`.
    pub fn validate(&self) -> Result<()> {
        if self.joint_per_bucket == 0
            || self.joint_per_bucket > self.gate_per_bucket
            || self.gate_per_bucket >= self.bucket_size
        {
            return Err(PyramidError::Config(format!(
                "partition sizes must satisfy 0 < joint ({}) <= gate ({}) < bucket ({})",
                self.joint_per_bucket, self.gate_per_bucket, self.bucket_size
            )));
        }
        Ok(())
    }
}

/// Centering/scaling settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Apply normalization at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Added to the scale before dividing.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_true() -> bool {
    true
}

fn default_epsilon() -> f64 {
    1e-8
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            epsilon: default_epsilon(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` (human-readable) or `json` (structured).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum PyramidError {
    /// No taxonomy has been saved at the given location.
    #[error("Taxonomy not found at {path}; run `build-taxonomy` first")]
    TaxonomyNotFound {
        /// Location that was searched.
        path: String,
    },

    /// A coarse bucket does not hold the expected number of fine labels.
    #[error("Coarse label '{coarse}' has {found} fine labels, expected exactly {expected}")]
    SchemaViolation {
        /// Offending coarse label.
        coarse: String,
        /// Bucket size required by the partition policy.
        expected: usize,
        /// Bucket size actually present.
        found: usize,
    },

    /// The taxonomy holds no coarse bucket.
    #[error("Taxonomy is empty; rebuild it with `build-taxonomy`")]
    EmptyTaxonomy,

    /// A dataset name outside the supported set.
    #[error("Unknown dataset identifier: {0}")]
    UnknownDatasetIdentifier(String),

    /// A fine label was observed under two different coarse labels.
    #[error("Fine label '{fine}' appears under coarse labels '{first}' and '{second}'")]
    ConflictingCoarseLabel {
        /// Fine label name.
        fine: String,
        /// Coarse label it was first seen under.
        first: String,
        /// Coarse label it was later seen under.
        second: String,
    },

    /// A label id has no entry in the name table.
    #[error("Unknown {kind} label id {id}")]
    UnknownLabelId {
        /// Granularity of the id.
        kind: LabelKind,
        /// The id itself.
        id: u32,
    },

    /// A label does not fit the one-hot width.
    #[error("Label {label} out of range for {n_classes} classes")]
    LabelOutOfRange {
        /// The label value.
        label: u32,
        /// Number of classes of the encoding.
        n_classes: usize,
    },

    /// A split that must hold samples is empty.
    #[error("Split '{split}' is empty")]
    EmptySplit {
        /// Name of the split.
        split: String,
    },

    /// Malformed or unavailable raw corpus.
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Tensor library failure.
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for `std::result::Result<T, PyramidError>`.
pub type Result<T> = std::result::Result<T, PyramidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_names_lookup() {
        let names = LabelNames::new(
            vec!["apple".to_string(), "maple".to_string()],
            vec!["fruit".to_string()],
        );
        assert_eq!(names.fine_name(1).unwrap(), "maple");
        assert_eq!(names.coarse_name(0).unwrap(), "fruit");
        assert!(matches!(
            names.coarse_name(3),
            Err(PyramidError::UnknownLabelId {
                kind: LabelKind::Coarse,
                id: 3
            })
        ));
    }

    #[test]
    fn test_route_flags() {
        assert_eq!(Route::Fine.flag(), 0);
        assert_eq!(Route::Coarse.flag(), 1);
    }

    #[test]
    fn test_taxonomy_from_buckets_sorts() {
        let taxonomy = Taxonomy::from_buckets(vec![
            ("trees", vec!["willow", "maple", "oak"]),
            ("flowers", vec!["tulip", "rose", "orchid"]),
        ]);
        assert_eq!(taxonomy.len(), 2);
        assert_eq!(taxonomy.fine_count(), 6);
        assert_eq!(
            taxonomy.fine_labels("trees").unwrap(),
            &["maple".to_string(), "oak".to_string(), "willow".to_string()]
        );
        let coarse: Vec<&str> = taxonomy.coarse_labels().collect();
        assert_eq!(coarse, vec!["flowers", "trees"]);
    }

    #[test]
    fn test_taxonomy_serializes_as_plain_map() {
        let taxonomy = Taxonomy::from_buckets(vec![("c0", vec!["b", "a"])]);
        let json = serde_json::to_string(&taxonomy).unwrap();
        assert_eq!(json, r#"{"c0":["a","b"]}"#);
    }

    #[test]
    fn test_dataset_id_parse() {
        for id in DatasetId::ALL {
            assert_eq!(id.as_str().parse::<DatasetId>().unwrap(), id);
        }
        assert_eq!(DatasetId::Cifar100Coarse.n_classes(), 20);
        assert_eq!(DatasetId::Cifar100JointFineOnly.n_classes(), 100);
    }

    #[test]
    fn test_dataset_id_unknown() {
        let err = "imagenet".parse::<DatasetId>().unwrap_err();
        assert!(matches!(err, PyramidError::UnknownDatasetIdentifier(ref s) if s == "imagenet"));
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.partition.joint_per_bucket, 2);
        assert_eq!(config.partition.gate_per_bucket, 4);
        assert_eq!(config.partition.bucket_size, 5);
        assert_eq!(config.normalization.epsilon, 1e-8);
        assert_eq!(
            config.taxonomy.cache_path,
            PathBuf::from("coarse_to_fine_map.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_empty_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partition_config_rejects_bad_sizes() {
        let config = PartitionConfig {
            joint_per_bucket: 3,
            gate_per_bucket: 2,
            bucket_size: 5,
        };
        assert!(matches!(config.validate(), Err(PyramidError::Config(_))));

        let config = PartitionConfig {
            joint_per_bucket: 2,
            gate_per_bucket: 5,
            bucket_size: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_rejects_bad_holdout() {
        let config = PipelineConfig {
            holdout_fraction: 1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = PyramidError::SchemaViolation {
            coarse: "trees".to_string(),
            expected: 5,
            found: 4,
        };
        assert_eq!(
            err.to_string(),
            "Coarse label 'trees' has 4 fine labels, expected exactly 5"
        );
        assert_eq!(
            PyramidError::EmptyTaxonomy.to_string(),
            "Taxonomy is empty; rebuild it with `build-taxonomy`"
        );
    }
}
