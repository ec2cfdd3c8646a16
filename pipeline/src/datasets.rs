//! Dataset-level entry points.
//!
//! [`prepare_pyramid`] produces the partitioned, normalized pyramid
//! collections. [`load_classification`] turns a [`DatasetId`] into shuffled,
//! one-hot encoded splits ready for a single-head classifier.

use crate::corpus::{CorpusSource, Split};
use crate::encode::{holdout, one_hot, shuffle};
use crate::normalize::Normalizer;
use crate::partition::{partition, PyramidPartition};
use candle_core::Tensor;
use pyramid_core::{DatasetId, PipelineConfig, Result, TaxonomyStore};
use tracing::info;

/// Partitioned pyramid collections plus the statistics they were normalized with.
#[derive(Debug, Clone)]
pub struct PyramidData {
    /// Joint, gate and test collections.
    pub partition: PyramidPartition,
    /// `None` when normalization is disabled.
    pub normalizer: Option<Normalizer>,
}

/// Load the hierarchical corpus and the cached taxonomy, partition, and
/// normalize every output with statistics from the raw training split.
///
/// A missing taxonomy is an error: the cache is never rebuilt implicitly.
pub fn prepare_pyramid(
    source: &dyn CorpusSource,
    store: &dyn TaxonomyStore,
    config: &PipelineConfig,
) -> Result<PyramidData> {
    config.validate()?;
    let corpus = source.load_hierarchical()?;
    let taxonomy = store.load()?;
    info!(location = %store.location(), coarse_labels = taxonomy.len(), "Using cached taxonomy");

    let mut partition = partition(&corpus, &taxonomy, &config.partition)?;

    if !config.normalization.enabled {
        return Ok(PyramidData {
            partition,
            normalizer: None,
        });
    }

    let normalizer = Normalizer::fit(&corpus.train.images, config.normalization.epsilon)?;
    info!(
        mean = normalizer.mean,
        scale = normalizer.scale,
        "Fitted normalization on training split"
    );
    partition.joint = partition
        .joint
        .with_images(normalizer.apply(&partition.joint.images)?)?;
    partition.gate.split = partition
        .gate
        .split
        .with_images(normalizer.apply(&partition.gate.split.images)?)?;
    partition.test.split = partition
        .test
        .split
        .with_images(normalizer.apply(&partition.test.split.images)?)?;

    Ok(PyramidData {
        partition,
        normalizer: Some(normalizer),
    })
}

/// A shuffled split with one-hot targets.
#[derive(Debug, Clone)]
pub struct EncodedSplit {
    /// Images, sample-major.
    pub images: Tensor,
    /// Integer labels, aligned with `images`.
    pub labels: Vec<u32>,
    /// `[N, n_classes]` one-hot targets.
    pub targets: Tensor,
}

impl EncodedSplit {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no sample is present.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Ready-to-train data for a single-head classifier.
#[derive(Debug, Clone)]
pub struct ClassificationData {
    /// Which dataset this is.
    pub dataset: DatasetId,
    /// Training split.
    pub train: EncodedSplit,
    /// Validation split (empty unless `data.num_validation > 0`).
    pub validation: EncodedSplit,
    /// Test split.
    pub test: EncodedSplit,
    /// Statistics used for normalization, if any.
    pub normalizer: Option<Normalizer>,
}

/// Load, split, normalize, shuffle and encode `dataset`.
///
/// `store` is only consulted by [`DatasetId::Cifar100JointFineOnly`].
pub fn load_classification(
    dataset: DatasetId,
    source: &dyn CorpusSource,
    store: &dyn TaxonomyStore,
    config: &PipelineConfig,
) -> Result<ClassificationData> {
    config.validate()?;
    info!(%dataset, "Loading dataset");

    let prepared = match dataset {
        DatasetId::Cifar10 => {
            let corpus = source.load_flat()?;
            subsample_and_normalize(&corpus.train, &corpus.test, config)?
        }
        DatasetId::Cifar100Coarse => {
            let corpus = source.load_hierarchical()?;
            subsample_and_normalize(
                &corpus.train.map_labels(|l| l.coarse),
                &corpus.test.map_labels(|l| l.coarse),
                config,
            )?
        }
        DatasetId::Cifar100Fine => {
            let corpus = source.load_hierarchical()?;
            subsample_and_normalize(
                &corpus.train.map_labels(|l| l.fine),
                &corpus.test.map_labels(|l| l.fine),
                config,
            )?
        }
        DatasetId::Cifar100JointFineOnly => {
            let pyramid = prepare_pyramid(source, store, config)?;
            let joint = pyramid.partition.joint.map_labels(|l| l.fine);
            let joint = shuffle(&joint, config.shuffle_seed)?;
            let (train, test) = holdout(&joint, config.holdout_fraction)?;
            let validation = train.take_range(0, 0)?;
            PreparedSplits {
                train,
                validation,
                test,
                normalizer: pyramid.normalizer,
            }
        }
    };

    let n_classes = dataset.n_classes();
    let seed = config.shuffle_seed;
    let data = ClassificationData {
        dataset,
        train: encode_split(&prepared.train, n_classes, seed)?,
        validation: encode_split(&prepared.validation, n_classes, seed.wrapping_add(1))?,
        test: encode_split(&prepared.test, n_classes, seed.wrapping_add(2))?,
        normalizer: prepared.normalizer,
    };
    info!(
        %dataset,
        n_classes,
        train = data.train.len(),
        validation = data.validation.len(),
        test = data.test.len(),
        "Dataset ready"
    );
    Ok(data)
}

/// Subsampled and normalized splits, still in corpus order.
struct PreparedSplits {
    train: Split<u32>,
    validation: Split<u32>,
    test: Split<u32>,
    normalizer: Option<Normalizer>,
}

/// First `num_training` samples train, the next `num_validation` validate,
/// first `num_test` test samples test. Statistics come from the train part.
fn subsample_and_normalize(
    train: &Split<u32>,
    test: &Split<u32>,
    config: &PipelineConfig,
) -> Result<PreparedSplits> {
    let data = &config.data;
    let validation = train.take_range(data.num_training, data.num_validation)?;
    let train = train.take_range(0, data.num_training)?;
    let test = test.take_range(0, data.num_test)?;

    if !config.normalization.enabled {
        return Ok(PreparedSplits {
            train,
            validation,
            test,
            normalizer: None,
        });
    }

    let normalizer = Normalizer::fit(&train.images, config.normalization.epsilon)?;
    Ok(PreparedSplits {
        train: train.with_images(normalizer.apply(&train.images)?)?,
        validation: validation.with_images(normalizer.apply(&validation.images)?)?,
        test: test.with_images(normalizer.apply(&test.images)?)?,
        normalizer: Some(normalizer),
    })
}

fn encode_split(split: &Split<u32>, n_classes: usize, seed: u64) -> Result<EncodedSplit> {
    let shuffled = shuffle(split, seed)?;
    let targets = one_hot(&shuffled.labels, n_classes)?;
    Ok(EncodedSplit {
        images: shuffled.images,
        labels: shuffled.labels,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{
        image_values, images_from_vec, index_images, FlatCorpus, HierarchicalCorpus, InMemoryCorpus,
    };
    use pyramid_core::{DataConfig, LabelNames, LabelPair, PyramidError, Taxonomy};
    use pyramid_storage::InMemoryTaxonomyStore;

    fn small_config(num_training: usize, num_validation: usize, num_test: usize) -> PipelineConfig {
        PipelineConfig {
            data: DataConfig {
                num_training,
                num_validation,
                num_test,
                ..DataConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    /// 20 training samples cycling through fine ids 0..10 (coarse = fine / 5).
    fn hierarchical_source() -> InMemoryCorpus {
        let train: Vec<LabelPair> = (0..20).map(|i| LabelPair::new(i % 10, (i % 10) / 5)).collect();
        let test: Vec<LabelPair> = (0..10).map(|i| LabelPair::new(i, i / 5)).collect();
        let corpus = HierarchicalCorpus {
            train: Split::new(index_images(20).unwrap(), train).unwrap(),
            test: Split::new(index_images(10).unwrap(), test).unwrap(),
            names: LabelNames::new(
                (0..10).map(|i| format!("f{i}")).collect(),
                vec!["c0".to_string(), "c1".to_string()],
            ),
        };
        InMemoryCorpus::new().with_hierarchical(corpus)
    }

    fn taxonomy_store() -> InMemoryTaxonomyStore {
        InMemoryTaxonomyStore::with_taxonomy(Taxonomy::from_buckets(vec![
            ("c0", vec!["f0", "f1", "f2", "f3", "f4"]),
            ("c1", vec!["f5", "f6", "f7", "f8", "f9"]),
        ]))
    }

    #[test]
    fn test_coarse_labels_and_subsampling() {
        let config = small_config(12, 4, 6);
        let data = load_classification(
            DatasetId::Cifar100Coarse,
            &hierarchical_source(),
            &InMemoryTaxonomyStore::new(),
            &config,
        )
        .unwrap();

        assert_eq!(data.train.len(), 12);
        assert_eq!(data.validation.len(), 4);
        assert_eq!(data.test.len(), 6);
        assert_eq!(data.train.targets.dims(), &[12, 20]);
        assert!(data.train.labels.iter().all(|&l| l < 2));

        // fitted on the 12 subsampled training images (values 0..12) only
        let normalizer = data.normalizer.unwrap();
        assert_eq!(normalizer.mean, 5.5);

        // validation holds samples 12..16, scaled with the training scalars
        let raw_validation = images_from_vec(vec![12.0, 13.0, 14.0, 15.0], 4, &[1, 1, 1]).unwrap();
        let mut expected = image_values(&normalizer.apply(&raw_validation).unwrap()).unwrap();
        let mut actual = image_values(&data.validation.images).unwrap();
        expected.sort_by(f32::total_cmp);
        actual.sort_by(f32::total_cmp);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_fine_labels_without_normalization() {
        let mut config = small_config(20, 0, 10);
        config.normalization.enabled = false;
        let data = load_classification(
            DatasetId::Cifar100Fine,
            &hierarchical_source(),
            &InMemoryTaxonomyStore::new(),
            &config,
        )
        .unwrap();

        assert!(data.normalizer.is_none());
        assert_eq!(data.train.targets.dims(), &[20, 100]);
        // un-normalized index images still line up with their labels
        let pixels = image_values(&data.test.images).unwrap();
        let labels: Vec<f32> = data.test.labels.iter().map(|&l| l as f32).collect();
        assert_eq!(pixels, labels);
    }

    #[test]
    fn test_cifar10_flat() {
        let corpus = FlatCorpus {
            train: Split::new(index_images(8).unwrap(), (0..8).collect()).unwrap(),
            test: Split::new(index_images(3).unwrap(), vec![9, 8, 7]).unwrap(),
            label_names: (0..10).map(|i| format!("class{i}")).collect(),
        };
        let source = InMemoryCorpus::new().with_flat(corpus);
        let data = load_classification(
            DatasetId::Cifar10,
            &source,
            &InMemoryTaxonomyStore::new(),
            &small_config(8, 0, 3),
        )
        .unwrap();
        assert_eq!(data.test.targets.dims(), &[3, 10]);
        let mut labels = data.test.labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, vec![7, 8, 9]);
    }

    #[test]
    fn test_request_larger_than_corpus() {
        let err = load_classification(
            DatasetId::Cifar100Fine,
            &hierarchical_source(),
            &InMemoryTaxonomyStore::new(),
            &small_config(50_000, 0, 10),
        )
        .unwrap_err();
        assert!(matches!(err, PyramidError::Config(_)));
    }

    #[test]
    fn test_joint_fine_only() {
        let data = load_classification(
            DatasetId::Cifar100JointFineOnly,
            &hierarchical_source(),
            &taxonomy_store(),
            &PipelineConfig::default(),
        )
        .unwrap();

        // joint labels f0, f1, f5, f6 appear twice each in the training split
        assert_eq!(data.train.len() + data.test.len(), 8);
        assert_eq!(data.train.len(), 6);
        assert!(data.validation.is_empty());
        assert!(data
            .train
            .labels
            .iter()
            .chain(data.test.labels.iter())
            .all(|l| [0, 1, 5, 6].contains(l)));
    }

    #[test]
    fn test_joint_fine_only_requires_taxonomy() {
        let err = load_classification(
            DatasetId::Cifar100JointFineOnly,
            &hierarchical_source(),
            &InMemoryTaxonomyStore::new(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PyramidError::TaxonomyNotFound { .. }));
    }

    #[test]
    fn test_prepare_pyramid_normalizes_with_train_stats() {
        let data = prepare_pyramid(
            &hierarchical_source(),
            &taxonomy_store(),
            &PipelineConfig::default(),
        )
        .unwrap();
        let normalizer = data.normalizer.unwrap();
        // train images hold 0..20
        assert_eq!(normalizer.mean, 9.5);

        let raw: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let expected: Vec<f32> = image_values(
            &normalizer
                .apply(&index_images(10).unwrap())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(image_values(&data.partition.test.split.images).unwrap(), expected);
        assert_ne!(expected, raw);
        assert_eq!(data.partition.gate.len(), 16);
        assert_eq!(data.partition.joint.len(), 8);
    }

    #[test]
    fn test_prepare_pyramid_is_deterministic() {
        let a = prepare_pyramid(&hierarchical_source(), &taxonomy_store(), &PipelineConfig::default())
            .unwrap();
        let b = prepare_pyramid(&hierarchical_source(), &taxonomy_store(), &PipelineConfig::default())
            .unwrap();
        assert_eq!(a.partition.gate.split.labels, b.partition.gate.split.labels);
        assert_eq!(a.partition.gate.routes, b.partition.gate.routes);
        assert_eq!(
            image_values(&a.partition.joint.images).unwrap(),
            image_values(&b.partition.joint.images).unwrap()
        );
    }
}
