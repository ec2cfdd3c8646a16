//! End-to-end tests: taxonomy build → file cache → partition → normalize.

use candle_core::{DType, Tensor};
use pyramid_pipeline::corpus::images_from_vec;
use pyramid_pipeline::prelude::*;
use tempfile::TempDir;

/// `n` single-pixel images whose value is the sample index.
fn index_images(n: usize) -> Tensor {
    images_from_vec((0..n).map(|i| i as f32).collect(), n, &[1, 1, 1]).unwrap()
}

fn image_values(images: &Tensor) -> Vec<f32> {
    images
        .to_dtype(DType::F32)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap()
}

/// Four coarse classes of five fine labels each, fine names deliberately
/// declared out of alphabetical order.
fn corpus() -> HierarchicalCorpus {
    let fine: Vec<String> = [
        "whale", "dolphin", "otter", "seal", "beaver", // aquatic_mammals
        "tulip", "orchid", "rose", "poppy", "sunflower", // flowers
        "oak", "maple", "willow", "pine", "palm", // trees
        "bus", "train", "bicycle", "tank", "rocket", // vehicles
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let coarse: Vec<String> = ["aquatic_mammals", "flowers", "trees", "vehicles"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    // three passes over every fine label for train, one for test
    let train: Vec<LabelPair> = (0..60).map(|i| LabelPair::new(i % 20, (i % 20) / 5)).collect();
    let test: Vec<LabelPair> = (0..20).rev().map(|i| LabelPair::new(i, i / 5)).collect();

    HierarchicalCorpus {
        train: Split::new(index_images(60), train).unwrap(),
        test: Split::new(index_images(20), test).unwrap(),
        names: LabelNames::new(fine, coarse),
    }
}

#[test]
fn test_build_cache_and_partition() {
    let dir = TempDir::new().unwrap();
    let store = FileTaxonomyStore::new(dir.path().join("coarse_to_fine_map.json"));
    let source = InMemoryCorpus::new().with_hierarchical(corpus());

    let built = rebuild_taxonomy(&source, &store).unwrap();
    assert_eq!(store.load().unwrap(), built);
    assert_eq!(
        built.fine_labels("trees").unwrap(),
        &["maple", "oak", "palm", "pine", "willow"].map(String::from)
    );

    let config = PipelineConfig::default();
    let data = prepare_pyramid(&source, &store, &config).unwrap();
    let sets = &data.partition.sets;

    assert_eq!(sets.joint.len(), 8);
    assert_eq!(sets.gate.len(), 16);
    assert_eq!(sets.test_only.len(), 4);
    for name in ["beaver", "dolphin", "maple", "oak", "orchid", "poppy", "bicycle", "bus"] {
        assert!(sets.joint.contains(name), "{name} should be a joint label");
    }
    for name in ["whale", "willow", "tulip", "train"] {
        assert!(sets.test_only.contains(name), "{name} should be test-only");
    }

    assert_eq!(data.partition.joint.len(), 24);
    assert_eq!(data.partition.gate.len(), 48);
    assert_eq!(data.partition.gate.count(Route::Fine), 24);
    assert_eq!(data.partition.test.len(), 20);
    assert_eq!(data.partition.test.count(Route::Fine), 8);
}

#[test]
fn test_partition_without_cache_fails() {
    let dir = TempDir::new().unwrap();
    let store = FileTaxonomyStore::new(dir.path().join("missing.json"));
    let source = InMemoryCorpus::new().with_hierarchical(corpus());

    let err = prepare_pyramid(&source, &store, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, PyramidError::TaxonomyNotFound { .. }));
}

#[test]
fn test_repeated_runs_identical() {
    let dir = TempDir::new().unwrap();
    let store = FileTaxonomyStore::new(dir.path().join("map.json"));
    let source = InMemoryCorpus::new().with_hierarchical(corpus());
    rebuild_taxonomy(&source, &store).unwrap();

    let config = PipelineConfig::default();
    let first = prepare_pyramid(&source, &store, &config).unwrap();
    let second = prepare_pyramid(&source, &store, &config).unwrap();

    assert_eq!(first.partition.joint.labels, second.partition.joint.labels);
    assert_eq!(first.partition.gate.routes, second.partition.gate.routes);
    assert_eq!(first.partition.test.routes, second.partition.test.routes);
    assert_eq!(
        image_values(&first.partition.gate.split.images),
        image_values(&second.partition.gate.split.images)
    );
}

#[test]
fn test_unknown_dataset_identifier() {
    let err = "cifar100_joint".parse::<DatasetId>().unwrap_err();
    assert!(matches!(err, PyramidError::UnknownDatasetIdentifier(_)));
}
