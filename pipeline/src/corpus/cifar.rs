//! Loader for the CIFAR binary distributions.
//!
//! | Corpus | Files | Record layout |
//! |--------|-------|---------------|
//! | CIFAR-10 | `data_batch_{1..5}.bin`, `test_batch.bin`, `batches.meta.txt` | label, 3072 pixels |
//! | CIFAR-100 | `train.bin`, `test.bin`, `fine_label_names.txt`, `coarse_label_names.txt` | coarse, fine, 3072 pixels |
//!
//! Pixels are stored channel-major (`3 x 32 x 32`) and returned as
//! `[N, 32, 32, 3]` `f32` tensors.

use super::{tensor_err, CorpusSource, FlatCorpus, HierarchicalCorpus, Split};
use candle_core::{Device, Tensor};
use pyramid_core::{DataConfig, LabelNames, LabelPair, PyramidError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Image side length.
pub const IMAGE_SIZE: usize = 32;

/// Colour channels per image.
pub const CHANNELS: usize = 3;

/// Bytes of pixel data per record.
pub const PIXEL_BYTES: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

const CIFAR10_TRAIN_BATCHES: usize = 5;

/// Reads CIFAR-10 and CIFAR-100 from their binary distribution directories.
#[derive(Debug, Clone)]
pub struct CifarBinaryLoader {
    cifar10_dir: PathBuf,
    cifar100_dir: PathBuf,
}

impl CifarBinaryLoader {
    /// Loader over explicit directories.
    pub fn new(cifar10_dir: impl Into<PathBuf>, cifar100_dir: impl Into<PathBuf>) -> Self {
        Self {
            cifar10_dir: cifar10_dir.into(),
            cifar100_dir: cifar100_dir.into(),
        }
    }

    /// Loader over the directories named in `config`.
    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(&config.cifar10_dir, &config.cifar100_dir)
    }
}

impl CorpusSource for CifarBinaryLoader {
    fn load_flat(&self) -> Result<FlatCorpus> {
        let mut pixels = Vec::new();
        let mut labels = Vec::new();
        for b in 1..=CIFAR10_TRAIN_BATCHES {
            let path = self.cifar10_dir.join(format!("data_batch_{b}.bin"));
            let batch = read_batch(&path, 1)?;
            pixels.extend(batch.pixels);
            labels.extend(batch.labels.iter().map(|l| u32::from(l[0])));
        }
        let train = Split::new(to_images(pixels, labels.len())?, labels)?;

        let batch = read_batch(&self.cifar10_dir.join("test_batch.bin"), 1)?;
        let test_labels: Vec<u32> = batch.labels.iter().map(|l| u32::from(l[0])).collect();
        let test = Split::new(to_images(batch.pixels, test_labels.len())?, test_labels)?;

        let label_names = read_names(&self.cifar10_dir.join("batches.meta.txt"))?;

        Ok(FlatCorpus {
            train,
            test,
            label_names,
        })
    }

    fn load_hierarchical(&self) -> Result<HierarchicalCorpus> {
        let train = read_hierarchical_split(&self.cifar100_dir.join("train.bin"))?;
        let test = read_hierarchical_split(&self.cifar100_dir.join("test.bin"))?;
        let names = LabelNames::new(
            read_names(&self.cifar100_dir.join("fine_label_names.txt"))?,
            read_names(&self.cifar100_dir.join("coarse_label_names.txt"))?,
        );
        Ok(HierarchicalCorpus { train, test, names })
    }
}

fn read_hierarchical_split(path: &Path) -> Result<Split<LabelPair>> {
    let batch = read_batch(path, 2)?;
    // coarse byte first, then fine
    let labels: Vec<LabelPair> = batch
        .labels
        .iter()
        .map(|l| LabelPair::new(u32::from(l[1]), u32::from(l[0])))
        .collect();
    Split::new(to_images(batch.pixels, labels.len())?, labels)
}

/// Decoded records of one batch file.
struct RawBatch {
    labels: Vec<Vec<u8>>,
    pixels: Vec<f32>,
}

fn read_batch(path: &Path, label_bytes: usize) -> Result<RawBatch> {
    let bytes = std::fs::read(path).map_err(|e| {
        PyramidError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {}: {e}", path.display()),
        ))
    })?;
    let batch = decode_records(&bytes, label_bytes)
        .map_err(|e| PyramidError::Corpus(format!("{}: {e}", path.display())))?;
    info!(
        path = %path.display(),
        samples = batch.labels.len(),
        "Loaded CIFAR batch"
    );
    Ok(batch)
}

fn decode_records(bytes: &[u8], label_bytes: usize) -> std::result::Result<RawBatch, String> {
    let record = label_bytes + PIXEL_BYTES;
    if bytes.len() % record != 0 {
        return Err(format!(
            "length {} is not a multiple of the {record}-byte record size",
            bytes.len()
        ));
    }
    let n = bytes.len() / record;
    let mut labels = Vec::with_capacity(n);
    let mut pixels = Vec::with_capacity(n * PIXEL_BYTES);
    for chunk in bytes.chunks_exact(record) {
        labels.push(chunk[..label_bytes].to_vec());
        pixels.extend(chunk[label_bytes..].iter().map(|&p| f32::from(p)));
    }
    Ok(RawBatch { labels, pixels })
}

/// `[N, 3, 32, 32]` channel-major pixels → `[N, 32, 32, 3]`.
fn to_images(pixels: Vec<f32>, n: usize) -> Result<Tensor> {
    Tensor::from_vec(pixels, (n, CHANNELS, IMAGE_SIZE, IMAGE_SIZE), &Device::Cpu)
        .and_then(|t| t.permute((0, 2, 3, 1)))
        .and_then(|t| t.contiguous())
        .map_err(tensor_err("CIFAR image batch"))
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PyramidError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {}: {e}", path.display()),
        ))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
