//! Raw corpus types and the [`CorpusSource`] seam.
//!
//! A [`Split`] stores samples column-wise: one image tensor whose first axis
//! is the sample axis, and one label per sample. Every transform returns a
//! new split; nothing here mutates samples in place.

pub mod cifar;

use candle_core::{Device, Tensor};
use pyramid_core::{LabelNames, LabelPair, PyramidError, Result};

pub use cifar::CifarBinaryLoader;

/// Map a tensor-library error into a [`PyramidError::Tensor`] with context.
pub(crate) fn tensor_err(context: &'static str) -> impl FnOnce(candle_core::Error) -> PyramidError {
    move |e| PyramidError::Tensor(format!("{context}: {e}"))
}

/// Images `[N, ...]` paired with one label per sample.
#[derive(Debug, Clone)]
pub struct Split<L> {
    /// Sample-major image tensor.
    pub images: Tensor,
    /// Labels, aligned with the first axis of `images`.
    pub labels: Vec<L>,
}

/// Split of the hierarchical corpus.
pub type LabeledSplit = Split<LabelPair>;

/// Split of a flat corpus.
pub type FlatSplit = Split<u32>;

impl<L: Clone> Split<L> {
    /// Pair `images` with `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::Corpus`] if the sample counts disagree.
    pub fn new(images: Tensor, labels: Vec<L>) -> Result<Self> {
        let n = images.dim(0).map_err(tensor_err("image batch has no sample axis"))?;
        if n != labels.len() {
            return Err(PyramidError::Corpus(format!(
                "{} images but {} labels",
                n,
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when the split holds no sample.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Gather the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let images = gather_rows(&self.images, indices)?;
        let labels = indices.iter().map(|&i| self.labels[i].clone()).collect();
        Ok(Self { images, labels })
    }

    /// The `len` samples starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::Config`] if the range runs past the split.
    pub fn take_range(&self, start: usize, len: usize) -> Result<Self> {
        if start + len > self.len() {
            return Err(PyramidError::Config(format!(
                "requested samples {}..{} but the split only holds {}",
                start,
                start + len,
                self.len()
            )));
        }
        let indices: Vec<usize> = (start..start + len).collect();
        self.select(&indices)
    }

    /// Keep the images, replace every label through `f`.
    pub fn map_labels<M>(&self, f: impl Fn(&L) -> M) -> Split<M> {
        Split {
            images: self.images.clone(),
            labels: self.labels.iter().map(f).collect(),
        }
    }

    /// Same labels, new images (e.g. after normalization).
    pub fn with_images(&self, images: Tensor) -> Result<Self> {
        Self::new(images, self.labels.clone())
    }
}

fn gather_rows(tensor: &Tensor, indices: &[usize]) -> Result<Tensor> {
    if indices.is_empty() {
        let mut shape = tensor.dims().to_vec();
        shape[0] = 0;
        return Tensor::zeros(shape, tensor.dtype(), tensor.device())
            .map_err(tensor_err("empty tensor"));
    }
    let idx: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
    let idx_tensor =
        Tensor::new(idx.as_slice(), tensor.device()).map_err(tensor_err("index tensor"))?;
    tensor
        .index_select(&idx_tensor, 0)
        .map_err(tensor_err("index_select"))
}

/// Build an `f32` image batch of shape `[n, dims...]` on the CPU.
pub fn images_from_vec(pixels: Vec<f32>, n: usize, dims: &[usize]) -> Result<Tensor> {
    let mut shape = Vec::with_capacity(dims.len() + 1);
    shape.push(n);
    shape.extend_from_slice(dims);
    Tensor::from_vec(pixels, shape, &Device::Cpu).map_err(tensor_err("image batch"))
}

/// CIFAR-10 style corpus: one label per sample.
#[derive(Debug, Clone)]
pub struct FlatCorpus {
    /// Training split.
    pub train: FlatSplit,
    /// Test split.
    pub test: FlatSplit,
    /// Label names indexed by label id.
    pub label_names: Vec<String>,
}

/// CIFAR-100 style corpus: a fine and a coarse label per sample.
#[derive(Debug, Clone)]
pub struct HierarchicalCorpus {
    /// Training split.
    pub train: LabeledSplit,
    /// Test split.
    pub test: LabeledSplit,
    /// Fine and coarse label names.
    pub names: LabelNames,
}

/// Supplier of raw corpora. Decoding is entirely up to the implementation.
pub trait CorpusSource {
    /// Load the flat-labeled corpus.
    fn load_flat(&self) -> Result<FlatCorpus>;

    /// Load the corpus carrying fine and coarse labels.
    fn load_hierarchical(&self) -> Result<HierarchicalCorpus>;
}

/// Corpus source that hands out clones of pre-built corpora.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    flat: Option<FlatCorpus>,
    hierarchical: Option<HierarchicalCorpus>,
}

impl InMemoryCorpus {
    /// Source with neither corpus available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `corpus` the flat corpus.
    pub fn with_flat(mut self, corpus: FlatCorpus) -> Self {
        self.flat = Some(corpus);
        self
    }

    /// Make `corpus` the hierarchical corpus.
    pub fn with_hierarchical(mut self, corpus: HierarchicalCorpus) -> Self {
        self.hierarchical = Some(corpus);
        self
    }
}

impl CorpusSource for InMemoryCorpus {
    fn load_flat(&self) -> Result<FlatCorpus> {
        self.flat
            .clone()
            .ok_or_else(|| PyramidError::Corpus("no flat corpus loaded".to_string()))
    }

    fn load_hierarchical(&self) -> Result<HierarchicalCorpus> {
        self.hierarchical
            .clone()
            .ok_or_else(|| PyramidError::Corpus("no hierarchical corpus loaded".to_string()))
    }
}

/// An image batch of `n` single-pixel images whose value is the sample index.
///
/// Handy for checking which samples ended up where.
#[cfg(test)]
pub(crate) fn index_images(n: usize) -> Result<Tensor> {
    let pixels: Vec<f32> = (0..n).map(|i| i as f32).collect();
    images_from_vec(pixels, n, &[1, 1, 1])
}

/// Read back the single pixel of every image built by [`index_images`].
#[cfg(test)]
pub(crate) fn image_values(images: &Tensor) -> Result<Vec<f32>> {
    images
        .to_dtype(candle_core::DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(tensor_err("read image values"))
}
