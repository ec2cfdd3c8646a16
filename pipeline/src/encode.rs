//! Seeded shuffling, hold-out splitting and one-hot encoding.
//!
//! These run after partitioning and normalization; the partitioner itself
//! never reorders samples.

use crate::corpus::{tensor_err, Split};
use candle_core::{Device, Tensor};
use pyramid_core::{PyramidError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Permute the samples of `split`, images and labels together.
///
/// The same seed always yields the same permutation.
pub fn shuffle<L: Clone>(split: &Split<L>, seed: u64) -> Result<Split<L>> {
    let mut indices: Vec<usize> = (0..split.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    split.select(&indices)
}

/// Cut `split` at `floor(len * train_fraction)` into `(train, held_out)`.
pub fn holdout<L: Clone>(split: &Split<L>, train_fraction: f64) -> Result<(Split<L>, Split<L>)> {
    if !(0.0..=1.0).contains(&train_fraction) {
        return Err(PyramidError::Config(format!(
            "train fraction must be in [0, 1], got {train_fraction}"
        )));
    }
    let cut = (split.len() as f64 * train_fraction).floor() as usize;
    let train = split.take_range(0, cut)?;
    let held_out = split.take_range(cut, split.len() - cut)?;
    Ok((train, held_out))
}

/// `[N, n_classes]` one-hot `f32` targets.
///
/// # Errors
///
/// Returns [`PyramidError::LabelOutOfRange`] for a label `>= n_classes`.
pub fn one_hot(labels: &[u32], n_classes: usize) -> Result<Tensor> {
    let mut data = vec![0f32; labels.len() * n_classes];
    for (row, &label) in labels.iter().enumerate() {
        if label as usize >= n_classes {
            return Err(PyramidError::LabelOutOfRange { label, n_classes });
        }
        data[row * n_classes + label as usize] = 1.0;
    }
    Tensor::from_vec(data, (labels.len(), n_classes), &Device::Cpu)
        .map_err(tensor_err("one-hot targets"))
}
