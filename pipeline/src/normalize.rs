//! Centering and scaling with statistics taken from the training split only.
//!
//! `scale` is the mean of the per-position standard deviations taken along
//! the sample axis (`mean(std(X, axis=0))`), not the standard deviation of
//! the flattened tensor.

use crate::corpus::tensor_err;
use candle_core::{DType, Tensor};
use pyramid_core::{PyramidError, Result};

/// Two scalars fitted on a training tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    /// Mean over every element of the training tensor.
    pub mean: f64,
    /// Mean of the per-position population standard deviations.
    pub scale: f64,
    /// Added to `scale` before dividing.
    pub epsilon: f64,
}

impl Normalizer {
    /// Fit on `train`, whose first axis is the sample axis.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::EmptySplit`] if `train` holds no sample.
    pub fn fit(train: &Tensor, epsilon: f64) -> Result<Self> {
        if train.dims().first().copied().unwrap_or(0) == 0 {
            return Err(PyramidError::EmptySplit {
                split: "train".to_string(),
            });
        }
        let x = train.to_dtype(DType::F64).map_err(tensor_err("to f64"))?;

        let mean = x
            .mean_all()
            .and_then(|m| m.to_scalar::<f64>())
            .map_err(tensor_err("mean"))?;

        let scale = x
            .mean_keepdim(0)
            .and_then(|per_position| x.broadcast_sub(&per_position))
            .and_then(|centered| centered.sqr())
            .and_then(|sq| sq.mean(0))
            .and_then(|var| var.sqrt())
            .and_then(|std| std.mean_all())
            .and_then(|s| s.to_scalar::<f64>())
            .map_err(tensor_err("per-position std"))?;

        Ok(Self {
            mean,
            scale,
            epsilon,
        })
    }

    /// `(x - mean) / (scale + epsilon)`, keeping the dtype of `x`.
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        x.affine(1.0, -self.mean)
            .and_then(|centered| centered.affine(1.0 / (self.scale + self.epsilon), 0.0))
            .map_err(tensor_err("normalize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn tensor(values: &[f32], shape: &[usize]) -> Tensor {
        Tensor::from_vec(values.to_vec(), shape, &Device::Cpu).unwrap()
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_fit_uses_axis_wise_std() {
        // positions: {1, 3} and {2, 4} -> std 1 each; flattened std would be sqrt(1.25)
        let train = tensor(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let norm = Normalizer::fit(&train, 0.0).unwrap();
        assert_eq!(norm.mean, 2.5);
        assert_eq!(norm.scale, 1.0);
        assert_eq!(values(&norm.apply(&train).unwrap()), vec![-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn test_zero_variance_divides_by_epsilon() {
        let train = tensor(&[3.0; 6], &[3, 2]);
        let norm = Normalizer::fit(&train, 0.5).unwrap();
        assert_eq!(norm.scale, 0.0);

        let out = values(&norm.apply(&train).unwrap());
        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out, vec![0.0; 6]);

        let test = tensor(&[4.0, 2.0], &[1, 2]);
        assert_eq!(values(&norm.apply(&test).unwrap()), vec![2.0, -2.0]);
    }

    #[test]
    fn test_statistics_come_from_train_only() {
        let train = tensor(&[0.0, 2.0], &[2, 1]);
        let test = tensor(&[100.0, 200.0], &[2, 1]);
        let norm = Normalizer::fit(&train, 0.0).unwrap();
        assert_eq!(norm.mean, 1.0);
        assert_eq!(norm.scale, 1.0);
        assert_eq!(values(&norm.apply(&test).unwrap()), vec![99.0, 199.0]);
    }

    #[test]
    fn test_apply_keeps_dtype_and_shape() {
        let train = tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[2, 2, 2, 1]);
        let norm = Normalizer::fit(&train, 1e-8).unwrap();
        let out = norm.apply(&train).unwrap();
        assert_eq!(out.dtype(), DType::F32);
        assert_eq!(out.dims(), &[2, 2, 2, 1]);
    }

    #[test]
    fn test_fit_empty_split() {
        let train = Tensor::zeros((0, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            Normalizer::fit(&train, 1e-8),
            Err(PyramidError::EmptySplit { .. })
        ));
    }
}
