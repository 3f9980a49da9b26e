use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

pub const LAYER_NORM_EPS: f64 = 1e-6;

/// Normalizes each row over its features, then scales by `gamma` and shifts by
/// `beta`.
///
/// `y = gamma * (x - mean) / (std + eps) + beta`, where `std` is the unbiased
/// sample deviation. `eps` sits outside the square root; trained weights depend
/// on this exact form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerNorm {
    pub gamma: Vec<f64>,
    pub beta: Vec<f64>,
    pub eps: f64,
}

impl LayerNorm {
    pub fn new(features: usize) -> LayerNorm {
        LayerNorm::with_eps(features, LAYER_NORM_EPS)
    }

    pub fn with_eps(features: usize, eps: f64) -> LayerNorm {
        LayerNorm {
            gamma: vec![1.0; features],
            beta: vec![0.0; features],
            eps,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    /// `gamma` and `beta` must describe the same number of features.
    pub fn validate(&self) -> Result<()> {
        NetError::ensure_width("LayerNorm::validate", self.gamma.len(), self.beta.len())?;
        if !(self.eps >= 0.0 && self.eps.is_finite()) {
            return Err(NetError::invalid("eps", format!("{} is not a finite non-negative number", self.eps)));
        }
        Ok(())
    }

    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        self.validate()?;
        if x.cols != self.features() {
            return Err(NetError::shape("LayerNorm::forward", format!("{} features", self.features()), x.shape()));
        }
        Ok(x.map_rows(|row| {
            let (mean, std) = mean_and_unbiased_std(row);
            let denom = std + self.eps;
            row.iter()
                .zip(self.gamma.iter().zip(&self.beta))
                .map(|(v, (g, b))| g * (v - mean) / denom + b)
                .collect()
        }))
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

/// A single value has no unbiased deviation; it is reported as zero.
pub(crate) fn mean_and_unbiased_std(row: &[f64]) -> (f64, f64) {
    let n = row.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = row.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let ss: f64 = row.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1) as f64).sqrt())
}
