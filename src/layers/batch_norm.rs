use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::layers::Mode;
use crate::math::feature_map::{batch_shape, FeatureMap};
use crate::math::matrix::Matrix;

pub const BATCH_NORM_EPS: f64 = 1e-5;
pub const DEFAULT_MOMENTUM: f64 = 0.1;

/// 1-D batch normalization over the batch axis of a `(batch, features)` input.
///
/// Training mode normalizes with the batch statistics (biased variance) and
/// folds them into the running estimates (unbiased variance); evaluation mode
/// uses the running estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm1d {
    pub gamma: Vec<f64>,
    pub beta: Vec<f64>,
    pub running_mean: Vec<f64>,
    pub running_var: Vec<f64>,
    pub momentum: f64,
    pub eps: f64,
}

impl BatchNorm1d {
    pub fn new(features: usize) -> BatchNorm1d {
        BatchNorm1d::with_momentum(features, DEFAULT_MOMENTUM)
    }

    pub fn with_momentum(features: usize, momentum: f64) -> BatchNorm1d {
        BatchNorm1d {
            gamma: vec![1.0; features],
            beta: vec![0.0; features],
            running_mean: vec![0.0; features],
            running_var: vec![1.0; features],
            momentum,
            eps: BATCH_NORM_EPS,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    /// Affine parameters and running statistics must all have one entry per
    /// feature.
    pub fn validate(&self) -> Result<()> {
        let n = self.features();
        NetError::ensure_width("BatchNorm1d::validate", n, self.beta.len())?;
        NetError::ensure_width("BatchNorm1d::validate", n, self.running_mean.len())?;
        NetError::ensure_width("BatchNorm1d::validate", n, self.running_var.len())?;
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(NetError::invalid("momentum", format!("{} is outside [0, 1]", self.momentum)));
        }
        if !(self.eps >= 0.0 && self.eps.is_finite()) {
            return Err(NetError::invalid("eps", format!("{} is not a finite non-negative number", self.eps)));
        }
        Ok(())
    }

    pub fn forward(&mut self, x: &Matrix, mode: Mode) -> Result<Matrix> {
        self.validate()?;
        if x.cols != self.features() {
            return Err(NetError::shape("BatchNorm1d::forward", format!("{} features", self.features()), x.shape()));
        }

        let (mean, var) = match mode {
            Mode::Train => {
                if x.rows < 2 {
                    return Err(NetError::shape("BatchNorm1d::forward", "more than 1 row per batch in training mode", x.shape()));
                }
                let (mean, biased_var) = batch_moments(x);
                let n = x.rows as f64;
                for k in 0..self.features() {
                    let unbiased = biased_var[k] * n / (n - 1.0);
                    self.running_mean[k] = (1.0 - self.momentum) * self.running_mean[k] + self.momentum * mean[k];
                    self.running_var[k] = (1.0 - self.momentum) * self.running_var[k] + self.momentum * unbiased;
                }
                (mean, biased_var)
            }
            Mode::Eval => (self.running_mean.clone(), self.running_var.clone()),
        };

        let scale: Vec<f64> = var.iter().zip(&self.gamma)
            .map(|(v, g)| g / (v + self.eps).sqrt())
            .collect();
        Ok(x.map_rows(|row| {
            row.iter().enumerate()
                .map(|(k, v)| (v - mean[k]) * scale[k] + self.beta[k])
                .collect()
        }))
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

/// Per-channel batch normalization of `(channels, height, width)` maps.
///
/// Statistics are taken over the batch and both spatial axes, so every pixel
/// of every example counts as one sample of its channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm2d {
    pub inner: BatchNorm1d,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> BatchNorm2d {
        BatchNorm2d { inner: BatchNorm1d::new(channels) }
    }

    pub fn channels(&self) -> usize {
        self.inner.features()
    }

    pub fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    pub fn forward(&mut self, batch: &[FeatureMap], mode: Mode) -> Result<Vec<FeatureMap>> {
        let (channels, height, width) = batch_shape(batch)?;
        NetError::ensure_width("BatchNorm2d::forward", self.channels(), channels)?;

        let pixels = height * width;
        let mut samples = Matrix::zeros(batch.len() * pixels, channels);
        for (n, map) in batch.iter().enumerate() {
            for c in 0..channels {
                for p in 0..pixels {
                    samples.data[n * pixels + p][c] = map.data[c * pixels + p];
                }
            }
        }
        let normalized = self.inner.forward(&samples, mode)?;

        let mut out = vec![FeatureMap::zeros(channels, height, width); batch.len()];
        for (n, map) in out.iter_mut().enumerate() {
            for c in 0..channels {
                for p in 0..pixels {
                    map.data[c * pixels + p] = normalized.data[n * pixels + p][c];
                }
            }
        }
        Ok(out)
    }

    pub fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }
}

/// Per-column mean and biased variance.
fn batch_moments(x: &Matrix) -> (Vec<f64>, Vec<f64>) {
    let mean = x.column_means();
    let mut var = vec![0.0; x.cols];
    for row in &x.data {
        for (k, v) in row.iter().enumerate() {
            var[k] += (v - mean[k]).powi(2);
        }
    }
    let n = x.rows as f64;
    var.iter_mut().for_each(|v| *v /= n);
    (mean, var)
}
