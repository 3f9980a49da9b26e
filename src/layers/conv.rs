use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::layers::lstm::uniform_vec;
use crate::math::feature_map::FeatureMap;
use crate::math::matrix::Matrix;

/// 2-D convolution with a square kernel.
///
/// `weights` is `(out_channels, in_channels * kernel * kernel)`; row `o` holds
/// filter `o` flattened in channel, row, column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub weights: Matrix,
    pub biases: Vec<f64>,
}

impl Conv2d {
    /// Xavier-uniform filters, U(±sqrt(6 / (fan_in + fan_out))); biases
    /// U(±1 / sqrt(fan_in)).
    pub fn xavier_uniform<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Conv2d {
        let area = kernel * kernel;
        let fan_in = in_channels * area;
        let fan_out = out_channels * area;
        let bound = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
        let bias_bound = 1.0 / (fan_in.max(1) as f64).sqrt();
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            weights: Matrix::uniform(out_channels, fan_in, bound, rng),
            biases: uniform_vec(out_channels, bias_bound, rng),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernel == 0 || self.stride == 0 {
            return Err(NetError::invalid("conv_kernel_size", "kernel and stride must be positive"));
        }
        self.weights.expect_shape("Conv2d::validate", self.out_channels, self.in_channels * self.kernel * self.kernel)?;
        NetError::ensure_width("Conv2d::validate", self.out_channels, self.biases.len())
    }

    /// Output `(height, width)` for an input of `(height, width)`.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let out = |n: usize| {
            let padded = n + 2 * self.padding;
            if padded < self.kernel {
                Err(NetError::shape("Conv2d::forward", format!("a side of at least {}", self.kernel), padded))
            } else {
                Ok((padded - self.kernel) / self.stride + 1)
            }
        };
        Ok((out(height)?, out(width)?))
    }

    pub fn forward(&self, input: &FeatureMap) -> Result<FeatureMap> {
        self.validate()?;
        NetError::ensure_width("Conv2d::forward", self.in_channels, input.channels)?;
        NetError::ensure_width("Conv2d::forward", input.channels * input.height * input.width, input.data.len())?;
        let (out_h, out_w) = self.output_size(input.height, input.width)?;
        let k = self.kernel;
        let mut out = FeatureMap::zeros(self.out_channels, out_h, out_w);

        for (o, filter) in self.weights.data.iter().enumerate() {
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut acc = self.biases[o];
                    for c in 0..self.in_channels {
                        for ky in 0..k {
                            let Some(iy) = (y * self.stride + ky).checked_sub(self.padding) else { continue };
                            if iy >= input.height {
                                continue;
                            }
                            for kx in 0..k {
                                let Some(ix) = (x * self.stride + kx).checked_sub(self.padding) else { continue };
                                if ix >= input.width {
                                    continue;
                                }
                                acc += filter[(c * k + ky) * k + kx] * input.get(c, iy, ix);
                            }
                        }
                    }
                    out.set(o, y, x, acc);
                }
            }
        }
        Ok(out)
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.rows * self.weights.cols + self.biases.len()
    }
}

/// Non-overlapping max pooling: window and stride both equal `kernel`, and
/// trailing rows or columns that do not fill a window are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub kernel: usize,
}

impl MaxPool2d {
    pub fn forward(&self, input: &FeatureMap) -> Result<FeatureMap> {
        let k = self.kernel;
        if k == 0 || input.height < k || input.width < k {
            return Err(NetError::shape(
                "MaxPool2d::forward",
                format!("sides of at least {k}"),
                format!("{}x{}", input.height, input.width),
            ));
        }
        let (out_h, out_w) = (input.height / k, input.width / k);
        let mut out = FeatureMap::zeros(input.channels, out_h, out_w);
        for c in 0..input.channels {
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut best = f64::NEG_INFINITY;
                    for dy in 0..k {
                        for dx in 0..k {
                            best = best.max(input.get(c, y * k + dy, x * k + dx));
                        }
                    }
                    out.set(c, y, x, best);
                }
            }
        }
        Ok(out)
    }
}
