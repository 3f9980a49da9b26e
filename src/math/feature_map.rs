use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// One example's `(channels, height, width)` activations, stored flat in
/// channel, row, column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl FeatureMap {
    pub fn zeros(channels: usize, height: usize, width: usize) -> FeatureMap {
        FeatureMap { channels, height, width, data: vec![0.0; channels * height * width] }
    }

    /// Builds a map from `[channel][row][column]` nesting, rejecting ragged input.
    pub fn from_nested(planes: Vec<Vec<Vec<f64>>>) -> Result<FeatureMap> {
        let channels = planes.len();
        let height = planes.first().map_or(0, Vec::len);
        let width = planes.first().and_then(|p| p.first()).map_or(0, Vec::len);
        let mut data = Vec::with_capacity(channels * height * width);
        for plane in planes {
            NetError::ensure_width("FeatureMap::from_nested", height, plane.len())?;
            for row in plane {
                NetError::ensure_width("FeatureMap::from_nested", width, row.len())?;
                data.extend(row);
            }
        }
        Ok(FeatureMap { channels, height, width, data })
    }

    /// A single-channel map from a `(height, width)` matrix, e.g. a spectrogram.
    pub fn from_matrix(m: &Matrix) -> FeatureMap {
        FeatureMap {
            channels: 1,
            height: m.rows,
            width: m.cols,
            data: m.data.iter().flatten().copied().collect(),
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn get(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[(c * self.height + y) * self.width + x]
    }

    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f64) {
        self.data[(c * self.height + y) * self.width + x] = value;
    }

    pub fn map(&self, functor: impl Fn(f64) -> f64) -> FeatureMap {
        FeatureMap { data: self.data.iter().map(|&v| functor(v)).collect(), ..self.clone() }
    }

    /// Reinterprets the flat buffer as `height` rows of `channels * width`
    /// values without reordering, so row `t` holds the `t`-th contiguous chunk.
    pub fn rows_as_sequence(&self) -> Matrix {
        let cols = self.channels * self.width;
        let data = if cols == 0 {
            vec![vec![]; self.height]
        } else {
            self.data.chunks(cols).map(<[f64]>::to_vec).collect()
        };
        Matrix { rows: self.height, cols, data }
    }
}

/// Checks that every map in a batch has the same shape and returns it.
pub fn batch_shape(batch: &[FeatureMap]) -> Result<(usize, usize, usize)> {
    let first = batch.first()
        .ok_or_else(|| NetError::shape("batch_shape", "at least one example", 0))?;
    let shape = first.shape();
    for map in batch {
        if map.shape() != shape || map.data.len() != shape.0 * shape.1 * shape.2 {
            return Err(NetError::shape("batch_shape", format!("{shape:?}"), format!("{:?}", map.shape())));
        }
    }
    Ok(shape)
}
