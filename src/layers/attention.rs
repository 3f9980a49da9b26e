use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::layers::lstm::uniform_vec;
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;

/// Temporal attention pooling over a hidden-state sequence.
///
/// `score_t = tanh(h_t) . w`, `alpha = softmax over t`, and the pooled
/// representation is `tanh(sum_t alpha_t h_t)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAttention {
    pub weight: Vec<f64>,
}

/// Pooled `(batch, features)` representation plus `(batch, seq_len)` weights.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    pub pooled: Matrix,
    pub weights: Matrix,
}

impl TemporalAttention {
    pub fn new<R: Rng + ?Sized>(features: usize, rng: &mut R) -> TemporalAttention {
        let bound = 1.0 / (features.max(1) as f64).sqrt();
        TemporalAttention { weight: uniform_vec(features, bound, rng) }
    }

    pub fn features(&self) -> usize {
        self.weight.len()
    }

    pub fn forward(&self, hidden: &SeqBatch) -> Result<AttentionOutput> {
        if hidden.seq_len() == 0 {
            return Err(NetError::shape("TemporalAttention::forward", "at least one time step", 0));
        }
        if hidden.features() != self.features() {
            return Err(NetError::shape("TemporalAttention::forward", format!("{} features", self.features()), hidden.features()));
        }

        let batch = hidden.batch_size();
        let mut weights = Matrix::zeros(batch, hidden.seq_len());
        for (t, step) in hidden.steps.iter().enumerate() {
            for (b, row) in step.data.iter().enumerate() {
                weights.data[b][t] = row.iter().zip(&self.weight).map(|(h, w)| h.tanh() * w).sum();
            }
        }
        let weights = weights.map_rows(softmax);

        let mut pooled = Matrix::zeros(batch, self.features());
        for (t, step) in hidden.steps.iter().enumerate() {
            for (b, row) in step.data.iter().enumerate() {
                let a = weights.data[b][t];
                for (p, h) in pooled.data[b].iter_mut().zip(row) {
                    *p += a * h;
                }
            }
        }

        Ok(AttentionOutput { pooled: pooled.map(f64::tanh), weights })
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len()
    }
}

fn softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = row.iter().map(|x| (x - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}
