use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// A batch of equal-length sequences stored time-major.
///
/// `steps[t]` is a `(batch, features)` matrix holding time step `t` of every
/// example. Callers usually build it from batch-first data with
/// [`SeqBatch::from_examples`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqBatch {
    pub steps: Vec<Matrix>,
}

impl SeqBatch {
    /// Validates that every step shares the same `(batch, features)` shape.
    pub fn new(steps: Vec<Matrix>) -> Result<SeqBatch> {
        if let Some(first) = steps.first() {
            let shape = first.shape();
            if let Some(bad) = steps.iter().find(|s| s.shape() != shape) {
                return Err(NetError::shape("SeqBatch::new", shape, bad.shape()));
            }
        }
        Ok(SeqBatch { steps })
    }

    /// Converts batch-first examples, each `(seq_len, features)`, to time-major.
    pub fn from_examples(examples: &[Matrix]) -> Result<SeqBatch> {
        let first = examples.first()
            .ok_or_else(|| NetError::shape("SeqBatch::from_examples", "at least one example", 0))?;
        let shape = first.shape();
        if let Some(bad) = examples.iter().find(|e| e.shape() != shape) {
            return Err(NetError::shape("SeqBatch::from_examples", shape, bad.shape()));
        }
        let steps = (0..shape.0)
            .map(|t| Matrix {
                rows: examples.len(),
                cols: shape.1,
                data: examples.iter().map(|e| e.data[t].clone()).collect(),
            })
            .collect();
        Ok(SeqBatch { steps })
    }

    pub fn seq_len(&self) -> usize {
        self.steps.len()
    }

    pub fn batch_size(&self) -> usize {
        self.steps.first().map_or(0, |s| s.rows)
    }

    pub fn features(&self) -> usize {
        self.steps.first().map_or(0, |s| s.cols)
    }

    pub fn last_step(&self) -> Option<&Matrix> {
        self.steps.last()
    }

    /// Joins the features of two equally long sequences step by step.
    pub fn concat_features(&self, rhs: &SeqBatch) -> Result<SeqBatch> {
        if self.seq_len() != rhs.seq_len() {
            return Err(NetError::shape("SeqBatch::concat_features", format!("{} time steps", self.seq_len()), rhs.seq_len()));
        }
        let steps = self.steps.iter().zip(&rhs.steps)
            .map(|(a, b)| a.hcat(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(SeqBatch { steps })
    }

    /// Lays every example's steps end to end: `(batch, seq_len * features)`.
    pub fn flatten_time(&self) -> Matrix {
        let cols = self.seq_len() * self.features();
        let data = (0..self.batch_size())
            .map(|b| {
                let mut row = Vec::with_capacity(cols);
                for step in &self.steps {
                    row.extend_from_slice(step.row(b));
                }
                row
            })
            .collect();
        Matrix { rows: self.batch_size(), cols, data }
    }

    /// Mean over the time axis, `(batch, features)`.
    pub fn mean_over_time(&self) -> Result<Matrix> {
        let mut acc = Matrix::zeros(self.batch_size(), self.features());
        for step in &self.steps {
            acc = acc.add(step)?;
        }
        let n = self.seq_len().max(1) as f64;
        Ok(acc.map(|x| x / n))
    }
}
