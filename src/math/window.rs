use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Number of neighbouring frames joined to each centre frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextWindowSpec {
    pub left: usize,
    pub right: usize,
}

impl ContextWindowSpec {
    pub fn new(left: usize, right: usize) -> Self {
        ContextWindowSpec { left, right }
    }

    /// Frames per output row.
    pub fn span(&self) -> usize {
        self.left + self.right + 1
    }
}

/// Expands `(N, F)` frames into `(N - L - R, F * (L + R + 1))` context rows.
///
/// Row `j` holds frames `j..=j + L + R` in temporal order, so block `L` is the
/// centre frame `j + L`. Frames without a full context on both sides are
/// dropped; when `N <= L + R` the result has no rows.
pub fn context_window(frames: &Matrix, spec: ContextWindowSpec) -> Matrix {
    let width = frames.cols;
    let span = spec.span();
    let out_rows = frames.rows.saturating_sub(spec.left + spec.right);

    if span == 1 {
        return frames.clone();
    }

    let mut out = Matrix::zeros(out_rows, width * span);
    for (j, row) in out.data.iter_mut().enumerate() {
        for (block, frame) in frames.data[j..j + span].iter().enumerate() {
            row[block * width..(block + 1) * width].copy_from_slice(frame);
        }
    }
    out
}
