use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::layers::Mode;
use crate::math::matrix::Matrix;

/// Inverted dropout: in training, zeroes each entry with probability `p` and
/// scales survivors by `1 / (1 - p)`. Identity in evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub p: f64,
}

impl Dropout {
    pub fn new(p: f64) -> Result<Dropout> {
        if !(0.0..=1.0).contains(&p) {
            return Err(NetError::invalid("dropout", format!("probability {p} is outside [0, 1]")));
        }
        Ok(Dropout { p })
    }

    /// Re-checks the probability of a dropout read from disk.
    pub fn validate(&self) -> Result<()> {
        Dropout::new(self.p).map(|_| ())
    }

    pub fn forward(&self, x: &Matrix, mode: Mode) -> Matrix {
        self.forward_with(x, mode, &mut rand::thread_rng())
    }

    pub fn forward_with<R: Rng + ?Sized>(&self, x: &Matrix, mode: Mode, rng: &mut R) -> Matrix {
        if mode == Mode::Eval || self.p == 0.0 {
            return x.clone();
        }
        if self.p >= 1.0 {
            return Matrix::zeros(x.rows, x.cols);
        }
        let scale = 1.0 / (1.0 - self.p);
        let mut out = x.clone();
        for v in out.data.iter_mut().flatten() {
            *v = if rng.gen::<f64>() < self.p { 0.0 } else { *v * scale };
        }
        out
    }
}
