use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;

/// Affine transform `y = xW (+ b)`.
///
/// `weights` has shape `(input_size, size)` so a `(batch, input_size)` input
/// multiplies on the left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense{
    pub input_size: usize,
    pub size: usize,
    pub weights: Matrix,
    pub biases: Option<Vec<f64>>,
}

impl Dense {
    /// Small-variance init: weights ~ U(±sqrt(0.01 / (fan_in + fan_out))),
    /// biases zero.
    pub fn small_uniform<R: Rng + ?Sized>(input_size: usize, size: usize, bias: bool, rng: &mut R) -> Dense {
        let bound = (0.01 / (input_size + size) as f64).sqrt();
        Dense {
            input_size,
            size,
            weights: Matrix::uniform(input_size, size, bound, rng),
            biases: bias.then(|| vec![0.0; size]),
        }
    }

    /// Fan-in init: weights and biases ~ U(±1 / sqrt(fan_in)).
    pub fn fan_in_uniform<R: Rng + ?Sized>(input_size: usize, size: usize, rng: &mut R) -> Dense {
        let bound = 1.0 / (input_size.max(1) as f64).sqrt();
        let biases = (0..size).map(|_| rng.gen_range(-bound..=bound)).collect();
        Dense {
            input_size,
            size,
            weights: Matrix::uniform(input_size, size, bound, rng),
            biases: Some(biases),
        }
    }

    pub fn has_bias(&self) -> bool {
        self.biases.is_some()
    }

    /// Checks that the weights are `(input_size, size)` and the biases `size` long.
    pub fn validate(&self) -> Result<()> {
        self.weights.expect_shape("Dense::validate", self.input_size, self.size)?;
        if let Some(b) = &self.biases {
            NetError::ensure_width("Dense::validate", self.size, b.len())?;
        }
        Ok(())
    }

    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        if input.cols != self.input_size {
            return Err(NetError::shape("Dense::forward", format!("{} input features", self.input_size), input.shape()));
        }
        let z = input.matmul(&self.weights)?;
        match &self.biases {
            Some(b) => z.add_row(b),
            None => Ok(z),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.input_size * self.size + self.biases.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn small_uniform_bound_and_zero_bias() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Dense::small_uniform(5, 4, true, &mut rng);
        let bound = (0.01f64 / 9.0).sqrt();
        assert!(d.weights.data.iter().flatten().all(|w| w.abs() <= bound));
        assert_eq!(d.biases, Some(vec![0.0; 4]));
        assert_eq!(d.num_parameters(), 24);
    }

    #[test]
    fn forward_applies_weights_and_bias() {
        let d = Dense {
            input_size: 2,
            size: 1,
            weights: Matrix::from_rows(vec![vec![2.0], vec![-1.0]]).unwrap(),
            biases: Some(vec![0.5]),
        };
        let x = Matrix::from_rows(vec![vec![1.0, 1.0], vec![3.0, 0.0]]).unwrap();
        assert_eq!(d.forward(&x).unwrap().data, vec![vec![1.5], vec![6.5]]);
    }

    #[test]
    fn validate_rejects_inconsistent_parameters() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut d = Dense::small_uniform(3, 2, true, &mut rng);
        assert!(d.validate().is_ok());
        d.biases = Some(vec![0.0; 3]);
        assert!(d.validate().is_err());
        let mut d = Dense::small_uniform(3, 2, false, &mut rng);
        d.input_size = 4;
        assert!(d.validate().is_err());
    }

    #[test]
    fn forward_rejects_wrong_width() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Dense::small_uniform(3, 2, false, &mut rng);
        assert!(d.forward(&Matrix::zeros(4, 5)).is_err());
    }
}
