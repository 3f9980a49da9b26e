use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::network_config::FeatureMlpConfig;
use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;
use crate::layers::Dense;

/// Two-layer regressor over handcrafted features.
///
/// Sequential features are averaged over time and joined with the
/// non-sequential ones; the result goes through `affine -> ReLU -> affine ->
/// ReLU`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMlpRegressor {
    pub config: FeatureMlpConfig,
    pub hidden: Dense,
    pub output: Dense,
}

impl FeatureMlpRegressor {
    pub fn build<R: Rng + ?Sized>(config: FeatureMlpConfig, rng: &mut R) -> Result<FeatureMlpRegressor> {
        config.validate()?;
        let hidden = Dense::fan_in_uniform(config.input_dim(), config.hidden_size, rng);
        let output = Dense::fan_in_uniform(config.hidden_size, 1, rng);
        let model = FeatureMlpRegressor { config, hidden, output };
        info!(input = config.input_dim(), hidden = config.hidden_size, "built feature mlp");
        Ok(model)
    }

    /// Joins the time-averaged `sequential` features with `non_sequential`.
    pub fn pool_features(&self, sequential: Option<&SeqBatch>, non_sequential: Option<&Matrix>) -> Result<Matrix> {
        let pooled = match sequential {
            Some(seq) if self.config.sequential_input_size > 0 => {
                if seq.features() != self.config.sequential_input_size {
                    return Err(NetError::shape(
                        "FeatureMlpRegressor::forward",
                        format!("{} sequential features", self.config.sequential_input_size),
                        seq.features(),
                    ));
                }
                if seq.seq_len() == 0 {
                    return Err(NetError::shape("FeatureMlpRegressor::forward", "at least one time step", 0));
                }
                Some(seq.mean_over_time()?)
            }
            None if self.config.sequential_input_size == 0 => None,
            _ => {
                return Err(NetError::shape(
                    "FeatureMlpRegressor::forward",
                    format!("{} sequential features", self.config.sequential_input_size),
                    "none",
                ))
            }
        };

        let joined = match (pooled, non_sequential) {
            (Some(p), Some(extra)) => p.hcat(extra)?,
            (Some(p), None) => p,
            (None, Some(extra)) => extra.clone(),
            (None, None) => {
                return Err(NetError::shape("FeatureMlpRegressor::forward", "some input features", "none"));
            }
        };
        if joined.cols != self.config.input_dim() {
            return Err(NetError::shape(
                "FeatureMlpRegressor::forward",
                format!("{} joined features", self.config.input_dim()),
                joined.shape(),
            ));
        }
        Ok(joined)
    }

    /// `(batch, 1)` non-negative predictions.
    pub fn forward(&self, sequential: Option<&SeqBatch>, non_sequential: Option<&Matrix>) -> Result<Matrix> {
        let x = self.pool_features(sequential, non_sequential)?;
        let h = self.hidden.forward(&x)?.map(|v| v.max(0.0));
        Ok(self.output.forward(&h)?.map(|v| v.max(0.0)))
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.hidden.validate()?;
        self.output.validate()?;
        let op = "FeatureMlpRegressor::validate";
        NetError::ensure_width(op, self.config.input_dim(), self.hidden.input_size)?;
        NetError::ensure_width(op, self.config.hidden_size, self.hidden.size)?;
        NetError::ensure_width(op, self.config.hidden_size, self.output.input_size)?;
        NetError::ensure_width(op, 1, self.output.size)
    }

    pub fn num_parameters(&self) -> usize {
        self.hidden.num_parameters() + self.output.num_parameters()
    }

    pub fn describe(&self) -> Vec<String> {
        vec![format!(
            "Model spec.| Feature MLP: time-averaged sequential ({}) + non-sequential ({}) features -> {} hidden -> 1, {} parameters",
            self.config.sequential_input_size,
            self.config.non_sequential_input_size,
            self.config.hidden_size,
            self.num_parameters(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn model() -> FeatureMlpRegressor {
        let config = FeatureMlpConfig {
            sequential_input_size: 3,
            non_sequential_input_size: 2,
            hidden_size: 6,
        };
        FeatureMlpRegressor::build(config, &mut StdRng::seed_from_u64(4)).unwrap()
    }

    #[test]
    fn predicts_one_non_negative_value_per_example() {
        let m = model();
        let mut rng = StdRng::seed_from_u64(8);
        let seq = SeqBatch::new((0..7).map(|_| Matrix::uniform(4, 3, 5.0, &mut rng)).collect()).unwrap();
        let extra = Matrix::uniform(4, 2, 5.0, &mut rng);
        let y = m.forward(Some(&seq), Some(&extra)).unwrap();
        assert_eq!((y.rows, y.cols), (4, 1));
        assert!(y.data.iter().flatten().all(|&v| v >= 0.0));
    }

    #[test]
    fn truncated_hidden_weights_fail_validation() {
        let mut m = model();
        assert!(m.validate().is_ok());
        m.hidden.weights.data[2].pop();
        assert!(m.validate().is_err());
    }

    #[test]
    fn missing_non_sequential_features_is_a_shape_error() {
        let m = model();
        let seq = SeqBatch::new(vec![Matrix::zeros(2, 3)]).unwrap();
        assert!(m.forward(Some(&seq), None).is_err());
        assert!(m.forward(None, Some(&Matrix::zeros(2, 2))).is_err());
    }
}
