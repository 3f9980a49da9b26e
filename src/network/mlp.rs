use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::activation::activation::ActivationFunction;
use crate::config::network_config::{NetworkConfig, NormChoice};
use crate::config::options::MlpOptions;
use crate::error::{NetError, Result};
use crate::layers::{BatchNorm1d, Dense, Dropout, LayerNorm, Mode};
use crate::math::matrix::Matrix;

/// Momentum of every batch-norm the MLP creates.
pub const MLP_BATCH_NORM_MOMENTUM: f64 = 0.05;

/// Normalization after a block's affine transform, resolved once at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Normalization {
    None,
    LayerNorm(LayerNorm),
    BatchNorm(BatchNorm1d),
    /// Layer norm, then batch norm.
    Both(LayerNorm, BatchNorm1d),
}

impl Normalization {
    fn for_choice(choice: NormChoice, width: usize) -> Normalization {
        let bn = || BatchNorm1d::with_momentum(width, MLP_BATCH_NORM_MOMENTUM);
        match choice {
            NormChoice::None => Normalization::None,
            NormChoice::LayerNormOnly => Normalization::LayerNorm(LayerNorm::new(width)),
            NormChoice::BatchNormOnly => Normalization::BatchNorm(bn()),
            NormChoice::Both => Normalization::Both(LayerNorm::new(width), bn()),
        }
    }

    pub fn choice(&self) -> NormChoice {
        match self {
            Normalization::None => NormChoice::None,
            Normalization::LayerNorm(_) => NormChoice::LayerNormOnly,
            Normalization::BatchNorm(_) => NormChoice::BatchNormOnly,
            Normalization::Both(..) => NormChoice::Both,
        }
    }

    pub fn forward(&mut self, x: Matrix, mode: Mode) -> Result<Matrix> {
        match self {
            Normalization::None => Ok(x),
            Normalization::LayerNorm(ln) => ln.forward(&x),
            Normalization::BatchNorm(bn) => bn.forward(&x, mode),
            Normalization::Both(ln, bn) => bn.forward(&ln.forward(&x)?, mode),
        }
    }

    /// Every contained layer must be internally consistent and `width` wide.
    pub fn validate(&self, width: usize) -> Result<()> {
        let check_ln = |ln: &LayerNorm| -> Result<()> {
            ln.validate()?;
            NetError::ensure_width("Normalization::validate", width, ln.features())
        };
        let check_bn = |bn: &BatchNorm1d| -> Result<()> {
            bn.validate()?;
            NetError::ensure_width("Normalization::validate", width, bn.features())
        };
        match self {
            Normalization::None => Ok(()),
            Normalization::LayerNorm(ln) => check_ln(ln),
            Normalization::BatchNorm(bn) => check_bn(bn),
            Normalization::Both(ln, bn) => check_ln(ln).and_then(|_| check_bn(bn)),
        }
    }

    fn num_parameters(&self) -> usize {
        match self {
            Normalization::None => 0,
            Normalization::LayerNorm(ln) => ln.num_parameters(),
            Normalization::BatchNorm(bn) => bn.num_parameters(),
            Normalization::Both(ln, bn) => ln.num_parameters() + bn.num_parameters(),
        }
    }
}

/// affine -> normalization -> activation -> dropout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpBlock {
    pub affine: Dense,
    pub norm: Normalization,
    pub activation: ActivationFunction,
    pub dropout: Dropout,
}

impl MlpBlock {
    pub fn forward(&mut self, x: &Matrix, mode: Mode) -> Result<Matrix> {
        let z = self.affine.forward(x)?;
        let z = self.norm.forward(z, mode)?;
        let a = self.activation.apply(&z);
        Ok(self.dropout.forward(&a, mode))
    }

    pub fn num_parameters(&self) -> usize {
        self.affine.num_parameters() + self.norm.num_parameters()
    }
}

/// Variable-depth perceptron assembled from a [`NetworkConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    pub config: NetworkConfig,
    pub input_layer_norm: Option<LayerNorm>,
    pub input_batch_norm: Option<BatchNorm1d>,
    pub blocks: Vec<MlpBlock>,
}

impl Mlp {
    /// Builds every block. Fails before allocating any layer if the config is
    /// invalid.
    pub fn build<R: Rng + ?Sized>(config: NetworkConfig, rng: &mut R) -> Result<Mlp> {
        config.validate()?;

        let input_layer_norm = config.input_layer_norm.then(|| LayerNorm::new(config.input_dim));
        let input_batch_norm = config.input_batch_norm
            .then(|| BatchNorm1d::with_momentum(config.input_dim, MLP_BATCH_NORM_MOMENTUM));

        let mut blocks = Vec::with_capacity(config.layers.len());
        let mut current_input = config.input_dim;
        for (i, layer) in config.layers.iter().enumerate() {
            let choice = layer.norm();
            let affine = Dense::small_uniform(current_input, layer.width, choice.affine_bias(), rng);
            debug!(
                layer = i,
                input = current_input,
                width = layer.width,
                norm = ?choice,
                activation = layer.activation.key(),
                dropout = layer.dropout,
                "mlp block"
            );
            blocks.push(MlpBlock {
                affine,
                norm: Normalization::for_choice(choice, layer.width),
                activation: layer.activation,
                dropout: Dropout::new(layer.dropout)?,
            });
            current_input = layer.width;
        }

        let mlp = Mlp { config, input_layer_norm, input_batch_norm, blocks };
        info!(layers = mlp.blocks.len(), out_dim = mlp.out_dim(), params = mlp.num_parameters(), "built mlp");
        Ok(mlp)
    }

    /// Parses string-typed options and builds the network.
    pub fn from_options<R: Rng + ?Sized>(options: &MlpOptions, input_dim: usize, rng: &mut R) -> Result<Mlp> {
        Mlp::build(NetworkConfig::from_options(options, input_dim)?, rng)
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    pub fn out_dim(&self) -> usize {
        self.config.output_dim()
    }

    /// `(batch, input_dim)` -> `(batch, out_dim)`.
    pub fn forward(&mut self, input: &Matrix, mode: Mode) -> Result<Matrix> {
        if input.cols != self.input_dim() {
            return Err(NetError::shape("Mlp::forward", format!("{} input features", self.input_dim()), input.shape()));
        }
        let mut x = match &self.input_layer_norm {
            Some(ln) => ln.forward(input)?,
            None => input.clone(),
        };
        if let Some(bn) = &mut self.input_batch_norm {
            x = bn.forward(&x, mode)?;
        }
        for block in &mut self.blocks {
            x = block.forward(&x, mode)?;
        }
        Ok(x)
    }

    /// Checks loaded weights against the stored config: every block present,
    /// widths chaining from `input_dim`, bias only on unnormalized blocks.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        let op = "Mlp::validate";
        if self.input_layer_norm.is_some() != self.config.input_layer_norm
            || self.input_batch_norm.is_some() != self.config.input_batch_norm
        {
            return Err(NetError::invalid("dnn_use_laynorm_inp", "input normalization does not match the config"));
        }
        if let Some(ln) = &self.input_layer_norm {
            ln.validate()?;
            NetError::ensure_width(op, self.input_dim(), ln.features())?;
        }
        if let Some(bn) = &self.input_batch_norm {
            bn.validate()?;
            NetError::ensure_width(op, self.input_dim(), bn.features())?;
        }
        NetError::ensure_width(op, self.config.layers.len(), self.blocks.len())?;

        let mut current_input = self.input_dim();
        for (block, layer) in self.blocks.iter().zip(&self.config.layers) {
            block.affine.validate()?;
            NetError::ensure_width(op, current_input, block.affine.input_size)?;
            NetError::ensure_width(op, layer.width, block.affine.size)?;
            if block.norm.choice() != layer.norm() || block.affine.has_bias() != layer.norm().affine_bias() {
                return Err(NetError::invalid("dnn_use_laynorm", "block normalization does not match the config"));
            }
            block.norm.validate(layer.width)?;
            block.dropout.validate()?;
            current_input = layer.width;
        }
        Ok(())
    }

    pub fn num_parameters(&self) -> usize {
        self.input_layer_norm.as_ref().map_or(0, LayerNorm::num_parameters)
            + self.input_batch_norm.as_ref().map_or(0, BatchNorm1d::num_parameters)
            + self.blocks.iter().map(MlpBlock::num_parameters).sum::<usize>()
    }

    pub fn describe(&self) -> Vec<String> {
        let mut msg = vec![format!(
            "Model spec.| MLP: {} -> {} over {} blocks, {} parameters",
            self.input_dim(), self.out_dim(), self.blocks.len(), self.num_parameters()
        )];
        for (i, block) in self.blocks.iter().enumerate() {
            msg.push(format!(
                "           | block {i}: {} -> {} bias={} norm={:?} act={} dropout={}",
                block.affine.input_size,
                block.affine.size,
                block.affine.has_bias(),
                block.norm.choice(),
                block.activation.key(),
                block.dropout.p,
            ));
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::network_config::LayerConfig;
    use rand::{rngs::StdRng, SeedableRng};

    fn layer(width: usize, activation: ActivationFunction, layer_norm: bool, batch_norm: bool) -> LayerConfig {
        LayerConfig { width, dropout: 0.0, activation, batch_norm, layer_norm }
    }

    #[test]
    fn bias_is_dropped_exactly_on_normalized_layers() {
        let config = NetworkConfig {
            input_dim: 3,
            input_layer_norm: false,
            input_batch_norm: false,
            layers: vec![
                layer(4, ActivationFunction::ReLU, false, false),
                layer(4, ActivationFunction::Tanh, true, false),
                layer(4, ActivationFunction::Tanh, false, true),
                layer(2, ActivationFunction::Sigmoid, true, true),
            ],
        };
        let mlp = Mlp::build(config, &mut StdRng::seed_from_u64(2)).unwrap();
        let biases: Vec<bool> = mlp.blocks.iter().map(|b| b.affine.has_bias()).collect();
        assert_eq!(biases, vec![true, false, false, false]);
        assert_eq!(mlp.blocks[3].norm.choice(), NormChoice::Both);
    }

    #[test]
    fn input_normalization_is_built_only_when_requested() {
        let config = NetworkConfig {
            input_dim: 3,
            input_layer_norm: true,
            input_batch_norm: true,
            layers: vec![layer(2, ActivationFunction::ReLU, false, false)],
        };
        let mut mlp = Mlp::build(config, &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(mlp.input_layer_norm.is_some());
        assert!(mlp.input_batch_norm.is_some());
        let x = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![0.0, -1.0, 4.0]]).unwrap();
        assert_eq!(mlp.forward(&x, Mode::Train).unwrap().shape().1, 2);
    }

    #[test]
    fn describe_lists_every_block() {
        let config = NetworkConfig {
            input_dim: 2,
            input_layer_norm: false,
            input_batch_norm: false,
            layers: vec![layer(3, ActivationFunction::ReLU, false, false); 3],
        };
        let mlp = Mlp::build(config, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(mlp.describe().len(), 4);
    }

    #[test]
    fn validate_rejects_broken_width_chain() {
        let config = NetworkConfig {
            input_dim: 3,
            input_layer_norm: false,
            input_batch_norm: false,
            layers: vec![
                layer(4, ActivationFunction::ReLU, false, false),
                layer(2, ActivationFunction::Tanh, true, false),
            ],
        };
        let mut mlp = Mlp::build(config, &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(mlp.validate().is_ok());

        let mut rng = StdRng::seed_from_u64(3);
        mlp.blocks[1].affine = Dense::small_uniform(5, 2, false, &mut rng);
        assert!(matches!(mlp.validate(), Err(NetError::ShapeMismatch { .. })));
    }

    #[test]
    fn empty_layer_list_is_rejected() {
        let config = NetworkConfig {
            input_dim: 2,
            input_layer_norm: false,
            input_batch_norm: false,
            layers: vec![],
        };
        let err = Mlp::build(config, &mut StdRng::seed_from_u64(2)).unwrap_err();
        assert!(err.is_config());
    }
}
