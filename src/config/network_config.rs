use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::config::options::{MlpOptions, RecurrentOptions};
use crate::config::parse::{expect_len, parse_bool, parse_bool_list, parse_list, parse_number, parse_number_list};
use crate::error::{NetError, Result};

/// Which normalizations follow a layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormChoice {
    None,
    LayerNormOnly,
    BatchNormOnly,
    /// Layer norm, then batch norm.
    Both,
}

impl NormChoice {
    pub fn from_flags(layer_norm: bool, batch_norm: bool) -> NormChoice {
        match (layer_norm, batch_norm) {
            (false, false) => NormChoice::None,
            (true, false) => NormChoice::LayerNormOnly,
            (false, true) => NormChoice::BatchNormOnly,
            (true, true) => NormChoice::Both,
        }
    }

    /// A normalized layer absorbs the shift, so its affine transform has no bias.
    pub fn affine_bias(self) -> bool {
        self == NormChoice::None
    }
}

/// One hidden layer of the configurable MLP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub width: usize,
    pub dropout: f64,
    pub activation: ActivationFunction,
    pub batch_norm: bool,
    pub layer_norm: bool,
}

impl LayerConfig {
    pub fn norm(&self) -> NormChoice {
        NormChoice::from_flags(self.layer_norm, self.batch_norm)
    }
}

/// Full configuration of the configurable MLP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub input_dim: usize,
    pub input_layer_norm: bool,
    pub input_batch_norm: bool,
    pub layers: Vec<LayerConfig>,
}

impl NetworkConfig {
    /// Parses string-typed options. Every per-layer list must have as many
    /// entries as `dnn_lay`.
    pub fn from_options(options: &MlpOptions, input_dim: usize) -> Result<NetworkConfig> {
        let widths: Vec<usize> = parse_number_list("dnn_lay", &options.dnn_lay)?;
        let n = widths.len();

        let dropouts: Vec<f64> = parse_number_list("dnn_drop", &options.dnn_drop)?;
        expect_len("dnn_drop", n, dropouts.len())?;
        let batch_norms = parse_bool_list(&options.dnn_use_batchnorm)?;
        expect_len("dnn_use_batchnorm", n, batch_norms.len())?;
        let layer_norms = parse_bool_list(&options.dnn_use_laynorm)?;
        expect_len("dnn_use_laynorm", n, layer_norms.len())?;
        let activations: Vec<ActivationFunction> = parse_list(&options.dnn_act)?;
        expect_len("dnn_act", n, activations.len())?;

        let layers = (0..n)
            .map(|i| LayerConfig {
                width: widths[i],
                dropout: dropouts[i],
                activation: activations[i],
                batch_norm: batch_norms[i],
                layer_norm: layer_norms[i],
            })
            .collect();

        let config = NetworkConfig {
            input_dim,
            input_layer_norm: parse_bool(&options.dnn_use_laynorm_inp)?,
            input_batch_norm: parse_bool(&options.dnn_use_batchnorm_inp)?,
            layers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a typed config can still violate.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(NetError::invalid("input_dim", "must be positive"));
        }
        if self.layers.is_empty() {
            return Err(NetError::invalid("dnn_lay", "at least one layer is required"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.width == 0 {
                return Err(NetError::invalid("dnn_lay", format!("layer {i} has zero width")));
            }
            if !(0.0..=1.0).contains(&layer.dropout) {
                return Err(NetError::invalid("dnn_drop", format!("layer {i} dropout {} is outside [0, 1]", layer.dropout)));
            }
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(self.input_dim, |l| l.width)
    }
}

/// How the recurrent regressor summarizes the hidden-state sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    #[default]
    LastStep,
    Attention,
}

/// Configuration of the stacked LSTM regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentConfig {
    pub input_dim: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bias: bool,
    /// Accepted for configuration compatibility; inputs are always batch-first.
    pub batch_first: bool,
    pub dropout: f64,
    pub bidirectional: bool,
    /// Width of the non-sequential features joined before the head; 0 for none.
    #[serde(default)]
    pub aux_dim: usize,
    #[serde(default)]
    pub head_batch_norm: bool,
    #[serde(default)]
    pub pooling: Pooling,
}

impl RecurrentConfig {
    pub fn from_options(options: &RecurrentOptions, input_dim: usize) -> Result<RecurrentConfig> {
        let config = RecurrentConfig {
            input_dim,
            hidden_size: parse_number("hidden_size", &options.hidden_size)?,
            num_layers: parse_number("num_layers", &options.num_layers)?,
            bias: parse_bool(&options.bias)?,
            batch_first: parse_bool(&options.batch_first)?,
            dropout: parse_number("dropout", &options.dropout)?,
            bidirectional: parse_bool(&options.bidirectional)?,
            aux_dim: 0,
            head_batch_norm: false,
            pooling: Pooling::LastStep,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_aux_features(mut self, aux_dim: usize, head_batch_norm: bool) -> RecurrentConfig {
        self.aux_dim = aux_dim;
        self.head_batch_norm = head_batch_norm;
        self
    }

    pub fn with_pooling(mut self, pooling: Pooling) -> RecurrentConfig {
        self.pooling = pooling;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(NetError::invalid("input_dim", "must be positive"));
        }
        if self.hidden_size == 0 {
            return Err(NetError::invalid("hidden_size", "must be positive"));
        }
        if self.num_layers == 0 {
            return Err(NetError::invalid("num_layers", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(NetError::invalid("dropout", format!("{} is outside [0, 1]", self.dropout)));
        }
        Ok(())
    }

    /// Width of each layer's hidden states.
    pub fn layer_output_dim(&self) -> usize {
        self.hidden_size * if self.bidirectional { 2 } else { 1 }
    }

    /// Width entering the regression head.
    pub fn head_input_dim(&self) -> usize {
        self.layer_output_dim() + self.aux_dim
    }
}

/// Configuration of the handcrafted-feature MLP regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMlpConfig {
    pub sequential_input_size: usize,
    pub non_sequential_input_size: usize,
    pub hidden_size: usize,
}

impl FeatureMlpConfig {
    pub fn input_dim(&self) -> usize {
        self.sequential_input_size + self.non_sequential_input_size
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dim() == 0 {
            return Err(NetError::invalid("sequential_input_size", "the model needs at least one input feature"));
        }
        if self.hidden_size == 0 {
            return Err(NetError::invalid("hidden_size", "must be positive"));
        }
        Ok(())
    }
}

/// One convolution block: conv -> batch norm -> ReLU -> max pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub pool_kernel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GruConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub layer_num: usize,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineConfig {
    pub input_size: usize,
    pub output_size: usize,
}

/// Configuration of the convolutional-recurrent regressor over spectrogram
/// images. Field names follow the model config files it is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrnnConfig {
    pub conv_kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub conv_1: ConvBlockConfig,
    pub conv_2: ConvBlockConfig,
    pub conv_3: ConvBlockConfig,
    pub gru: GruConfig,
    pub fc_1: AffineConfig,
    pub fc_2: AffineConfig,
    pub output: AffineConfig,
}

impl CrnnConfig {
    pub fn conv_blocks(&self) -> [ConvBlockConfig; 3] {
        [self.conv_1, self.conv_2, self.conv_3]
    }

    /// Width of one GRU time step's output.
    pub fn gru_output_dim(&self) -> usize {
        self.gru.hidden_size * if self.gru.bidirectional { 2 } else { 1 }
    }

    pub fn validate(&self) -> Result<()> {
        if self.conv_kernel_size == 0 || self.stride == 0 {
            return Err(NetError::invalid("conv_kernel_size", "kernel size and stride must be positive"));
        }
        let names = ["conv_1", "conv_2", "conv_3"];
        let mut channels = None;
        for (name, block) in names.iter().zip(self.conv_blocks()) {
            if block.in_channels == 0 || block.out_channels == 0 || block.pool_kernel == 0 {
                return Err(NetError::invalid(name, "channels and pool kernel must be positive"));
            }
            if let Some(prev) = channels {
                if block.in_channels != prev {
                    return Err(NetError::invalid(name, format!("takes {} channels but the previous block yields {prev}", block.in_channels)));
                }
            }
            channels = Some(block.out_channels);
        }
        if self.gru.input_size == 0 || self.gru.hidden_size == 0 || self.gru.layer_num == 0 {
            return Err(NetError::invalid("gru", "input size, hidden size and layer count must be positive"));
        }
        let affine = [("fc_1", self.fc_1), ("fc_2", self.fc_2), ("output", self.output)];
        for (i, (name, layer)) in affine.iter().enumerate() {
            if layer.input_size == 0 || layer.output_size == 0 {
                return Err(NetError::invalid(name, "sizes must be positive"));
            }
            if i > 0 && layer.input_size != affine[i - 1].1.output_size {
                return Err(NetError::invalid(name, format!("takes {} inputs but the previous layer yields {}", layer.input_size, affine[i - 1].1.output_size)));
            }
        }
        Ok(())
    }
}
