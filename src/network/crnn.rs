use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::network_config::{ConvBlockConfig, CrnnConfig};
use crate::error::{NetError, Result};
use crate::layers::{BatchNorm1d, BatchNorm2d, Conv2d, Dense, Dropout, Gru, MaxPool2d, Mode};
use crate::math::feature_map::FeatureMap;
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;

/// Dropout after the normalized GRU features.
pub const GRU_DROPOUT: f64 = 0.6;
/// Dropout after each hidden dense layer.
pub const DENSE_DROPOUT: f64 = 0.5;

/// conv -> batch norm -> ReLU -> max pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlock {
    pub conv: Conv2d,
    pub norm: BatchNorm2d,
    pub pool: MaxPool2d,
}

impl ConvBlock {
    fn new<R: Rng + ?Sized>(block: ConvBlockConfig, config: &CrnnConfig, rng: &mut R) -> ConvBlock {
        ConvBlock {
            conv: Conv2d::xavier_uniform(
                block.in_channels,
                block.out_channels,
                config.conv_kernel_size,
                config.stride,
                config.padding,
                rng,
            ),
            norm: BatchNorm2d::new(block.out_channels),
            pool: MaxPool2d { kernel: block.pool_kernel },
        }
    }

    pub fn forward(&mut self, batch: &[FeatureMap], mode: Mode) -> Result<Vec<FeatureMap>> {
        let convolved = batch.iter()
            .map(|map| self.conv.forward(map))
            .collect::<Result<Vec<_>>>()?;
        self.norm.forward(&convolved, mode)?
            .iter()
            .map(|map| self.pool.forward(&map.map(|v| v.max(0.0))))
            .collect()
    }

    fn validate(&self, block: ConvBlockConfig, config: &CrnnConfig) -> Result<()> {
        let op = "ConvBlock::validate";
        self.conv.validate()?;
        NetError::ensure_width(op, block.in_channels, self.conv.in_channels)?;
        NetError::ensure_width(op, block.out_channels, self.conv.out_channels)?;
        NetError::ensure_width(op, config.conv_kernel_size, self.conv.kernel)?;
        NetError::ensure_width(op, config.stride, self.conv.stride)?;
        NetError::ensure_width(op, config.padding, self.conv.padding)?;
        self.norm.validate()?;
        NetError::ensure_width(op, block.out_channels, self.norm.channels())?;
        NetError::ensure_width(op, block.pool_kernel, self.pool.kernel)
    }

    fn num_parameters(&self) -> usize {
        self.conv.num_parameters() + self.norm.num_parameters()
    }
}

/// Convolutional-recurrent regressor over `(channels, height, width)`
/// spectrogram images.
///
/// Three conv blocks shrink the image; each example's remaining activations are
/// read as `height` steps of `channels * width` features and fed to a GRU. The
/// GRU outputs of all steps are flattened, batch-normalized and dropped out,
/// then pass through two `dense -> ReLU -> dropout` blocks and a sigmoid
/// output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrnnRegressor {
    pub config: CrnnConfig,
    pub conv_blocks: Vec<ConvBlock>,
    pub gru: Gru,
    pub gru_norm: BatchNorm1d,
    pub gru_dropout: Dropout,
    pub hidden: Vec<Dense>,
    pub hidden_dropout: Dropout,
    pub output: Dense,
}

impl CrnnRegressor {
    pub fn build<R: Rng + ?Sized>(config: CrnnConfig, rng: &mut R) -> Result<CrnnRegressor> {
        config.validate()?;

        let conv_blocks = config.conv_blocks().into_iter()
            .enumerate()
            .map(|(i, block)| {
                debug!(block = i, in_channels = block.in_channels, out_channels = block.out_channels, pool = block.pool_kernel, "conv block");
                ConvBlock::new(block, &config, rng)
            })
            .collect();
        let gru = Gru::new(config.gru.input_size, config.gru.hidden_size, config.gru.layer_num, config.gru.bidirectional, rng);
        let hidden = [config.fc_1, config.fc_2].iter()
            .map(|fc| Dense::fan_in_uniform(fc.input_size, fc.output_size, rng))
            .collect();
        let output = Dense::fan_in_uniform(config.output.input_size, config.output.output_size, rng);

        let model = CrnnRegressor {
            conv_blocks,
            gru,
            gru_norm: BatchNorm1d::new(config.fc_1.input_size),
            gru_dropout: Dropout::new(GRU_DROPOUT)?,
            hidden,
            hidden_dropout: Dropout::new(DENSE_DROPOUT)?,
            output,
            config,
        };
        info!(params = model.num_parameters(), "built crnn regressor");
        Ok(model)
    }

    /// `(batch, output_size)` scores in `(0, 1)`.
    pub fn forward(&mut self, images: &[FeatureMap], mode: Mode) -> Result<Matrix> {
        let mut maps = images.to_vec();
        for block in &mut self.conv_blocks {
            maps = block.forward(&maps, mode)?;
        }

        let sequences: Vec<Matrix> = maps.iter().map(FeatureMap::rows_as_sequence).collect();
        let steps = SeqBatch::from_examples(&sequences)?;
        let hidden_states = self.gru.forward(&steps)?;

        let x = self.gru_norm.forward(&hidden_states.flatten_time(), mode)?;
        let mut x = self.gru_dropout.forward(&x, mode);
        for dense in &self.hidden {
            let a = dense.forward(&x)?.map(|v| v.max(0.0));
            x = self.hidden_dropout.forward(&a, mode);
        }
        Ok(self.output.forward(&x)?.map(|v| 1.0 / (1.0 + (-v).exp())))
    }

    /// Checks loaded weights against the stored config.
    pub fn validate(&self) -> Result<()> {
        let c = &self.config;
        c.validate()?;
        let op = "CrnnRegressor::validate";
        NetError::ensure_width(op, 3, self.conv_blocks.len())?;
        for (block, cfg) in self.conv_blocks.iter().zip(c.conv_blocks()) {
            block.validate(cfg, c)?;
        }

        self.gru.validate()?;
        NetError::ensure_width(op, c.gru.layer_num, self.gru.layers.len())?;
        NetError::ensure_width(op, c.gru.input_size, self.gru.input_size())?;
        NetError::ensure_width(op, c.gru_output_dim(), self.gru.output_size())?;

        self.gru_norm.validate()?;
        NetError::ensure_width(op, c.fc_1.input_size, self.gru_norm.features())?;
        self.gru_dropout.validate()?;
        self.hidden_dropout.validate()?;

        NetError::ensure_width(op, 2, self.hidden.len())?;
        for (dense, cfg) in self.hidden.iter().chain([&self.output]).zip([c.fc_1, c.fc_2, c.output]) {
            dense.validate()?;
            NetError::ensure_width(op, cfg.input_size, dense.input_size)?;
            NetError::ensure_width(op, cfg.output_size, dense.size)?;
        }
        Ok(())
    }

    pub fn num_parameters(&self) -> usize {
        self.conv_blocks.iter().map(ConvBlock::num_parameters).sum::<usize>()
            + self.gru.num_parameters()
            + self.gru_norm.num_parameters()
            + self.hidden.iter().map(Dense::num_parameters).sum::<usize>()
            + self.output.num_parameters()
    }

    pub fn describe(&self) -> Vec<String> {
        let c = &self.config;
        let channels: Vec<String> = std::iter::once(c.conv_1.in_channels)
            .chain(c.conv_blocks().iter().map(|b| b.out_channels))
            .map(|n| n.to_string())
            .collect();
        vec![
            format!("Model spec.| CRNN: use CRNN model for melspectrogram inputs(img), {} parameters", self.num_parameters()),
            format!(
                "           | conv channels {} (kernel {}, stride {}, padding {})",
                channels.join(" -> "), c.conv_kernel_size, c.stride, c.padding
            ),
            format!(
                "           | GRU: {} layers, hidden {} ({}), dense {} -> {} -> {} -> {}",
                c.gru.layer_num,
                c.gru.hidden_size,
                if c.gru.bidirectional { "bidirectional" } else { "unidirectional" },
                c.fc_1.input_size, c.fc_1.output_size, c.fc_2.output_size, c.output.output_size,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::network_config::{AffineConfig, GruConfig};
    use rand::{rngs::StdRng, SeedableRng};

    // 1x16x16 -> 2x8x8 -> 3x4x4 -> 4x2x2: two GRU steps of 8 features
    fn config() -> CrnnConfig {
        CrnnConfig {
            conv_kernel_size: 3,
            stride: 1,
            padding: 1,
            conv_1: ConvBlockConfig { in_channels: 1, out_channels: 2, pool_kernel: 2 },
            conv_2: ConvBlockConfig { in_channels: 2, out_channels: 3, pool_kernel: 2 },
            conv_3: ConvBlockConfig { in_channels: 3, out_channels: 4, pool_kernel: 2 },
            gru: GruConfig { input_size: 8, hidden_size: 3, layer_num: 1, bidirectional: true },
            fc_1: AffineConfig { input_size: 12, output_size: 5 },
            fc_2: AffineConfig { input_size: 5, output_size: 4 },
            output: AffineConfig { input_size: 4, output_size: 1 },
        }
    }

    fn images(batch: usize, side: usize, rng: &mut StdRng) -> Vec<FeatureMap> {
        (0..batch)
            .map(|_| FeatureMap::from_matrix(&Matrix::uniform(side, side, 1.0, rng)))
            .collect()
    }

    #[test]
    fn predicts_probabilities_in_both_modes() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = CrnnRegressor::build(config(), &mut rng).unwrap();
        let x = images(3, 16, &mut rng);
        for mode in [Mode::Train, Mode::Eval] {
            let y = model.forward(&x, mode).unwrap();
            assert_eq!((y.rows, y.cols), (3, 1));
            assert!(y.data.iter().flatten().all(|&p| p > 0.0 && p < 1.0));
        }
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = CrnnRegressor::build(config(), &mut rng).unwrap();
        let x = images(2, 16, &mut rng);
        assert_eq!(model.forward(&x, Mode::Eval).unwrap(), model.forward(&x, Mode::Eval).unwrap());
    }

    #[test]
    fn image_size_that_misses_the_gru_width_is_a_shape_error() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = CrnnRegressor::build(config(), &mut rng).unwrap();
        let err = model.forward(&images(2, 24, &mut rng), Mode::Eval).unwrap_err();
        assert!(matches!(err, NetError::ShapeMismatch { .. }));
    }

    #[test]
    fn validate_accepts_fresh_and_rejects_corrupt_weights() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = CrnnRegressor::build(config(), &mut rng).unwrap();
        assert!(model.validate().is_ok());
        model.conv_blocks[1].conv.biases.pop();
        assert!(model.validate().is_err());
    }

    #[test]
    fn describe_reports_channel_chain() {
        let model = CrnnRegressor::build(config(), &mut StdRng::seed_from_u64(1)).unwrap();
        let lines = model.describe();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("1 -> 2 -> 3 -> 4"));
    }
}
