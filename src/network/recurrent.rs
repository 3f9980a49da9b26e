use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::network_config::{Pooling, RecurrentConfig};
use crate::config::options::RecurrentOptions;
use crate::error::{NetError, Result};
use crate::layers::{BatchNorm1d, Dense, Dropout, LstmLayer, Mode, TemporalAttention};
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;

/// Everything a forward pass of [`RecurrentRegressor`] produces.
#[derive(Debug, Clone)]
pub struct RecurrentOutput {
    /// `(batch, 1)`, never negative.
    pub predictions: Matrix,
    /// Hidden-state sequence of every layer, first to last.
    pub hidden_states: Vec<SeqBatch>,
    /// `(batch, seq_len)` attention weights when attention pooling is enabled.
    pub attention: Option<Matrix>,
}

/// Stacked LSTM with a single non-negative regression output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentRegressor {
    pub config: RecurrentConfig,
    pub layers: Vec<LstmLayer>,
    pub inter_layer_dropout: Dropout,
    pub attention: Option<TemporalAttention>,
    pub head_norm: Option<BatchNorm1d>,
    pub head: Dense,
}

impl RecurrentRegressor {
    pub fn build<R: Rng + ?Sized>(config: RecurrentConfig, rng: &mut R) -> Result<RecurrentRegressor> {
        config.validate()?;

        let layer_out = config.layer_output_dim();
        let layers = (0..config.num_layers)
            .map(|i| {
                let input_size = if i == 0 { config.input_dim } else { layer_out };
                debug!(layer = i, input = input_size, hidden = config.hidden_size, bidirectional = config.bidirectional, "lstm layer");
                LstmLayer::new(input_size, config.hidden_size, config.bias, config.bidirectional, rng)
            })
            .collect();

        let attention = match config.pooling {
            Pooling::LastStep => None,
            Pooling::Attention => Some(TemporalAttention::new(layer_out, rng)),
        };
        let head_norm = config.head_batch_norm.then(|| BatchNorm1d::new(config.head_input_dim()));
        let head = Dense::fan_in_uniform(config.head_input_dim(), 1, rng);

        let model = RecurrentRegressor {
            inter_layer_dropout: Dropout::new(config.dropout)?,
            config,
            layers,
            attention,
            head_norm,
            head,
        };
        info!(layers = model.layers.len(), params = model.num_parameters(), "built recurrent regressor");
        Ok(model)
    }

    pub fn from_options<R: Rng + ?Sized>(options: &RecurrentOptions, input_dim: usize, rng: &mut R) -> Result<RecurrentRegressor> {
        RecurrentRegressor::build(RecurrentConfig::from_options(options, input_dim)?, rng)
    }

    /// `input` holds `seq_len` steps of `(batch, input_dim)`; `aux` is
    /// `(batch, aux_dim)` and required exactly when `aux_dim > 0`.
    ///
    /// In training mode the dropout rate is applied to the input of every layer
    /// after the first. `hidden_states` are recorded before that dropout.
    pub fn forward(&mut self, input: &SeqBatch, aux: Option<&Matrix>, mode: Mode) -> Result<RecurrentOutput> {
        if input.seq_len() == 0 {
            return Err(NetError::shape("RecurrentRegressor::forward", "at least one time step", 0));
        }
        if input.features() != self.config.input_dim {
            return Err(NetError::shape(
                "RecurrentRegressor::forward",
                format!("{} input features", self.config.input_dim),
                input.features(),
            ));
        }

        if self.layers.is_empty() {
            return Err(NetError::invalid("num_layers", "model has no recurrent layers"));
        }
        let last = self.layers.len() - 1;
        let mut hidden_states = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();
        for (idx, layer) in self.layers.iter().enumerate() {
            let out = layer.forward(&current)?;
            current = if idx < last && mode == Mode::Train && self.inter_layer_dropout.p > 0.0 {
                let steps = out.steps.iter().map(|s| self.inter_layer_dropout.forward(s, mode)).collect();
                SeqBatch { steps }
            } else {
                out.clone()
            };
            hidden_states.push(out);
        }

        let (summary, attention) = match &self.attention {
            Some(att) => {
                let pooled = att.forward(&current)?;
                (pooled.pooled, Some(pooled.weights))
            }
            None => {
                let step = current.last_step()
                    .ok_or_else(|| NetError::shape("RecurrentRegressor::forward", "at least one time step", 0))?;
                (step.clone(), None)
            }
        };

        let mut features = match (aux, self.config.aux_dim) {
            (None, 0) => summary,
            (Some(extra), dim) if dim > 0 && extra.cols == dim => summary.hcat(extra)?,
            (Some(extra), dim) => {
                return Err(NetError::shape("RecurrentRegressor::forward", format!("{dim} auxiliary features"), extra.shape()));
            }
            (None, dim) => {
                return Err(NetError::shape("RecurrentRegressor::forward", format!("{dim} auxiliary features"), "none"));
            }
        };
        if let Some(bn) = &mut self.head_norm {
            features = bn.forward(&features, mode)?;
        }

        let predictions = self.head.forward(&features)?.map(|x| x.max(0.0));
        Ok(RecurrentOutput { predictions, hidden_states, attention })
    }

    /// Checks loaded weights against the stored config.
    pub fn validate(&self) -> Result<()> {
        let c = &self.config;
        c.validate()?;
        let op = "RecurrentRegressor::validate";
        NetError::ensure_width(op, c.num_layers, self.layers.len())?;
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate()?;
            let input = if i == 0 { c.input_dim } else { c.layer_output_dim() };
            NetError::ensure_width(op, input, layer.input_size())?;
            NetError::ensure_width(op, c.layer_output_dim(), layer.output_size())?;
            if layer.forward_cell.bias_ih.is_some() != c.bias {
                return Err(NetError::invalid("bias", format!("layer {i} does not match the config")));
            }
        }
        self.inter_layer_dropout.validate()?;

        match (&self.attention, c.pooling) {
            (None, Pooling::LastStep) => {}
            (Some(att), Pooling::Attention) => NetError::ensure_width(op, c.layer_output_dim(), att.features())?,
            _ => return Err(NetError::invalid("pooling", "attention weights do not match the pooling mode")),
        }
        match (&self.head_norm, c.head_batch_norm) {
            (None, false) => {}
            (Some(bn), true) => {
                bn.validate()?;
                NetError::ensure_width(op, c.head_input_dim(), bn.features())?;
            }
            _ => return Err(NetError::invalid("head_batch_norm", "head normalization does not match the config")),
        }
        self.head.validate()?;
        NetError::ensure_width(op, c.head_input_dim(), self.head.input_size)?;
        NetError::ensure_width(op, 1, self.head.size)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(LstmLayer::num_parameters).sum::<usize>()
            + self.attention.as_ref().map_or(0, TemporalAttention::num_parameters)
            + self.head_norm.as_ref().map_or(0, BatchNorm1d::num_parameters)
            + self.head.num_parameters()
    }

    pub fn describe(&self) -> Vec<String> {
        let c = &self.config;
        let mut msg = vec![format!(
            "Model spec.| LSTM: {} layers, hidden {} ({}), {} parameters",
            c.num_layers,
            c.hidden_size,
            if c.bidirectional { "bidirectional" } else { "unidirectional" },
            self.num_parameters(),
        )];
        if c.aux_dim > 0 {
            msg.push(format!("           | {} non-sequential features joined before the output layer", c.aux_dim));
        }
        if c.pooling == Pooling::Attention {
            msg.push("           | temporal attention pooling over the last layer".to_string());
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn config() -> RecurrentConfig {
        RecurrentConfig {
            input_dim: 3,
            hidden_size: 4,
            num_layers: 2,
            bias: true,
            batch_first: true,
            dropout: 0.0,
            bidirectional: false,
            aux_dim: 0,
            head_batch_norm: false,
            pooling: Pooling::LastStep,
        }
    }

    fn input(batch: usize, len: usize, rng: &mut StdRng) -> SeqBatch {
        SeqBatch::new((0..len).map(|_| Matrix::uniform(batch, 3, 2.0, rng)).collect()).unwrap()
    }

    #[test]
    fn second_layer_consumes_doubled_width_when_bidirectional() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut cfg = config();
        cfg.bidirectional = true;
        let model = RecurrentRegressor::build(cfg, &mut rng).unwrap();
        assert_eq!(model.layers[0].input_size(), 3);
        assert_eq!(model.layers[1].input_size(), 8);
        assert_eq!(model.head.input_size, 8);
    }

    #[test]
    fn missing_aux_features_is_a_shape_error() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = RecurrentRegressor::build(config().with_aux_features(2, false), &mut rng).unwrap();
        let x = input(2, 3, &mut rng);
        assert!(matches!(model.forward(&x, None, Mode::Eval), Err(NetError::ShapeMismatch { .. })));
        let aux = Matrix::zeros(2, 2);
        assert_eq!(model.forward(&x, Some(&aux), Mode::Eval).unwrap().predictions.shape().0, 2);
    }

    #[test]
    fn attention_pooling_reports_weights() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = RecurrentRegressor::build(config().with_pooling(Pooling::Attention), &mut rng).unwrap();
        let out = model.forward(&input(2, 5, &mut rng), None, Mode::Eval).unwrap();
        let weights = out.attention.unwrap();
        assert_eq!(weights.shape().1, 5);
        assert!(out.predictions.data.iter().flatten().all(|&p| p >= 0.0));
    }

    #[test]
    fn validate_rejects_missing_layer() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = RecurrentRegressor::build(config().with_aux_features(1, true), &mut rng).unwrap();
        assert!(model.validate().is_ok());
        model.layers.pop();
        assert!(model.validate().is_err());
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = RecurrentRegressor::build(config(), &mut rng).unwrap();
        let empty = SeqBatch::new(vec![]).unwrap();
        assert!(model.forward(&empty, None, Mode::Eval).is_err());
    }
}
