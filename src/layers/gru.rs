use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::layers::lstm::uniform_vec;
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;

/// GRU cell, one direction.
///
/// - r = sigmoid(x W_ir + b_ir + h W_hr + b_hr)
/// - z = sigmoid(x W_iz + b_iz + h W_hz + b_hz)
/// - n = tanh(x W_in + b_in + r * (h W_hn + b_hn))
/// - h' = (1 - z) * n + z * h
///
/// Gate blocks are packed in the order reset, update, new along the columns of
/// `weight_ih` `(input_size, 3H)` and `weight_hh` `(H, 3H)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruCell {
    pub input_size: usize,
    pub hidden_size: usize,
    pub weight_ih: Matrix,
    pub weight_hh: Matrix,
    pub bias_ih: Vec<f64>,
    pub bias_hh: Vec<f64>,
}

impl GruCell {
    /// Every parameter ~ U(±1 / sqrt(hidden_size)).
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> GruCell {
        let bound = 1.0 / (hidden_size.max(1) as f64).sqrt();
        let gates = 3 * hidden_size;
        GruCell {
            input_size,
            hidden_size,
            weight_ih: Matrix::uniform(input_size, gates, bound, rng),
            weight_hh: Matrix::uniform(hidden_size, gates, bound, rng),
            bias_ih: uniform_vec(gates, bound, rng),
            bias_hh: uniform_vec(gates, bound, rng),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let gates = 3 * self.hidden_size;
        self.weight_ih.expect_shape("GruCell::validate", self.input_size, gates)?;
        self.weight_hh.expect_shape("GruCell::validate", self.hidden_size, gates)?;
        NetError::ensure_width("GruCell::validate", gates, self.bias_ih.len())?;
        NetError::ensure_width("GruCell::validate", gates, self.bias_hh.len())
    }

    /// One time step from hidden state `h`, `(batch, hidden_size)`.
    pub fn step(&self, x: &Matrix, h: &Matrix) -> Result<Matrix> {
        let hs = self.hidden_size;
        let gi = x.matmul(&self.weight_ih)?.add_row(&self.bias_ih)?;
        let gh = h.matmul(&self.weight_hh)?.add_row(&self.bias_hh)?;

        let sigmoid = |v: f64| 1.0 / (1.0 + (-v).exp());
        let r = gi.slice_cols(0, hs).add(&gh.slice_cols(0, hs))?.map(sigmoid);
        let z = gi.slice_cols(hs, 2 * hs).add(&gh.slice_cols(hs, 2 * hs))?.map(sigmoid);
        let n = gi.slice_cols(2 * hs, 3 * hs)
            .add(&r.hadamard(&gh.slice_cols(2 * hs, 3 * hs))?)?
            .map(f64::tanh);

        let keep = z.hadamard(h)?;
        let update = z.map(|v| 1.0 - v).hadamard(&n)?;
        update.add(&keep)
    }

    fn run<'a, I>(&self, steps: I, batch: usize) -> Result<Vec<Matrix>>
    where
        I: Iterator<Item = &'a Matrix>,
    {
        let mut h = Matrix::zeros(batch, self.hidden_size);
        let mut out = Vec::new();
        for x in steps {
            h = self.step(x, &h)?;
            out.push(h.clone());
        }
        Ok(out)
    }

    pub fn num_parameters(&self) -> usize {
        3 * self.hidden_size * (self.input_size + self.hidden_size) + self.bias_ih.len() + self.bias_hh.len()
    }
}

/// Stacked GRU without inter-layer dropout; bidirectional layers concatenate
/// `[forward, backward]` at every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gru {
    pub layers: Vec<(GruCell, Option<GruCell>)>,
}

impl Gru {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, num_layers: usize, bidirectional: bool, rng: &mut R) -> Gru {
        let directions = if bidirectional { 2 } else { 1 };
        let layers = (0..num_layers)
            .map(|i| {
                let input = if i == 0 { input_size } else { hidden_size * directions };
                let fwd = GruCell::new(input, hidden_size, rng);
                let bwd = bidirectional.then(|| GruCell::new(input, hidden_size, rng));
                (fwd, bwd)
            })
            .collect();
        Gru { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |(cell, _)| cell.input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |(cell, bwd)| cell.hidden_size * if bwd.is_some() { 2 } else { 1 })
    }

    /// Checks every cell and that each layer consumes the previous one's width.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(NetError::invalid("layer_num", "a GRU needs at least one layer"));
        }
        let mut expected = self.input_size();
        for (fwd, bwd) in &self.layers {
            fwd.validate()?;
            NetError::ensure_width("Gru::validate", expected, fwd.input_size)?;
            if let Some(cell) = bwd {
                cell.validate()?;
                NetError::ensure_width("Gru::validate", fwd.input_size, cell.input_size)?;
                NetError::ensure_width("Gru::validate", fwd.hidden_size, cell.hidden_size)?;
            }
            expected = fwd.hidden_size * if bwd.is_some() { 2 } else { 1 };
        }
        Ok(())
    }

    /// Last layer's hidden-state sequence.
    pub fn forward(&self, input: &SeqBatch) -> Result<SeqBatch> {
        if input.features() != self.input_size() && input.seq_len() > 0 {
            return Err(NetError::shape("Gru::forward", format!("{} input features", self.input_size()), input.features()));
        }
        let batch = input.batch_size();
        let mut current = input.clone();
        for (fwd, bwd) in &self.layers {
            let forward = SeqBatch { steps: fwd.run(current.steps.iter(), batch)? };
            current = match bwd {
                None => forward,
                Some(cell) => {
                    let mut steps = cell.run(current.steps.iter().rev(), batch)?;
                    steps.reverse();
                    forward.concat_features(&SeqBatch { steps })?
                }
            };
        }
        Ok(current)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter()
            .map(|(f, b)| f.num_parameters() + b.as_ref().map_or(0, GruCell::num_parameters))
            .sum()
    }
}
