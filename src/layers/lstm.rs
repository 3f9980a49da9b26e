use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;

/// LSTM cell, one direction.
///
/// - i = sigmoid(x W_ii + h W_hi + b_i)
/// - f = sigmoid(x W_if + h W_hf + b_f)
/// - g = tanh(x W_ig + h W_hg + b_g)
/// - o = sigmoid(x W_io + h W_ho + b_o)
/// - c' = f * c + i * g
/// - h' = o * tanh(c')
///
/// Gate blocks are packed in the order input, forget, cell, output along the
/// columns of `weight_ih` `(input_size, 4H)` and `weight_hh` `(H, 4H)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,
    pub weight_ih: Matrix,
    pub weight_hh: Matrix,
    pub bias_ih: Option<Vec<f64>>,
    pub bias_hh: Option<Vec<f64>>,
}

impl LstmCell {
    /// Every parameter ~ U(±1 / sqrt(hidden_size)).
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, bias: bool, rng: &mut R) -> LstmCell {
        let bound = 1.0 / (hidden_size.max(1) as f64).sqrt();
        let gates = 4 * hidden_size;
        let weight_ih = Matrix::uniform(input_size, gates, bound, rng);
        let weight_hh = Matrix::uniform(hidden_size, gates, bound, rng);
        let (bias_ih, bias_hh) = if bias {
            (Some(uniform_vec(gates, bound, rng)), Some(uniform_vec(gates, bound, rng)))
        } else {
            (None, None)
        };
        LstmCell { input_size, hidden_size, weight_ih, weight_hh, bias_ih, bias_hh }
    }

    /// Checks the packed gate matrices and biases against the declared sizes.
    pub fn validate(&self) -> Result<()> {
        let gates = 4 * self.hidden_size;
        self.weight_ih.expect_shape("LstmCell::validate", self.input_size, gates)?;
        self.weight_hh.expect_shape("LstmCell::validate", self.hidden_size, gates)?;
        for b in [&self.bias_ih, &self.bias_hh].into_iter().flatten() {
            NetError::ensure_width("LstmCell::validate", gates, b.len())?;
        }
        Ok(())
    }

    /// One time step. `state` is `(h, c)`, each `(batch, hidden_size)`.
    pub fn step(&self, x: &Matrix, state: (&Matrix, &Matrix)) -> Result<(Matrix, Matrix)> {
        let (h, c) = state;
        let mut gates = x.matmul(&self.weight_ih)?.add(&h.matmul(&self.weight_hh)?)?;
        if let Some(b) = &self.bias_ih {
            gates = gates.add_row(b)?;
        }
        if let Some(b) = &self.bias_hh {
            gates = gates.add_row(b)?;
        }

        let hs = self.hidden_size;
        let sigmoid = |v: f64| 1.0 / (1.0 + (-v).exp());
        let i = gates.slice_cols(0, hs).map(sigmoid);
        let f = gates.slice_cols(hs, 2 * hs).map(sigmoid);
        let g = gates.slice_cols(2 * hs, 3 * hs).map(f64::tanh);
        let o = gates.slice_cols(3 * hs, 4 * hs).map(sigmoid);

        let c_next = f.hadamard(c)?.add(&i.hadamard(&g)?)?;
        let h_next = o.hadamard(&c_next.map(f64::tanh))?;
        Ok((h_next, c_next))
    }

    /// Runs the cell over `steps` from zero state, returning every hidden state.
    fn run<'a, I>(&self, steps: I, batch: usize) -> Result<Vec<Matrix>>
    where
        I: Iterator<Item = &'a Matrix>,
    {
        let mut h = Matrix::zeros(batch, self.hidden_size);
        let mut c = Matrix::zeros(batch, self.hidden_size);
        let mut out = Vec::new();
        for x in steps {
            let (h_next, c_next) = self.step(x, (&h, &c))?;
            out.push(h_next.clone());
            h = h_next;
            c = c_next;
        }
        Ok(out)
    }

    pub fn num_parameters(&self) -> usize {
        let biases = self.bias_ih.as_ref().map_or(0, Vec::len) + self.bias_hh.as_ref().map_or(0, Vec::len);
        4 * self.hidden_size * (self.input_size + self.hidden_size) + biases
    }
}

pub(crate) fn uniform_vec<R: Rng + ?Sized>(len: usize, bound: f64, rng: &mut R) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(-bound..=bound)).collect()
}

/// One recurrent layer; bidirectional layers concatenate `[forward, backward]`
/// at every time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    pub forward_cell: LstmCell,
    pub backward_cell: Option<LstmCell>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, bias: bool, bidirectional: bool, rng: &mut R) -> LstmLayer {
        let forward_cell = LstmCell::new(input_size, hidden_size, bias, rng);
        let backward_cell = bidirectional.then(|| LstmCell::new(input_size, hidden_size, bias, rng));
        LstmLayer { forward_cell, backward_cell }
    }

    pub fn input_size(&self) -> usize {
        self.forward_cell.input_size
    }

    pub fn output_size(&self) -> usize {
        self.forward_cell.hidden_size * if self.backward_cell.is_some() { 2 } else { 1 }
    }

    /// Hidden-state sequence, `(batch, output_size)` per step.
    pub fn forward(&self, input: &SeqBatch) -> Result<SeqBatch> {
        if input.features() != self.input_size() && input.seq_len() > 0 {
            return Err(NetError::shape("LstmLayer::forward", format!("{} input features", self.input_size()), input.features()));
        }
        let batch = input.batch_size();
        let fwd = self.forward_cell.run(input.steps.iter(), batch)?;
        let fwd = SeqBatch { steps: fwd };
        match &self.backward_cell {
            None => Ok(fwd),
            Some(cell) => {
                let mut bwd = cell.run(input.steps.iter().rev(), batch)?;
                bwd.reverse();
                fwd.concat_features(&SeqBatch { steps: bwd })
            }
        }
    }

    /// Both directions must be valid cells of the same shape.
    pub fn validate(&self) -> Result<()> {
        self.forward_cell.validate()?;
        if let Some(cell) = &self.backward_cell {
            cell.validate()?;
            NetError::ensure_width("LstmLayer::validate", self.forward_cell.input_size, cell.input_size)?;
            NetError::ensure_width("LstmLayer::validate", self.forward_cell.hidden_size, cell.hidden_size)?;
        }
        Ok(())
    }

    pub fn num_parameters(&self) -> usize {
        self.forward_cell.num_parameters() + self.backward_cell.as_ref().map_or(0, LstmCell::num_parameters)
    }
}
