use serde::{Serialize, Deserialize};
use std::f64::consts::E;
use std::str::FromStr;

use crate::error::NetError;
use crate::math::matrix::Matrix;

/// Slope used for the `leaky_relu` configuration key.
pub const LEAKY_SLOPE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Tanh,
    /// `linear` is configured as a leaky unit with slope 1, which is the identity.
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    /// Row-wise log-softmax over the feature axis. Vector-valued, so it is only
    /// reachable through [`ActivationFunction::apply`].
    LogSoftmax,
}

impl ActivationFunction {
    /// Element-wise activation. `LogSoftmax` has no scalar form and returns `x`.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { x } else { alpha * (E.powf(x) - 1.0) }
            }
            ActivationFunction::LogSoftmax => x,
        }
    }

    /// Applies the activation to a `(batch, features)` matrix.
    pub fn apply(&self, x: &Matrix) -> Matrix {
        match self {
            ActivationFunction::LogSoftmax => x.map_rows(log_softmax),
            other => x.map(|v| other.function(v)),
        }
    }

    /// The configuration key this activation was parsed from.
    pub fn key(&self) -> &'static str {
        match self {
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Tanh => "tanh",
            ActivationFunction::LeakyReLU { alpha } if *alpha == 1.0 => "linear",
            ActivationFunction::LeakyReLU { .. } => "leaky_relu",
            ActivationFunction::Elu { .. } => "elu",
            ActivationFunction::LogSoftmax => "softmax",
        }
    }
}

impl FromStr for ActivationFunction {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "relu" => Ok(ActivationFunction::ReLU),
            "tanh" => Ok(ActivationFunction::Tanh),
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "leaky_relu" => Ok(ActivationFunction::LeakyReLU { alpha: LEAKY_SLOPE }),
            "elu" => Ok(ActivationFunction::Elu { alpha: 1.0 }),
            "softmax" => Ok(ActivationFunction::LogSoftmax),
            "linear" => Ok(ActivationFunction::LeakyReLU { alpha: 1.0 }),
            other => Err(NetError::UnknownActivation(other.to_string())),
        }
    }
}

/// Numerically stable `x - logsumexp(x)`.
fn log_softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lse = max + row.iter().map(|x| (x - max).exp()).sum::<f64>().ln();
    row.iter().map(|x| x - lse).collect()
}
