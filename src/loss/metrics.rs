use serde::{Serialize, Deserialize};

use crate::error::{NetError, Result};
use crate::loss::{mae::MaeLoss, mse::MseLoss};
use crate::math::matrix::Matrix;

/// Agreement between predicted and labelled memorability scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub samples: usize,
    pub mse: f64,
    pub mae: f64,
    /// `None` when either side has zero variance.
    pub pearson: Option<f64>,
}

impl RegressionReport {
    pub fn compute(predicted: &[f64], expected: &[f64]) -> Result<RegressionReport> {
        if predicted.len() != expected.len() {
            return Err(NetError::shape("RegressionReport::compute", expected.len(), predicted.len()));
        }
        Ok(RegressionReport {
            samples: predicted.len(),
            mse: MseLoss::loss(predicted, expected),
            mae: MaeLoss::loss(predicted, expected),
            pearson: pearson(predicted, expected),
        })
    }

    /// Scores a `(batch, 1)` prediction matrix. Models with several outputs
    /// per example have no single score to compare against a label.
    pub fn from_predictions(predictions: &Matrix, expected: &[f64]) -> Result<RegressionReport> {
        predictions.validate()?;
        if predictions.cols != 1 {
            return Err(NetError::shape(
                "RegressionReport::from_predictions",
                "one output per example",
                predictions.shape(),
            ));
        }
        let predicted: Vec<f64> = predictions.data.iter().map(|row| row[0]).collect();
        RegressionReport::compute(&predicted, expected)
    }
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 {
        return None;
    }
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va == 0.0 || vb == 0.0 {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}
