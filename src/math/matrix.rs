use rand::Rng;
use serde::{Serialize, Deserialize};
use std::fmt;

use crate::error::{NetError, Result};

/// Dense row-major matrix. Rows are examples (or frames), columns are features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>
}

/// `(rows, cols)` pair rendered as `RxC` in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape(pub usize, pub usize);

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.0, self.1)
    }
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![vec![value; cols]; rows]
        }
    }

    /// Samples every entry from U(-bound, +bound).
    pub fn uniform<R: Rng + ?Sized>(rows: usize, cols: usize, bound: f64, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);
        if bound <= 0.0 {
            return res;
        }
        for row in res.data.iter_mut() {
            for x in row.iter_mut() {
                *x = rng.gen_range(-bound..=bound);
            }
        }
        res
    }

    /// Builds a matrix from rows, rejecting ragged input.
    pub fn from_rows(data: Vec<Vec<f64>>) -> Result<Matrix> {
        let cols = data.first().map_or(0, Vec::len);
        if let Some(bad) = data.iter().find(|row| row.len() != cols) {
            return Err(NetError::shape("from_rows", format!("{cols} columns per row"), bad.len()));
        }
        Ok(Matrix { rows: data.len(), cols, data })
    }

    /// A single-row matrix.
    pub fn row_vector(values: Vec<f64>) -> Matrix {
        Matrix { rows: 1, cols: values.len(), data: vec![values] }
    }

    /// Checks that `data` holds exactly `rows` rows of `cols` values. Matrices
    /// read from disk carry their dimensions separately from their data.
    pub fn validate(&self) -> Result<()> {
        if self.data.len() != self.rows {
            return Err(NetError::shape("Matrix::validate", format!("{} rows", self.rows), self.data.len()));
        }
        if let Some(bad) = self.data.iter().find(|row| row.len() != self.cols) {
            return Err(NetError::shape("Matrix::validate", format!("{} columns per row", self.cols), bad.len()));
        }
        Ok(())
    }

    /// [`Matrix::validate`], then requires the `(rows, cols)` shape.
    pub fn expect_shape(&self, op: &'static str, rows: usize, cols: usize) -> Result<()> {
        self.validate()?;
        if self.shape() != Shape(rows, cols) {
            return Err(NetError::shape(op, Shape(rows, cols), self.shape()));
        }
        Ok(())
    }

    pub fn shape(&self) -> Shape {
        Shape(self.rows, self.cols)
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect(),
        }
    }

    /// Applies `functor` row by row; each output row must keep the width.
    pub fn map_rows<F>(&self, functor: F) -> Matrix
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|row| functor(row)).collect(),
        }
    }

    /// Element-wise combination of two same-shape matrices.
    pub fn zip_with<F>(&self, rhs: &Matrix, op: &'static str, functor: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.shape() != rhs.shape() {
            return Err(NetError::shape(op, self.shape(), rhs.shape()));
        }
        let data = self.data.iter().zip(rhs.data.iter())
            .map(|(a, b)| a.iter().zip(b.iter()).map(|(&x, &y)| functor(x, y)).collect())
            .collect();
        Ok(Matrix { rows: self.rows, cols: self.cols, data })
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix> {
        self.zip_with(rhs, "add", |a, b| a + b)
    }

    pub fn hadamard(&self, rhs: &Matrix) -> Result<Matrix> {
        self.zip_with(rhs, "hadamard", |a, b| a * b)
    }

    pub fn matmul(&self, rhs: &Matrix) -> Result<Matrix> {
        self.validate()?;
        rhs.validate()?;
        if self.cols != rhs.rows {
            return Err(NetError::shape(
                "matmul",
                format!("{} rows on the right operand", self.cols),
                rhs.shape(),
            ));
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for (i, lhs_row) in self.data.iter().enumerate() {
            let out = &mut res.data[i];
            for (k, &a) in lhs_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                for (o, &b) in out.iter_mut().zip(rhs.data[k].iter()) {
                    *o += a * b;
                }
            }
        }

        Ok(res)
    }

    /// Adds `values` to every row (bias broadcast).
    pub fn add_row(&self, values: &[f64]) -> Result<Matrix> {
        if values.len() != self.cols {
            return Err(NetError::shape("add_row", self.cols, values.len()));
        }
        Ok(self.map_rows(|row| row.iter().zip(values).map(|(x, v)| x + v).collect()))
    }

    /// Concatenates columns: `[self | rhs]`.
    pub fn hcat(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.rows != rhs.rows {
            return Err(NetError::shape("hcat", format!("{} rows", self.rows), rhs.shape()));
        }
        let data = self.data.iter().zip(rhs.data.iter())
            .map(|(a, b)| a.iter().chain(b.iter()).copied().collect())
            .collect();
        Ok(Matrix { rows: self.rows, cols: self.cols + rhs.cols, data })
    }

    /// Copies rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.rows);
        let start = start.min(end);
        Matrix {
            rows: end - start,
            cols: self.cols,
            data: self.data[start..end].to_vec(),
        }
    }

    /// Copies columns `start..end`.
    pub fn slice_cols(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.cols);
        let start = start.min(end);
        Matrix {
            rows: self.rows,
            cols: end - start,
            data: self.data.iter().map(|row| row[start..end].to_vec()).collect(),
        }
    }

    /// Mean of each column.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.cols];
        if self.rows == 0 {
            return means;
        }
        for row in &self.data {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        let n = self.rows as f64;
        means.iter_mut().for_each(|m| *m /= n);
        means
    }

    pub fn approx_eq(&self, rhs: &Matrix, tol: f64) -> bool {
        self.shape() == rhs.shape()
            && self.data.iter().flatten().zip(rhs.data.iter().flatten())
                .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}
