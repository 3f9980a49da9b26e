use memorability_nn::{LayerNorm, Matrix};
use proptest::prelude::*;

fn row_stats(row: &[f64]) -> (f64, f64) {
    let n = row.len() as f64;
    let mean = row.iter().sum::<f64>() / n;
    let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

proptest! {
    #[test]
    fn rows_are_standardized_before_the_affine_step(
        rows in prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 8), 1..6),
        gamma in prop::collection::vec(0.5f64..3.0, 8),
        beta in prop::collection::vec(-2.0f64..2.0, 8),
    ) {
        // keep rows whose spread dominates eps
        let rows: Vec<Vec<f64>> = rows.into_iter().filter(|r| row_stats(r).1 > 1e-2).collect();
        prop_assume!(!rows.is_empty());

        let mut ln = LayerNorm::new(8);
        ln.gamma = gamma.clone();
        ln.beta = beta.clone();
        let y = ln.forward(&Matrix::from_rows(rows).unwrap()).unwrap();

        for row in &y.data {
            let z: Vec<f64> = row.iter().zip(gamma.iter().zip(&beta))
                .map(|(v, (g, b))| (v - b) / g)
                .collect();
            let (mean, std) = row_stats(&z);
            prop_assert!(mean.abs() < 1e-9);
            prop_assert!((std - 1.0).abs() < 1e-3);
        }
    }
}

#[test]
fn width_mismatch_is_a_shape_error() {
    let ln = LayerNorm::new(3);
    let err = ln.forward(&Matrix::zeros(2, 4)).unwrap_err();
    assert!(!err.is_config());
}
