use memorability_nn::{Matrix, Mode, Pooling, RecurrentConfig, RecurrentOptions, RecurrentRegressor, SeqBatch};
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

fn options(bidirectional: &str, layers: &str) -> RecurrentOptions {
    RecurrentOptions {
        hidden_size: "5".into(),
        num_layers: layers.into(),
        bias: "True".into(),
        batch_first: "True".into(),
        dropout: "0.3".into(),
        bidirectional: bidirectional.into(),
    }
}

fn batch(batch: usize, len: usize, features: usize, scale: f64, rng: &mut StdRng) -> SeqBatch {
    let examples: Vec<Matrix> = (0..batch)
        .map(|_| Matrix::uniform(len, features, scale, rng))
        .collect();
    SeqBatch::from_examples(&examples).unwrap()
}

#[test]
fn hidden_state_list_covers_every_layer() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut model = RecurrentRegressor::from_options(&options("True", "3"), 4, &mut rng).unwrap();
    let out = model.forward(&batch(2, 6, 4, 1.0, &mut rng), None, Mode::Train).unwrap();

    assert_eq!(out.hidden_states.len(), 3);
    for states in &out.hidden_states {
        assert_eq!(states.seq_len(), 6);
        assert_eq!(states.batch_size(), 2);
        assert_eq!(states.features(), 10);
    }
    assert_eq!((out.predictions.rows, out.predictions.cols), (2, 1));
    assert!(out.attention.is_none());
}

#[test]
fn full_inter_layer_dropout_silences_the_next_layer_input() {
    let mut rng = StdRng::seed_from_u64(31);
    let mut config = RecurrentConfig::from_options(&options("False", "2"), 4).unwrap();
    config.dropout = 1.0;
    let mut model = RecurrentRegressor::build(config, &mut rng).unwrap();
    let x = batch(2, 5, 4, 1.0, &mut rng);

    let train = model.forward(&x, None, Mode::Train).unwrap();
    // states are recorded before dropout
    assert!(train.hidden_states[0].steps.iter().flat_map(|s| s.data.iter().flatten()).any(|&v| v != 0.0));

    let silent = SeqBatch::new(vec![Matrix::zeros(2, 5); 5]).unwrap();
    let zero_response = model.layers[1].forward(&silent).unwrap();
    assert_eq!(train.hidden_states[1], zero_response);

    let eval = model.forward(&x, None, Mode::Eval).unwrap();
    assert_eq!(eval.hidden_states[0], train.hidden_states[0]);
    assert_eq!(eval.hidden_states[1], model.layers[1].forward(&eval.hidden_states[0]).unwrap());
    assert_ne!(eval.hidden_states[1], zero_response);
}

#[test]
fn aux_features_and_head_norm() {
    let mut rng = StdRng::seed_from_u64(13);
    let config = RecurrentConfig::from_options(&options("False", "2"), 4)
        .unwrap()
        .with_aux_features(2, true);
    let mut model = RecurrentRegressor::build(config, &mut rng).unwrap();
    assert_eq!(model.head.input_size, 7);

    let x = batch(4, 3, 4, 1.0, &mut rng);
    let aux = Matrix::uniform(4, 2, 1.0, &mut rng);
    let train = model.forward(&x, Some(&aux), Mode::Train).unwrap();
    let eval = model.forward(&x, Some(&aux), Mode::Eval).unwrap();
    assert_eq!(train.predictions.rows, 4);
    assert_eq!(eval.predictions.rows, 4);
}

#[test]
fn eval_mode_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut model = RecurrentRegressor::from_options(&options("True", "2"), 4, &mut rng).unwrap();
    let x = batch(3, 4, 4, 1.0, &mut rng);
    let a = model.forward(&x, None, Mode::Eval).unwrap().predictions;
    let b = model.forward(&x, None, Mode::Eval).unwrap().predictions;
    assert_eq!(a, b);
}

#[test]
fn attention_pooling_keeps_output_contract() {
    let mut rng = StdRng::seed_from_u64(13);
    let config = RecurrentConfig::from_options(&options("True", "1"), 4)
        .unwrap()
        .with_pooling(Pooling::Attention);
    let mut model = RecurrentRegressor::build(config, &mut rng).unwrap();
    let out = model.forward(&batch(3, 7, 4, 1.0, &mut rng), None, Mode::Eval).unwrap();
    assert_eq!((out.predictions.rows, out.predictions.cols), (3, 1));
    assert_eq!(out.attention.map(|w| (w.rows, w.cols)), Some((3, 7)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn predictions_are_non_negative_for_any_length(
        seed in any::<u64>(),
        len in 1usize..12,
        scale in 0.1f64..50.0,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = RecurrentRegressor::from_options(&options("True", "2"), 3, &mut rng).unwrap();
        let out = model.forward(&batch(2, len, 3, scale, &mut rng), None, Mode::Eval).unwrap();
        prop_assert_eq!((out.predictions.rows, out.predictions.cols), (2, 1));
        prop_assert!(out.predictions.data.iter().flatten().all(|&p| p >= 0.0));
    }
}
