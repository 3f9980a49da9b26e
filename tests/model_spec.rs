use memorability_nn::network::Architecture;
use memorability_nn::{Model, ModelInput, ModelSpec, NetError, SavedModel};

fn mlp_spec() -> ModelSpec {
    serde_json::from_str(
        r#"{
            "name": "mlp-head",
            "seed": 17,
            "description": "handcrafted features",
            "architecture": {
                "kind": "mlp",
                "input_dim": 3,
                "options": {
                    "dnn_lay": "8,1", "dnn_drop": "0.15,0.0",
                    "dnn_use_batchnorm": "True,False", "dnn_use_laynorm": "False,False",
                    "dnn_use_laynorm_inp": "True", "dnn_use_batchnorm_inp": "False",
                    "dnn_act": "relu,linear"
                }
            }
        }"#,
    )
    .unwrap()
}

fn recurrent_spec() -> ModelSpec {
    serde_json::from_str(
        r#"{
            "name": "blstm",
            "seed": 5,
            "architecture": {
                "kind": "recurrent",
                "input_dim": 2,
                "aux_dim": 1,
                "head_batch_norm": true,
                "pooling": "attention",
                "options": {
                    "hidden_size": "4", "num_layers": "2", "bias": "True",
                    "batch_first": "True", "dropout": "0.1", "bidirectional": "True"
                }
            }
        }"#,
    )
    .unwrap()
}

fn feature_spec() -> ModelSpec {
    serde_json::from_str(
        r#"{
            "name": "handcrafted",
            "seed": 2,
            "architecture": {
                "kind": "feature_mlp",
                "sequential_input_size": 3,
                "non_sequential_input_size": 2,
                "hidden_size": 4
            }
        }"#,
    )
    .unwrap()
}

// 1x8x8 -> 2x4x4 -> 2x2x2 -> 3x1x1: one GRU step of 3 features
fn crnn_spec() -> ModelSpec {
    serde_json::from_str(
        r#"{
            "name": "crnn",
            "seed": 8,
            "architecture": {
                "kind": "crnn",
                "conv_kernel_size": 3, "stride": 1, "padding": 1,
                "conv_1": {"in_channels": 1, "out_channels": 2, "pool_kernel": 2},
                "conv_2": {"in_channels": 2, "out_channels": 2, "pool_kernel": 2},
                "conv_3": {"in_channels": 2, "out_channels": 3, "pool_kernel": 2},
                "gru": {"input_size": 3, "hidden_size": 2, "layer_num": 2, "bidirectional": false},
                "fc_1": {"input_size": 2, "output_size": 4},
                "fc_2": {"input_size": 4, "output_size": 3},
                "output": {"input_size": 3, "output_size": 1}
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn saved_weights_reproduce_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let path = path.to_str().unwrap();

    let mut saved = recurrent_spec().build().unwrap();
    let input = ModelInput {
        sequential: Some(vec![
            vec![vec![0.1, 0.2], vec![0.3, -0.4], vec![1.0, 0.0]],
            vec![vec![-0.5, 0.5], vec![0.0, 0.0], vec![0.2, 0.9]],
        ]),
        aux: Some(vec![vec![0.7], vec![-1.2]]),
        ..ModelInput::default()
    };
    let before = saved.model.predict(&input).unwrap();
    saved.save_json(path).unwrap();

    let mut loaded = SavedModel::load_json(path).unwrap();
    assert_eq!(loaded.name, "blstm");
    assert_eq!(loaded.model.predict(&input).unwrap(), before);
    assert!(before.data.iter().flatten().all(|&p| p >= 0.0));
}

#[test]
fn spec_round_trips_through_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spec.json");
    let path = path.to_str().unwrap();

    let spec = mlp_spec();
    spec.save_json(path).unwrap();
    let loaded = ModelSpec::load_json(path).unwrap();
    assert_eq!(loaded, spec);
    assert!(matches!(loaded.architecture, Architecture::Mlp { input_dim: 3, .. }));
}

#[test]
fn mlp_model_predicts_from_flat_features() {
    let mut saved = mlp_spec().build().unwrap();
    assert!(matches!(saved.model, Model::Mlp(_)));
    assert_eq!(saved.description.as_deref(), Some("handcrafted features"));

    let input = ModelInput {
        features: Some(vec![vec![1.0, 2.0, 3.0], vec![0.0, 0.5, -1.0]]),
        ..ModelInput::default()
    };
    let y = saved.model.predict(&input).unwrap();
    assert_eq!((y.rows, y.cols), (2, 1));

    // asking the MLP without `features` fails
    let err = saved.model.predict(&ModelInput::default()).unwrap_err();
    assert!(!err.is_config());
}

#[test]
fn inputs_a_model_does_not_read_are_rejected() {
    let mut mlp = mlp_spec().build().unwrap();
    let input = ModelInput {
        features: Some(vec![vec![1.0, 2.0, 3.0]]),
        aux: Some(vec![vec![0.5]]),
        ..ModelInput::default()
    };
    let err = mlp.model.predict(&input).unwrap_err();
    assert!(matches!(err, NetError::ShapeMismatch { ref actual, .. } if actual.contains("aux")));

    let mut rnn = recurrent_spec().build().unwrap();
    let input = ModelInput {
        features: Some(vec![vec![1.0, 2.0]]),
        sequential: Some(vec![vec![vec![0.1, 0.2]]]),
        aux: Some(vec![vec![0.7]]),
        ..ModelInput::default()
    };
    assert!(rnn.model.predict(&input).is_err());
}

#[test]
fn corrupted_weight_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let path = path.to_str().unwrap();

    let saved = feature_spec().build().unwrap();
    let mut json = serde_json::to_value(&saved).unwrap();
    let rows = json["model"]["hidden"]["weights"]["data"].as_array_mut().unwrap();
    rows[1].as_array_mut().unwrap().pop();
    std::fs::write(path, serde_json::to_string(&json).unwrap()).unwrap();

    let err = SavedModel::load_json(path).unwrap_err();
    assert!(matches!(err, NetError::ShapeMismatch { op: "Matrix::validate", .. }));
}

#[test]
fn short_layer_norm_shift_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let path = path.to_str().unwrap();

    let saved = mlp_spec().build().unwrap();
    let mut json = serde_json::to_value(&saved).unwrap();
    json["model"]["input_layer_norm"]["beta"].as_array_mut().unwrap().pop();
    std::fs::write(path, serde_json::to_string(&json).unwrap()).unwrap();

    assert!(SavedModel::load_json(path).is_err());
}

#[test]
fn crnn_spec_builds_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crnn.json");
    let path = path.to_str().unwrap();

    let mut saved = crnn_spec().build().unwrap();
    assert!(matches!(saved.model, Model::Crnn(_)));
    assert!(saved.model.describe()[0].contains("CRNN"));

    let image: Vec<Vec<f64>> = (0..8)
        .map(|y| (0..8).map(|x| ((x * y) as f64 * 0.1).sin()).collect())
        .collect();
    let input = ModelInput {
        images: Some(vec![vec![image.clone()], vec![image]]),
        ..ModelInput::default()
    };
    let before = saved.model.predict(&input).unwrap();
    assert_eq!((before.rows, before.cols), (2, 1));
    assert!(before.data.iter().flatten().all(|&p| p > 0.0 && p < 1.0));

    saved.save_json(path).unwrap();
    let mut loaded = SavedModel::load_json(path).unwrap();
    assert_eq!(loaded.model.predict(&input).unwrap(), before);
}

#[test]
fn describe_mentions_every_block() {
    let saved = mlp_spec().build().unwrap();
    let lines = saved.model.describe();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("MLP"));
    assert!(saved.model.num_parameters() > 0);
}
