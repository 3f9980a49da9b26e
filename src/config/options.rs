use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use crate::error::{NetError, Result};

/// String-typed options for the configurable MLP, exactly as they appear in an
/// experiment configuration file. Every per-layer field is a comma-separated
/// list with one entry per hidden layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlpOptions {
    pub dnn_lay: String,
    pub dnn_drop: String,
    pub dnn_use_batchnorm: String,
    pub dnn_use_laynorm: String,
    pub dnn_use_laynorm_inp: String,
    pub dnn_use_batchnorm_inp: String,
    pub dnn_act: String,
}

impl MlpOptions {
    pub fn from_map(map: &HashMap<String, String>) -> Result<MlpOptions> {
        Ok(MlpOptions {
            dnn_lay: lookup(map, "dnn_lay")?,
            dnn_drop: lookup(map, "dnn_drop")?,
            dnn_use_batchnorm: lookup(map, "dnn_use_batchnorm")?,
            dnn_use_laynorm: lookup(map, "dnn_use_laynorm")?,
            dnn_use_laynorm_inp: lookup(map, "dnn_use_laynorm_inp")?,
            dnn_use_batchnorm_inp: lookup(map, "dnn_use_batchnorm_inp")?,
            dnn_act: lookup(map, "dnn_act")?,
        })
    }
}

/// String-typed options for the stacked LSTM regressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrentOptions {
    pub hidden_size: String,
    pub num_layers: String,
    pub bias: String,
    pub batch_first: String,
    pub dropout: String,
    pub bidirectional: String,
}

impl RecurrentOptions {
    pub fn from_map(map: &HashMap<String, String>) -> Result<RecurrentOptions> {
        Ok(RecurrentOptions {
            hidden_size: lookup(map, "hidden_size")?,
            num_layers: lookup(map, "num_layers")?,
            bias: lookup(map, "bias")?,
            batch_first: lookup(map, "batch_first")?,
            dropout: lookup(map, "dropout")?,
            bidirectional: lookup(map, "bidirectional")?,
        })
    }
}

fn lookup(map: &HashMap<String, String>, key: &str) -> Result<String> {
    map.get(key)
        .cloned()
        .ok_or_else(|| NetError::MissingOption(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported_by_name() {
        let mut map = HashMap::new();
        map.insert("hidden_size".to_string(), "64".to_string());
        let err = RecurrentOptions::from_map(&map).unwrap_err();
        assert!(matches!(err, NetError::MissingOption(ref k) if k == "num_layers"));
    }

    #[test]
    fn deserializes_from_json_object() {
        let json = r#"{
            "dnn_lay": "64,1", "dnn_drop": "0.1,0.0",
            "dnn_use_batchnorm": "False,False", "dnn_use_laynorm": "True,False",
            "dnn_use_laynorm_inp": "False", "dnn_use_batchnorm_inp": "False",
            "dnn_act": "relu,linear"
        }"#;
        let opts: MlpOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.dnn_act, "relu,linear");
    }
}
