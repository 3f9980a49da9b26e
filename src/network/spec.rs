use rand::{rngs::StdRng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::network_config::{CrnnConfig, FeatureMlpConfig, NetworkConfig, Pooling, RecurrentConfig};
use crate::config::options::{MlpOptions, RecurrentOptions};
use crate::error::Result;
use crate::network::crnn::CrnnRegressor;
use crate::network::feature_mlp::FeatureMlpRegressor;
use crate::network::mlp::Mlp;
use crate::network::model::{Model, SavedModel};
use crate::network::recurrent::RecurrentRegressor;

/// Which regressor to build, with its string-typed or typed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Architecture {
    Mlp {
        input_dim: usize,
        options: MlpOptions,
    },
    Recurrent {
        input_dim: usize,
        options: RecurrentOptions,
        /// Non-sequential features joined before the head.
        #[serde(default)]
        aux_dim: usize,
        #[serde(default)]
        head_batch_norm: bool,
        #[serde(default)]
        pooling: Pooling,
    },
    FeatureMlp(FeatureMlpConfig),
    Crnn(CrnnConfig),
}

/// A serializable description of a model architecture.
///
/// `ModelSpec` can be saved to / loaded from JSON independently of the
/// weights; [`ModelSpec::build`] validates it and initializes parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Human-readable name, also used as the saved model's name.
    pub name: String,
    pub architecture: Architecture,
    /// Seed for parameter initialization; fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ModelSpec {
    pub fn build(&self) -> Result<SavedModel> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let model = match &self.architecture {
            Architecture::Mlp { input_dim, options } => {
                Model::Mlp(Mlp::build(NetworkConfig::from_options(options, *input_dim)?, &mut rng)?)
            }
            Architecture::Recurrent { input_dim, options, aux_dim, head_batch_norm, pooling } => {
                let config = RecurrentConfig::from_options(options, *input_dim)?
                    .with_aux_features(*aux_dim, *head_batch_norm)
                    .with_pooling(*pooling);
                Model::Recurrent(RecurrentRegressor::build(config, &mut rng)?)
            }
            Architecture::FeatureMlp(config) => {
                Model::FeatureMlp(FeatureMlpRegressor::build(*config, &mut rng)?)
            }
            Architecture::Crnn(config) => {
                Model::Crnn(CrnnRegressor::build(*config, &mut rng)?)
            }
        };

        info!(name = %self.name, params = model.num_parameters(), "model initialized");
        Ok(SavedModel {
            name: self.name.clone(),
            description: self.description.clone(),
            model,
        })
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `ModelSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<ModelSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
