use serde::{Serialize, Deserialize};
use tracing::info;

use crate::error::{NetError, Result};
use crate::layers::Mode;
use crate::math::feature_map::FeatureMap;
use crate::math::matrix::Matrix;
use crate::math::sequence::SeqBatch;
use crate::network::crnn::CrnnRegressor;
use crate::network::feature_mlp::FeatureMlpRegressor;
use crate::network::mlp::Mlp;
use crate::network::recurrent::RecurrentRegressor;

/// One of the built regressors, with its weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Mlp(Mlp),
    Recurrent(RecurrentRegressor),
    FeatureMlp(FeatureMlpRegressor),
    Crnn(CrnnRegressor),
}

/// Batch-first inputs as they appear in a JSON request.
///
/// - `features`   : `(batch, input_dim)` flat features for the MLP
/// - `sequential` : `(batch, seq_len, features)` frame sequences
/// - `aux`        : `(batch, aux_dim)` non-sequential features
/// - `images`     : `(batch, channels, height, width)` spectrogram images
///
/// Each model reads only some of these; supplying one it does not read is an
/// error rather than being silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInput {
    #[serde(default)]
    pub features: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub sequential: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(default)]
    pub aux: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub images: Option<Vec<Vec<Vec<Vec<f64>>>>>,
}

impl ModelInput {
    /// Fails if any field outside `consumed` is present.
    fn only(&self, model: &'static str, consumed: &[&str]) -> Result<()> {
        let supplied = [
            ("features", self.features.is_some()),
            ("sequential", self.sequential.is_some()),
            ("aux", self.aux.is_some()),
            ("images", self.images.is_some()),
        ];
        match supplied.iter().find(|(name, present)| *present && !consumed.contains(name)) {
            Some((name, _)) => Err(NetError::shape(
                "Model::predict",
                format!("only {} for a {model} model", consumed.join("/")),
                format!("`{name}` input"),
            )),
            None => Ok(()),
        }
    }

    fn images(&self) -> Result<Option<Vec<FeatureMap>>> {
        let Some(examples) = &self.images else {
            return Ok(None);
        };
        examples.iter()
            .map(|e| FeatureMap::from_nested(e.clone()))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn features(&self) -> Result<Option<Matrix>> {
        self.features.clone().map(Matrix::from_rows).transpose()
    }

    fn aux(&self) -> Result<Option<Matrix>> {
        self.aux.clone().map(Matrix::from_rows).transpose()
    }

    fn sequential(&self) -> Result<Option<SeqBatch>> {
        let Some(examples) = &self.sequential else {
            return Ok(None);
        };
        let examples = examples.iter()
            .map(|e| Matrix::from_rows(e.clone()))
            .collect::<Result<Vec<_>>>()?;
        SeqBatch::from_examples(&examples).map(Some)
    }
}

impl Model {
    /// Evaluation-mode predictions, one row per example.
    pub fn predict(&mut self, input: &ModelInput) -> Result<Matrix> {
        match self {
            Model::Mlp(mlp) => {
                input.only("mlp", &["features"])?;
                let x = input.features()?
                    .ok_or_else(|| NetError::shape("Model::predict", "`features` input", "none"))?;
                mlp.forward(&x, Mode::Eval)
            }
            Model::Recurrent(rnn) => {
                input.only("recurrent", &["sequential", "aux"])?;
                let seq = input.sequential()?
                    .ok_or_else(|| NetError::shape("Model::predict", "`sequential` input", "none"))?;
                let aux = input.aux()?;
                Ok(rnn.forward(&seq, aux.as_ref(), Mode::Eval)?.predictions)
            }
            Model::FeatureMlp(fm) => {
                input.only("feature_mlp", &["sequential", "aux"])?;
                let seq = input.sequential()?;
                let aux = input.aux()?;
                fm.forward(seq.as_ref(), aux.as_ref())
            }
            Model::Crnn(crnn) => {
                input.only("crnn", &["images"])?;
                let images = input.images()?
                    .ok_or_else(|| NetError::shape("Model::predict", "`images` input", "none"))?;
                crnn.forward(&images, Mode::Eval)
            }
        }
    }

    /// Checks that deserialized weights agree with each other and with the
    /// stored config, so a corrupt file fails here instead of mid-forward.
    pub fn validate(&self) -> Result<()> {
        match self {
            Model::Mlp(m) => m.validate(),
            Model::Recurrent(m) => m.validate(),
            Model::FeatureMlp(m) => m.validate(),
            Model::Crnn(m) => m.validate(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Model::Mlp(m) => m.num_parameters(),
            Model::Recurrent(m) => m.num_parameters(),
            Model::FeatureMlp(m) => m.num_parameters(),
            Model::Crnn(m) => m.num_parameters(),
        }
    }

    pub fn describe(&self) -> Vec<String> {
        match self {
            Model::Mlp(m) => m.describe(),
            Model::Recurrent(m) => m.describe(),
            Model::FeatureMlp(m) => m.describe(),
            Model::Crnn(m) => m.describe(),
        }
    }
}

/// A named model with weights, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model: Model,
}

impl SavedModel {
    /// Serializes the model weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a model from a JSON file previously written by `save_json`
    /// and validates its weights.
    pub fn load_json(path: &str) -> Result<SavedModel> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let saved: SavedModel = serde_json::from_reader(reader)?;
        saved.model.validate()?;
        info!(name = %saved.name, params = saved.model.num_parameters(), "model loaded");
        Ok(saved)
    }
}
