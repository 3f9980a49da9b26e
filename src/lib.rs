pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod config;
pub mod network;
pub mod loss;

// Convenience re-exports
pub use error::{NetError, Result};
pub use math::feature_map::FeatureMap;
pub use math::matrix::Matrix;
pub use math::sequence::SeqBatch;
pub use math::window::{context_window, ContextWindowSpec};
pub use activation::activation::ActivationFunction;
pub use layers::{LayerNorm, Mode};
pub use config::{parse_bool, CrnnConfig, LayerConfig, MlpOptions, NetworkConfig, NormChoice, Pooling, RecurrentConfig, RecurrentOptions};
pub use network::{CrnnRegressor, Mlp, Model, ModelInput, ModelSpec, RecurrentRegressor, SavedModel};
pub use loss::RegressionReport;
