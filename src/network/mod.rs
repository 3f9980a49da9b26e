pub mod crnn;
pub mod feature_mlp;
pub mod mlp;
pub mod model;
pub mod recurrent;
pub mod spec;

pub use crnn::{ConvBlock, CrnnRegressor};
pub use feature_mlp::FeatureMlpRegressor;
pub use mlp::{Mlp, MlpBlock, Normalization};
pub use model::{Model, ModelInput, SavedModel};
pub use recurrent::{RecurrentOutput, RecurrentRegressor};
pub use spec::{Architecture, ModelSpec};
