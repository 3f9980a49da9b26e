pub mod network_config;
pub mod options;
pub mod parse;

pub use network_config::{AffineConfig, ConvBlockConfig, CrnnConfig, FeatureMlpConfig, GruConfig, LayerConfig, NetworkConfig, NormChoice, Pooling, RecurrentConfig};
pub use options::{MlpOptions, RecurrentOptions};
pub use parse::parse_bool;
