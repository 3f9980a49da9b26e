pub mod feature_map;
pub mod matrix;
pub mod sequence;
pub mod window;

pub use feature_map::FeatureMap;
pub use matrix::{Matrix, Shape};
pub use sequence::SeqBatch;
pub use window::{context_window, ContextWindowSpec};
