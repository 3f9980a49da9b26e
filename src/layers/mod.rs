pub mod attention;
pub mod batch_norm;
pub mod conv;
pub mod dense;
pub mod dropout;
pub mod gru;
pub mod layer_norm;
pub mod lstm;

use serde::{Serialize, Deserialize};

pub use attention::{AttentionOutput, TemporalAttention};
pub use batch_norm::{BatchNorm1d, BatchNorm2d};
pub use conv::{Conv2d, MaxPool2d};
pub use dense::Dense;
pub use dropout::Dropout;
pub use gru::{Gru, GruCell};
pub use layer_norm::LayerNorm;
pub use lstm::{LstmCell, LstmLayer};

/// Whether a forward pass draws dropout masks and updates batch statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    Train,
    #[default]
    Eval,
}
