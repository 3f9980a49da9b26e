use thiserror::Error;

/// Errors raised while building or running a network.
///
/// Configuration variants are produced eagerly at build time; `ShapeMismatch`
/// only appears when a caller feeds tensors that disagree with the configured
/// sizes.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("invalid truth value {0:?}")]
    InvalidBool(String),

    #[error("option `{option}`: cannot parse {token:?} as a number")]
    InvalidNumber { option: String, token: String },

    #[error("option `{option}` has {actual} entries, expected {expected}")]
    LengthMismatch {
        option: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown activation {0:?}")]
    UnknownActivation(String),

    #[error("option `{option}`: {reason}")]
    InvalidValue { option: String, reason: String },

    #[error("missing option `{0}`")]
    MissingOption(String),

    #[error("shape mismatch in {op}: expected {expected}, got {actual}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NetError {
    pub(crate) fn shape(op: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        NetError::ShapeMismatch {
            op,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// `Ok` when `actual == expected`, otherwise a shape mismatch for `op`.
    pub(crate) fn ensure_width(op: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(NetError::shape(op, expected, actual))
        }
    }

    pub(crate) fn invalid(option: &str, reason: impl Into<String>) -> Self {
        NetError::InvalidValue {
            option: option.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors detected while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            NetError::InvalidBool(_)
                | NetError::InvalidNumber { .. }
                | NetError::LengthMismatch { .. }
                | NetError::UnknownActivation(_)
                | NetError::InvalidValue { .. }
                | NetError::MissingOption(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
