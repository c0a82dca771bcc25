//! Error types for flannel.

use thiserror::Error;

/// Errors raised while configuring, building or querying an index.
///
/// All errors are reported synchronously by the call that detected them;
/// nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Invalid build or search parameter (branching < 2, zero trees, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The operation is not available for this metric, data kind or index state.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Query (or row) width differs from the indexed data.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl IndexError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        IndexError::Configuration(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        IndexError::UnsupportedOperation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
