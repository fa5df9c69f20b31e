//! Error types for generation calls and batch construction.

use thiserror::Error;

use crate::retry::classify::is_transient_message;

/// Failure of a single generation call.
///
/// `Upstream` keeps the provider's message verbatim so the transient-error
/// heuristic (and the caller) see exactly what the remote reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// The remote generation endpoint reported a failure.
    #[error("{0}")]
    Upstream(String),

    /// The response arrived but could not be interpreted. Never retried.
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    /// The request was rejected before any remote work happened.
    #[error("invalid generation input: {0}")]
    InvalidInput(String),

    /// The owning batch was cancelled before the call could finish.
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerateError {
    pub fn upstream(message: impl Into<String>) -> Self {
        GenerateError::Upstream(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        GenerateError::MalformedResponse(message.into())
    }

    /// Is this failure worth retrying?
    ///
    /// Only upstream failures can be transient; malformed responses, input
    /// rejections, and cancellation are terminal by definition.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerateError::Upstream(message) => is_transient_message(message),
            _ => false,
        }
    }
}

/// Rejection at batch (or credential pool) construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch must contain at least one job")]
    EmptyBatch,

    #[error("job {index} has an empty label")]
    EmptyLabel { index: usize },

    #[error("credential pool requires at least one key")]
    NoCredentials,
}
