use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid resource version: {0:?}")]
    InvalidResourceVersion(String),

    #[error("invalid selector {input:?}: {reason}")]
    InvalidSelector { input: String, reason: String },

    #[error("kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: String, found: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TypeError {
    pub(crate) fn selector(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
