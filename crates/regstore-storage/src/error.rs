use std::path::PathBuf;

use regstore_admission::AdmissionError;
use regstore_types::{ContextError, ObjectKey, ResourceVersion};
use tracing::error;

use crate::backend::Precondition;

/// Errors returned by store operations.
///
/// Everything except [`StoreError::InternalFault`] is a condition the caller
/// can act on; only [`StoreError::Conflict`] is expected to be retried
/// automatically (re-read, re-apply, re-submit).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object exists at the key.
    #[error("{key} not found")]
    NotFound { key: ObjectKey },

    /// Create collided with an existing object.
    #[error("{key} already exists")]
    AlreadyExists { key: ObjectKey },

    /// A version or UID precondition did not match the stored object.
    #[error("conflict on {key}: {reason}")]
    Conflict { key: ObjectKey, reason: String },

    /// A validation hook rejected the proposed object.
    #[error("validation failed for {key}: {source}")]
    ValidationFailed {
        key: ObjectKey,
        #[source]
        source: AdmissionError,
    },

    /// The request or object is malformed (missing name, namespace
    /// mismatch, wrong kind, store-owned field set by the caller).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// A list/watch filter refers to something the kind cannot filter on.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The requested version is older than the retained history.
    #[error("resource version {requested} is too old (oldest retained: {oldest})")]
    Expired {
        requested: ResourceVersion,
        oldest: ResourceVersion,
    },

    /// The requested version has not been issued yet.
    #[error("resource version {requested} is newer than the store ({current})")]
    VersionTooNew {
        requested: ResourceVersion,
        current: ResourceVersion,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Wiring defect or backend malfunction. Not recoverable by the caller.
    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl StoreError {
    /// Build an [`StoreError::InternalFault`], raising the process-level
    /// alarm (an `error` event on the `regstore::alarm` target).
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "regstore::alarm", %message, "internal fault");
        Self::InternalFault(message)
    }

    pub fn conflict(key: &ObjectKey, reason: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// `true` only for conditions a read-modify-write loop should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalFault(_))
    }
}

impl From<ContextError> for StoreError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a persistence [`Backend`](crate::backend::Backend).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The conditional write did not hold: `actual` is the stored version,
    /// `None` when the key is absent.
    #[error("precondition {expected} failed on {key} (stored: {actual:?})")]
    Conflict {
        key: ObjectKey,
        expected: Precondition,
        actual: Option<ResourceVersion>,
    },

    #[error("revision {requested} compacted (oldest retained: {oldest})")]
    Compacted {
        requested: ResourceVersion,
        oldest: ResourceVersion,
    },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Conflict { key, actual: None, .. } => Self::NotFound { key },
            BackendError::Conflict {
                key,
                expected: Precondition::Absent,
                ..
            } => Self::AlreadyExists { key },
            BackendError::Conflict {
                key,
                expected,
                actual: Some(actual),
            } => Self::Conflict {
                reason: format!(
                    "the object has been modified (precondition {expected}, current {actual})"
                ),
                key,
            },
            BackendError::Compacted { requested, oldest } => Self::Expired { requested, oldest },
            BackendError::Unavailable(msg) => Self::internal(format!("backend: {msg}")),
        }
    }
}

/// Errors loading or validating a [`StoreConfig`](crate::config::StoreConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
