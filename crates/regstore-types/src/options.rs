use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meta::ObjectMeta;
use crate::selector::{FieldSelector, LabelSelector};
use crate::version::ResourceVersion;

/// Options for a single-object read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOptions {
    /// When set, the read must reflect a store state at least this recent.
    pub resource_version: ResourceVersion,
}

/// Options for list and watch calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    /// For watch: stream events strictly after this version. For list:
    /// "not older than" constraint, like [`GetOptions::resource_version`].
    pub resource_version: ResourceVersion,
    /// Maximum number of items per page. `None` means unbounded, subject to
    /// the store's configured page ceiling.
    pub limit: Option<usize>,
    /// Opaque token returned by a previous truncated list.
    pub continue_token: Option<String>,
}

impl ListOptions {
    pub fn with_labels(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    pub fn with_fields(mut self, selector: FieldSelector) -> Self {
        self.field_selector = selector;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_continue(mut self, token: impl Into<String>) -> Self {
        self.continue_token = Some(token.into());
        self
    }

    pub fn from_version(mut self, version: ResourceVersion) -> Self {
        self.resource_version = version;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Run validation and return the would-be object without committing.
    pub dry_run: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Run validation and return the would-be object without committing.
    pub dry_run: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub preconditions: Preconditions,
    /// Verify preconditions and return the object that would be deleted
    /// without committing.
    pub dry_run: bool,
}

impl DeleteOptions {
    pub fn with_resource_version(version: ResourceVersion) -> Self {
        Self {
            preconditions: Preconditions {
                resource_version: Some(version),
                uid: None,
            },
            dry_run: false,
        }
    }
}

/// Expectations a mutation makes about the object's current state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preconditions {
    pub uid: Option<Uuid>,
    pub resource_version: Option<ResourceVersion>,
}

/// Which precondition failed and what the object actually carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreconditionMismatch {
    Uid {
        expected: Uuid,
        actual: Option<Uuid>,
    },
    ResourceVersion {
        expected: ResourceVersion,
        actual: ResourceVersion,
    },
}

impl Preconditions {
    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.resource_version.is_none()
    }

    /// Check these preconditions against the current object's metadata.
    pub fn verify(&self, current: &ObjectMeta) -> Result<(), PreconditionMismatch> {
        if let Some(expected) = self.uid {
            if current.uid != Some(expected) {
                return Err(PreconditionMismatch::Uid {
                    expected,
                    actual: current.uid,
                });
            }
        }
        if let Some(expected) = self.resource_version {
            if current.resource_version != expected {
                return Err(PreconditionMismatch::ResourceVersion {
                    expected,
                    actual: current.resource_version,
                });
            }
        }
        Ok(())
    }
}
