use std::fmt;

use regstore_types::{Object, ObjectKey, ResourceVersion};
use regstore_watch::Change;

use crate::error::BackendResult;

/// Condition a [`Backend::commit`] must find before it writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The key must not exist.
    Absent,
    /// The key must exist at exactly this version.
    Version(ResourceVersion),
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Version(v) => write!(f, "{v}"),
        }
    }
}

/// What a commit does to the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Store this object. Its `resource_version` is overwritten with the
    /// commit revision.
    Put(Object),
    Delete,
}

/// A consistent enumeration of one resource at one revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Objects in key order.
    pub objects: Vec<Object>,
    pub revision: ResourceVersion,
}

/// Persistence boundary of the generic store.
///
/// A backend is a versioned key-value map with a change feed. Every call is
/// scoped by `resource`, the prefix that keeps kinds apart, but revisions come
/// from a single clock shared by all resources.
///
/// Implementations must guarantee:
/// - `commit` is atomic: the precondition check, the revision bump, the write
///   and the change-feed append happen as one step.
/// - Revisions are strictly increasing and never reused.
/// - `changes_since` returns changes in commit order.
/// - Readers never observe a partial commit.
pub trait Backend: Send + Sync {
    /// Read the current object at `key`, `Ok(None)` if absent.
    fn get(&self, resource: &str, key: &ObjectKey) -> BackendResult<Option<Object>>;

    /// Snapshot of every object of `resource` (restricted to `namespace` when
    /// given) at the current revision.
    fn list(&self, resource: &str, namespace: Option<&str>) -> BackendResult<Snapshot>;

    /// Snapshot as of `revision`, reconstructed from the change feed.
    ///
    /// Fails with `Compacted` when the feed no longer reaches back that far.
    fn list_at(
        &self,
        resource: &str,
        namespace: Option<&str>,
        revision: ResourceVersion,
    ) -> BackendResult<Snapshot>;

    /// Conditionally apply `mutation` to `key`, returning the recorded change.
    fn commit(
        &self,
        resource: &str,
        key: &ObjectKey,
        precondition: Precondition,
        mutation: Mutation,
    ) -> BackendResult<Change>;

    /// Changes to `resource` with a revision strictly greater than `revision`.
    fn changes_since(&self, resource: &str, revision: ResourceVersion)
        -> BackendResult<Vec<Change>>;

    /// Latest committed revision; unset before the first commit.
    fn revision(&self) -> BackendResult<ResourceVersion>;
}
