use std::fmt;

use regstore_types::{Object, ResourceVersion};
use serde::{Deserialize, Serialize};

use crate::filter::EventFilter;

/// Classification of a committed mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One committed mutation, as recorded in the store's change feed.
///
/// For `Deleted`, `object` is the last stored state re-stamped with the
/// deletion revision and `prior` is that state as it was stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub revision: ResourceVersion,
    pub kind: ChangeKind,
    pub object: Object,
    pub prior: Option<Object>,
}

impl Change {
    /// The event a watcher with `filter` should see for this change, if any.
    ///
    /// Updates are projected by filter transition: an object that stops
    /// matching is reported as `Deleted` (its prior state, stamped with this
    /// revision), one that starts matching as `Added`.
    pub fn project(&self, filter: &dyn EventFilter) -> Option<WatchEvent> {
        match self.kind {
            ChangeKind::Created => filter
                .matches(&self.object)
                .then(|| WatchEvent::Added(self.object.clone())),
            ChangeKind::Deleted => filter
                .matches(&self.object)
                .then(|| WatchEvent::Deleted(self.object.clone())),
            ChangeKind::Updated => {
                let now = filter.matches(&self.object);
                let before = self.prior.as_ref().is_some_and(|p| filter.matches(p));
                match (before, now) {
                    (true, true) => Some(WatchEvent::Modified(self.object.clone())),
                    (false, true) => Some(WatchEvent::Added(self.object.clone())),
                    (true, false) => {
                        let mut gone = self.prior.clone()?;
                        gone.metadata.resource_version = self.revision;
                        Some(WatchEvent::Deleted(gone))
                    }
                    (false, false) => None,
                }
            }
        }
    }
}

/// Error kinds a watch session can terminate with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchErrorKind {
    /// The session's queue filled up; resynchronize with list + watch.
    Overflow,
    /// The requested start version is no longer retained.
    Expired,
    /// The broadcaster or store failed.
    Internal,
}

impl fmt::Display for WatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Overflow => "Overflow",
            Self::Expired => "Expired",
            Self::Internal => "Internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchError {
    pub kind: WatchErrorKind,
    pub message: String,
}

impl WatchError {
    pub fn new(kind: WatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn overflow(capacity: usize) -> Self {
        Self::new(
            WatchErrorKind::Overflow,
            format!("watch queue exceeded capacity {capacity}; relist and watch again"),
        )
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// An event delivered to a watch session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object")]
pub enum WatchEvent {
    Added(Object),
    Modified(Object),
    Deleted(Object),
    Error(WatchError),
}

impl WatchEvent {
    /// The object carried by this event, if it is not an error.
    pub fn object(&self) -> Option<&Object> {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => Some(o),
            Self::Error(_) => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => Some(o),
            Self::Error(_) => None,
        }
    }

    /// Store version at which this event occurred; unset for errors.
    pub fn revision(&self) -> ResourceVersion {
        self.object()
            .map(Object::resource_version)
            .unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Added(_) => "ADDED",
            Self::Modified(_) => "MODIFIED",
            Self::Deleted(_) => "DELETED",
            Self::Error(_) => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regstore_types::{ObjectMeta, TypeMeta};

    fn obj(name: &str, tier: &str, rv: u64) -> Object {
        Object::new(
            TypeMeta::new("v1", "Thing"),
            ObjectMeta::namespaced("default", name)
                .with_label("tier", tier)
                .with_resource_version(ResourceVersion::from_raw(rv)),
            serde_json::Value::Null,
        )
    }

    fn frontend(o: &Object) -> bool {
        o.metadata.labels.get("tier").map(String::as_str) == Some("fe")
    }

    fn update(prior: Object, object: Object) -> Change {
        Change {
            revision: object.resource_version(),
            kind: ChangeKind::Updated,
            object,
            prior: Some(prior),
        }
    }

    #[test]
    fn created_projects_to_added_when_matching() {
        let change = Change {
            revision: ResourceVersion::from_raw(1),
            kind: ChangeKind::Created,
            object: obj("a", "fe", 1),
            prior: None,
        };
        assert!(matches!(change.project(&frontend), Some(WatchEvent::Added(_))));

        let other = Change {
            object: obj("a", "db", 1),
            ..change
        };
        assert!(other.project(&frontend).is_none());
    }

    #[test]
    fn update_transitions_follow_filter() {
        let stay = update(obj("a", "fe", 1), obj("a", "fe", 2));
        assert!(matches!(stay.project(&frontend), Some(WatchEvent::Modified(_))));

        let enter = update(obj("a", "db", 1), obj("a", "fe", 2));
        assert!(matches!(enter.project(&frontend), Some(WatchEvent::Added(_))));

        let outside = update(obj("a", "db", 1), obj("a", "be", 2));
        assert!(outside.project(&frontend).is_none());

        let leave = update(obj("a", "fe", 1), obj("a", "db", 2));
        match leave.project(&frontend) {
            Some(WatchEvent::Deleted(o)) => {
                assert_eq!(o.metadata.labels["tier"], "fe");
                assert_eq!(o.resource_version(), ResourceVersion::from_raw(2));
            }
            other => panic!("expected Deleted, got {other:?}"),
        }
    }

    #[test]
    fn event_revision_and_type_names() {
        let ev = WatchEvent::Modified(obj("a", "fe", 9));
        assert_eq!(ev.revision(), ResourceVersion::from_raw(9));
        assert_eq!(ev.type_name(), "MODIFIED");

        let err = WatchEvent::Error(WatchError::overflow(4));
        assert!(err.is_error());
        assert!(err.revision().is_unset());
        assert!(err.object().is_none());
        assert!(err.to_owned().into_object().is_none());
    }

    #[test]
    fn event_json_is_tagged() {
        let json = serde_json::to_value(WatchEvent::Added(obj("a", "fe", 1))).unwrap();
        assert_eq!(json["type"], "Added");
        assert_eq!(json["object"]["metadata"]["name"], "a");
    }
}
