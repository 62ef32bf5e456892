use std::collections::{BTreeMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use regstore_types::{Object, ObjectKey, ResourceVersion};
use regstore_watch::{Change, ChangeKind};

use crate::backend::{Backend, Mutation, Precondition, Snapshot};
use crate::config::StoreConfig;
use crate::error::{BackendError, BackendResult};

type StorageKey = (String, ObjectKey);

struct Recorded {
    resource: String,
    change: Change,
}

struct State {
    objects: BTreeMap<StorageKey, Object>,
    revision: ResourceVersion,
    history: VecDeque<Recorded>,
    history_capacity: usize,
    /// Every change after this revision is still in `history`.
    compacted: ResourceVersion,
}

impl State {
    fn record(&mut self, resource: &str, change: Change) {
        self.history.push_back(Recorded {
            resource: resource.to_string(),
            change,
        });
        while self.history.len() > self.history_capacity {
            if let Some(evicted) = self.history.pop_front() {
                self.compacted = evicted.change.revision;
            }
        }
    }

    fn ensure_retained(&self, revision: ResourceVersion) -> BackendResult<()> {
        if revision < self.compacted {
            return Err(BackendError::Compacted {
                requested: revision,
                oldest: self.compacted,
            });
        }
        Ok(())
    }

    fn current(&self, resource: &str, namespace: Option<&str>) -> BTreeMap<ObjectKey, Object> {
        self.objects
            .iter()
            .filter(|((r, key), _)| r == resource && namespace.map_or(true, |ns| key.in_namespace(ns)))
            .map(|((_, key), obj)| (key.clone(), obj.clone()))
            .collect()
    }
}

/// In-memory backend with a bounded change history.
///
/// Intended for tests, the CLI and embedding. The latest `history_capacity`
/// changes are retained; older revisions report `Compacted` to `list_at`
/// and `changes_since`.
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: RwLock::new(State {
                objects: BTreeMap::new(),
                revision: ResourceVersion::unset(),
                history: VecDeque::new(),
                history_capacity: history_capacity.max(1),
                compacted: ResourceVersion::unset(),
            }),
        }
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self::new(config.history_capacity)
    }

    /// Number of objects stored across all resources.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest revision a watch or historic list can still start from.
    pub fn oldest_retained(&self) -> BackendResult<ResourceVersion> {
        Ok(self.read()?.compacted)
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| BackendError::Unavailable("state lock poisoned".into()))
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| BackendError::Unavailable("state lock poisoned".into()))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_config(&StoreConfig::default())
    }
}

impl Backend for InMemoryBackend {
    fn get(&self, resource: &str, key: &ObjectKey) -> BackendResult<Option<Object>> {
        let state = self.read()?;
        Ok(state.objects.get(&(resource.to_string(), key.clone())).cloned())
    }

    fn list(&self, resource: &str, namespace: Option<&str>) -> BackendResult<Snapshot> {
        let state = self.read()?;
        Ok(Snapshot {
            objects: state.current(resource, namespace).into_values().collect(),
            revision: state.revision,
        })
    }

    fn list_at(
        &self,
        resource: &str,
        namespace: Option<&str>,
        revision: ResourceVersion,
    ) -> BackendResult<Snapshot> {
        let state = self.read()?;
        if revision > state.revision {
            return Err(BackendError::Unavailable(format!(
                "revision {revision} has not been issued (current {})",
                state.revision
            )));
        }
        state.ensure_retained(revision)?;

        // Roll the current state back over every later change.
        let mut objects = state.current(resource, namespace);
        for recorded in state.history.iter().rev() {
            let change = &recorded.change;
            if change.revision <= revision {
                break;
            }
            if recorded.resource != resource {
                continue;
            }
            let key = change.object.key();
            if namespace.is_some_and(|ns| !key.in_namespace(ns)) {
                continue;
            }
            match (&change.kind, &change.prior) {
                (ChangeKind::Created, _) => {
                    objects.remove(&key);
                }
                (_, Some(prior)) => {
                    objects.insert(key, prior.clone());
                }
                (_, None) => {
                    return Err(BackendError::Unavailable(format!(
                        "change at {} for {key} has no prior state",
                        change.revision
                    )));
                }
            }
        }

        Ok(Snapshot {
            objects: objects.into_values().collect(),
            revision,
        })
    }

    fn commit(
        &self,
        resource: &str,
        key: &ObjectKey,
        precondition: Precondition,
        mutation: Mutation,
    ) -> BackendResult<Change> {
        let mut state = self.write()?;
        let storage_key = (resource.to_string(), key.clone());
        let actual = state
            .objects
            .get(&storage_key)
            .map(Object::resource_version);

        let holds = match (precondition, actual) {
            (Precondition::Absent, None) => true,
            (Precondition::Version(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if !holds || (actual.is_none() && matches!(mutation, Mutation::Delete)) {
            return Err(BackendError::Conflict {
                key: key.clone(),
                expected: precondition,
                actual,
            });
        }

        let revision = state.revision.next();
        let change = match mutation {
            Mutation::Put(mut object) => {
                object.metadata.resource_version = revision;
                let prior = state.objects.insert(storage_key, object.clone());
                let kind = if prior.is_some() {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Created
                };
                Change {
                    revision,
                    kind,
                    object,
                    prior,
                }
            }
            Mutation::Delete => {
                let prior = state.objects.remove(&storage_key);
                let mut object = prior.clone().ok_or_else(|| {
                    BackendError::Unavailable(format!("{key} vanished during commit"))
                })?;
                object.metadata.resource_version = revision;
                Change {
                    revision,
                    kind: ChangeKind::Deleted,
                    object,
                    prior,
                }
            }
        };

        state.revision = revision;
        state.record(resource, change.clone());
        Ok(change)
    }

    fn changes_since(
        &self,
        resource: &str,
        revision: ResourceVersion,
    ) -> BackendResult<Vec<Change>> {
        let state = self.read()?;
        state.ensure_retained(revision)?;
        Ok(state
            .history
            .iter()
            .filter(|r| r.resource == resource && r.change.revision > revision)
            .map(|r| r.change.clone())
            .collect())
    }

    fn revision(&self) -> BackendResult<ResourceVersion> {
        Ok(self.read()?.revision)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("InMemoryBackend");
        if let Ok(state) = self.read() {
            d.field("object_count", &state.objects.len())
                .field("revision", &state.revision)
                .field("retained_changes", &state.history.len());
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regstore_types::{ObjectMeta, TypeMeta};

    const RES: &str = "widgets";

    fn obj(ns: &str, name: &str, size: u64) -> Object {
        Object::new(
            TypeMeta::new("example.io/v1", "Widget"),
            ObjectMeta::namespaced(ns, name),
            serde_json::json!({ "size": size }),
        )
    }

    fn rv(raw: u64) -> ResourceVersion {
        ResourceVersion::from_raw(raw)
    }

    fn put(backend: &InMemoryBackend, o: Object, pre: Precondition) -> Change {
        backend
            .commit(RES, &o.key(), pre, Mutation::Put(o))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    #[test]
    fn commits_stamp_increasing_revisions() {
        let backend = InMemoryBackend::new(10);
        assert!(backend.revision().unwrap().is_unset());

        let a = put(&backend, obj("default", "a", 1), Precondition::Absent);
        let b = put(&backend, obj("default", "b", 1), Precondition::Absent);
        assert_eq!(a.revision, rv(1));
        assert_eq!(a.kind, ChangeKind::Created);
        assert_eq!(a.object.resource_version(), rv(1));
        assert_eq!(b.revision, rv(2));
        assert_eq!(backend.revision().unwrap(), rv(2));

        let stored = backend.get(RES, &a.object.key()).unwrap().unwrap();
        assert_eq!(stored.resource_version(), rv(1));
    }

    #[test]
    fn create_on_existing_key_conflicts() {
        let backend = InMemoryBackend::new(10);
        put(&backend, obj("default", "a", 1), Precondition::Absent);
        let o = obj("default", "a", 2);
        let err = backend
            .commit(RES, &o.key(), Precondition::Absent, Mutation::Put(o))
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Conflict { actual: Some(v), .. } if v == rv(1)
        ));
        assert_eq!(backend.revision().unwrap(), rv(1));
    }

    #[test]
    fn update_requires_matching_version() {
        let backend = InMemoryBackend::new(10);
        let created = put(&backend, obj("default", "a", 1), Precondition::Absent);
        let updated = put(&backend, obj("default", "a", 2), Precondition::Version(rv(1)));
        assert_eq!(updated.kind, ChangeKind::Updated);
        assert_eq!(updated.prior, Some(created.object));

        let o = obj("default", "a", 3);
        let err = backend
            .commit(RES, &o.key(), Precondition::Version(rv(1)), Mutation::Put(o))
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict { .. }));
    }

    #[test]
    fn delete_restamps_last_state() {
        let backend = InMemoryBackend::new(10);
        let created = put(&backend, obj("default", "a", 1), Precondition::Absent);
        let key = created.object.key();
        let deleted = backend
            .commit(RES, &key, Precondition::Version(rv(1)), Mutation::Delete)
            .unwrap();
        assert_eq!(deleted.kind, ChangeKind::Deleted);
        assert_eq!(deleted.object.resource_version(), rv(2));
        assert_eq!(deleted.object.spec, created.object.spec);
        assert_eq!(deleted.prior.unwrap().resource_version(), rv(1));
        assert!(backend.get(RES, &key).unwrap().is_none());

        let err = backend
            .commit(RES, &key, Precondition::Absent, Mutation::Delete)
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict { actual: None, .. }));
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[test]
    fn list_is_sorted_and_namespace_scoped() {
        let backend = InMemoryBackend::new(10);
        put(&backend, obj("prod", "b", 1), Precondition::Absent);
        put(&backend, obj("default", "z", 1), Precondition::Absent);
        put(&backend, obj("default", "a", 1), Precondition::Absent);

        let all = backend.list(RES, None).unwrap();
        let names: Vec<_> = all.objects.iter().map(|o| o.key().to_string()).collect();
        assert_eq!(names, ["default/a", "default/z", "prod/b"]);
        assert_eq!(all.revision, rv(3));

        let prod = backend.list(RES, Some("prod")).unwrap();
        assert_eq!(prod.objects.len(), 1);
    }

    #[test]
    fn resources_are_isolated_but_share_the_clock() {
        let backend = InMemoryBackend::new(10);
        put(&backend, obj("default", "a", 1), Precondition::Absent);
        let other = obj("default", "a", 1);
        let change = backend
            .commit("gadgets", &other.key(), Precondition::Absent, Mutation::Put(other))
            .unwrap();
        assert_eq!(change.revision, rv(2));
        assert_eq!(backend.list(RES, None).unwrap().objects.len(), 1);
        assert_eq!(backend.changes_since(RES, rv(0)).unwrap().len(), 1);
        assert_eq!(backend.changes_since("gadgets", rv(0)).unwrap().len(), 1);
    }

    #[test]
    fn list_at_rolls_back_later_changes() {
        let backend = InMemoryBackend::new(10);
        put(&backend, obj("default", "a", 1), Precondition::Absent); // 1
        put(&backend, obj("default", "b", 1), Precondition::Absent); // 2
        put(&backend, obj("default", "a", 2), Precondition::Version(rv(1))); // 3
        backend
            .commit(
                RES,
                &ObjectKey::namespaced("default", "b"),
                Precondition::Version(rv(2)),
                Mutation::Delete,
            )
            .unwrap(); // 4
        put(&backend, obj("default", "c", 1), Precondition::Absent); // 5

        let at2 = backend.list_at(RES, None, rv(2)).unwrap();
        assert_eq!(at2.revision, rv(2));
        let names: Vec<_> = at2.objects.iter().map(|o| o.metadata.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(at2.objects[0].spec["size"], 1);
        assert_eq!(at2.objects[0].resource_version(), rv(1));

        let now = backend.list(RES, None).unwrap();
        assert_eq!(backend.list_at(RES, None, rv(5)).unwrap().objects, now.objects);
    }

    #[test]
    fn bounded_history_compacts() {
        let backend = InMemoryBackend::new(2);
        for i in 0..4 {
            put(&backend, obj("default", &format!("o{i}"), 1), Precondition::Absent);
        }
        // Revisions 3 and 4 are retained; starting after 2 still works.
        assert_eq!(backend.oldest_retained().unwrap(), rv(2));
        assert_eq!(backend.changes_since(RES, rv(2)).unwrap().len(), 2);
        assert!(backend.list_at(RES, None, rv(2)).is_ok());

        let err = backend.changes_since(RES, rv(1)).unwrap_err();
        assert_eq!(
            err,
            BackendError::Compacted {
                requested: rv(1),
                oldest: rv(2)
            }
        );
        assert!(matches!(
            backend.list_at(RES, None, rv(1)),
            Err(BackendError::Compacted { .. })
        ));
    }

    #[test]
    fn list_at_future_revision_is_rejected() {
        let backend = InMemoryBackend::new(2);
        assert!(backend.list_at(RES, None, rv(1)).is_err());
    }
}
