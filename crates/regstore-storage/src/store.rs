use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use regstore_admission::ValidationChain;
use regstore_types::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, Object, ObjectKey, ObjectList,
    PreconditionMismatch, RequestContext, ResourceVersion, UpdateOptions,
};
use regstore_watch::{Broadcaster, Change, EventFilter, WatchSession};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{Backend, Mutation, Precondition};
use crate::config::StoreConfig;
use crate::continuation::ContinueToken;
use crate::error::{ConfigError, StoreError, StoreResult};
use crate::locks::KeyLocks;
use crate::schema::{ResourceSchema, SelectionPredicate};
use crate::traits::StandardStorage;
use crate::update::UpdatedObjectInfo;

/// The generic store: one resource kind over a [`Backend`], with a watch
/// broadcaster fed from its commits.
///
/// Mutations of a key run under that key's lock, so hooks see a stable
/// prior and are never retried. The commit itself (revision, write, change
/// feed, publish) runs inside a short store-wide section, which is also
/// held while a watch replays history and registers.
pub struct GenericStore<B: Backend + ?Sized> {
    schema: ResourceSchema,
    backend: Arc<B>,
    broadcaster: Broadcaster,
    config: StoreConfig,
    key_locks: KeyLocks,
    commit_section: Mutex<()>,
}

impl<B: Backend + ?Sized> GenericStore<B> {
    pub fn new(
        schema: ResourceSchema,
        backend: Arc<B>,
        config: StoreConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(kind = %schema.kind, resource = %schema.resource, "generic store created");
        Ok(Self {
            schema,
            backend,
            broadcaster: Broadcaster::new(),
            config,
            key_locks: KeyLocks::new(),
            commit_section: Mutex::new(()),
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// End every open watch session.
    pub fn shutdown(&self) {
        self.broadcaster.close_all();
    }

    // -----------------------------------------------------------------------
    // Keys and identity
    // -----------------------------------------------------------------------

    fn key_for(&self, ctx: &RequestContext, name: &str) -> StoreResult<ObjectKey> {
        if name.is_empty() {
            return Err(StoreError::Invalid("name is required".into()));
        }
        match (self.schema.namespaced, ctx.namespace()) {
            (true, Some(ns)) if !ns.is_empty() => Ok(ObjectKey::namespaced(ns, name)),
            (true, _) => Err(StoreError::Invalid(format!(
                "{} is namespaced but the request has no namespace",
                self.schema.kind
            ))),
            (false, None) => Ok(ObjectKey::cluster(name)),
            (false, Some(_)) => Err(StoreError::Invalid(format!(
                "{} is cluster-scoped but the request has a namespace",
                self.schema.kind
            ))),
        }
    }

    /// Check the object's type against the schema, filling it in when blank.
    fn check_type(&self, object: &mut Object) -> StoreResult<()> {
        let tm = &mut object.type_meta;
        if tm.api_version.is_empty() && tm.kind.is_empty() {
            *tm = self.schema.type_meta();
            return Ok(());
        }
        if tm.api_version != self.schema.api_version || tm.kind != self.schema.kind {
            return Err(StoreError::Invalid(format!(
                "this store holds {}/{}, not {}/{}",
                self.schema.api_version, self.schema.kind, tm.api_version, tm.kind
            )));
        }
        Ok(())
    }

    /// Resolve the key of an object submitted for create.
    fn key_for_object(&self, ctx: &RequestContext, object: &mut Object) -> StoreResult<ObjectKey> {
        if object.metadata.namespace.is_none() && self.schema.namespaced {
            object.metadata.namespace = ctx.namespace().map(str::to_string);
        }
        let key = self.key_for(ctx, &object.metadata.name)?;
        self.check_identity(&key, object)?;
        Ok(key)
    }

    /// The object's name and namespace must agree with `key`.
    fn check_identity(&self, key: &ObjectKey, object: &mut Object) -> StoreResult<()> {
        if object.metadata.name != key.name {
            return Err(StoreError::Invalid(format!(
                "name {:?} in the object does not match {:?} in the request",
                object.metadata.name, key.name
            )));
        }
        if key.namespace.is_none() {
            if object.metadata.namespace.is_some() {
                return Err(StoreError::Invalid(format!(
                    "{} is cluster-scoped; objects carry no namespace",
                    self.schema.kind
                )));
            }
            return Ok(());
        }
        if let Some(found) = &object.metadata.namespace {
            if Some(found) != key.namespace.as_ref() {
                return Err(StoreError::Invalid(format!(
                    "namespace {found:?} in the object does not match the request ({key})"
                )));
            }
        }
        object.metadata.namespace = key.namespace.clone();
        Ok(())
    }

    fn stamp_new(object: &mut Object) {
        object.metadata.uid = Some(Uuid::now_v7());
        object.metadata.creation_timestamp = Some(Utc::now());
        object.metadata.generation = 1;
        object.metadata.resource_version = ResourceVersion::unset();
    }

    // -----------------------------------------------------------------------
    // Validation and commit
    // -----------------------------------------------------------------------

    fn admit(
        &self,
        ctx: &RequestContext,
        chain: &ValidationChain,
        key: &ObjectKey,
        proposed: &Object,
        prior: Option<&Object>,
    ) -> StoreResult<()> {
        chain.check(ctx, proposed, prior).map_err(|source| {
            info!(
                kind = %self.schema.kind,
                key = %key,
                hook = source.hook(),
                reason = source.reason(),
                "mutation rejected by validation"
            );
            StoreError::ValidationFailed {
                key: key.clone(),
                source,
            }
        })
    }

    fn precondition_failed(&self, key: &ObjectKey, mismatch: PreconditionMismatch) -> StoreError {
        let reason = match mismatch {
            PreconditionMismatch::Uid { expected, actual } => format!(
                "precondition failed: uid {expected}, stored {}",
                actual.map(|u| u.to_string()).unwrap_or_default()
            ),
            PreconditionMismatch::ResourceVersion { expected, actual } => format!(
                "the object has been modified (precondition {expected}, current {actual})"
            ),
        };
        info!(kind = %self.schema.kind, key = %key, %reason, "conflict");
        StoreError::conflict(key, reason)
    }

    fn commit(
        &self,
        key: &ObjectKey,
        precondition: Precondition,
        mutation: Mutation,
    ) -> StoreResult<Change> {
        let _section = self
            .commit_section
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let change = self
            .backend
            .commit(&self.schema.resource, key, precondition, mutation)
            .map_err(StoreError::from)
            .inspect_err(|e| {
                if e.is_conflict() {
                    info!(kind = %self.schema.kind, key = %key, error = %e, "conflict");
                }
            })?;
        let delivered = self.broadcaster.publish(&change);
        debug!(
            kind = %self.schema.kind,
            key = %key,
            revision = %change.revision,
            change = ?change.kind,
            delivered,
            "committed"
        );
        Ok(change)
    }

    fn ensure_issued(&self, requested: ResourceVersion) -> StoreResult<ResourceVersion> {
        let current = self.backend.revision()?;
        if !requested.is_unset() && requested > current {
            return Err(StoreError::VersionTooNew { requested, current });
        }
        Ok(current)
    }
}

impl<B: Backend + ?Sized> StandardStorage for GenericStore<B> {
    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn get(&self, ctx: &RequestContext, name: &str, options: &GetOptions) -> StoreResult<Object> {
        ctx.check()?;
        let key = self.key_for(ctx, name)?;
        self.ensure_issued(options.resource_version)?;
        self.backend
            .get(&self.schema.resource, &key)?
            .ok_or(StoreError::NotFound { key })
    }

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<ObjectList> {
        ctx.check()?;
        let predicate = SelectionPredicate::new(&self.schema, ctx.namespace(), options)?;
        let resource = &self.schema.resource;

        let (snapshot, after) = match &options.continue_token {
            Some(token) => {
                if !options.resource_version.is_unset() {
                    return Err(StoreError::Invalid(
                        "a resource version cannot be combined with a continue token".into(),
                    ));
                }
                let token = ContinueToken::decode(token)?;
                if token.rv > self.backend.revision()? {
                    return Err(StoreError::Invalid(
                        "continue token refers to an unissued version".into(),
                    ));
                }
                let snapshot = self
                    .backend
                    .list_at(resource, predicate.namespace(), token.rv)?;
                (snapshot, Some(token.start))
            }
            None => {
                self.ensure_issued(options.resource_version)?;
                (self.backend.list(resource, predicate.namespace())?, None)
            }
        };

        let revision = snapshot.revision;
        let limit = match options.limit {
            None | Some(0) => None,
            Some(n) => Some(n.min(self.config.max_page_size)),
        };
        let mut matching = snapshot
            .objects
            .into_iter()
            .filter(|o| after.as_ref().map_or(true, |start| &o.key() > start))
            .filter(|o| predicate.matches_object(o));
        let items: Vec<Object> = match limit {
            Some(n) => matching.by_ref().take(n).collect(),
            None => matching.by_ref().collect(),
        };
        let remaining = matching.count();

        let (continue_token, remaining_item_count) = match items.last() {
            Some(last) if remaining > 0 => {
                let token = ContinueToken {
                    rv: revision,
                    start: last.key(),
                };
                (Some(token.encode()?), Some(remaining as u64))
            }
            _ => (None, None),
        };

        debug!(
            kind = %self.schema.kind,
            revision = %revision,
            items = items.len(),
            remaining,
            "list"
        );
        Ok(ObjectList {
            items,
            resource_version: revision,
            continue_token,
            remaining_item_count,
        })
    }

    fn create(
        &self,
        ctx: &RequestContext,
        mut object: Object,
        validation: &ValidationChain,
        options: &CreateOptions,
    ) -> StoreResult<Object> {
        ctx.check()?;
        self.check_type(&mut object)?;
        let key = self.key_for_object(ctx, &mut object)?;
        if !object.resource_version().is_unset() {
            return Err(StoreError::Invalid(
                "resourceVersion must not be set on create".into(),
            ));
        }

        self.key_locks.with_key(&key, || {
            ctx.check()?;
            if self.backend.get(&self.schema.resource, &key)?.is_some() {
                return Err(StoreError::AlreadyExists { key: key.clone() });
            }
            Self::stamp_new(&mut object);
            self.admit(ctx, validation, &key, &object, None)?;
            if options.dry_run {
                debug!(kind = %self.schema.kind, key = %key, "dry-run create");
                return Ok(object);
            }
            let change = self.commit(&key, Precondition::Absent, Mutation::Put(object))?;
            Ok(change.object)
        })
    }

    fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        create_validation: &ValidationChain,
        update_validation: &ValidationChain,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> StoreResult<(Object, bool)> {
        ctx.check()?;
        let key = self.key_for(ctx, name)?;

        self.key_locks.with_key(&key, || {
            ctx.check()?;
            let preconditions = info.preconditions();
            let current = self.backend.get(&self.schema.resource, &key)?;

            let Some(current) = current else {
                // A precondition names a version that does not exist.
                if !force_allow_create || !preconditions.is_empty() {
                    return Err(StoreError::NotFound { key: key.clone() });
                }
                let mut object = info.updated_object(ctx, None)?;
                self.check_type(&mut object)?;
                self.check_identity(&key, &mut object)?;
                if !object.resource_version().is_unset() {
                    return Err(StoreError::NotFound { key: key.clone() });
                }
                Self::stamp_new(&mut object);
                self.admit(ctx, create_validation, &key, &object, None)?;
                if options.dry_run {
                    return Ok((object, true));
                }
                let change = self.commit(&key, Precondition::Absent, Mutation::Put(object))?;
                return Ok((change.object, true));
            };

            preconditions
                .verify(&current.metadata)
                .map_err(|m| self.precondition_failed(&key, m))?;

            let mut object = info.updated_object(ctx, Some(&current))?;
            self.check_type(&mut object)?;
            self.check_identity(&key, &mut object)?;
            let stored = current.resource_version();
            let proposed = object.resource_version();
            if !proposed.is_unset() && proposed != stored {
                return Err(self.precondition_failed(
                    &key,
                    PreconditionMismatch::ResourceVersion {
                        expected: proposed,
                        actual: stored,
                    },
                ));
            }
            if let Some(uid) = object.metadata.uid {
                if current.metadata.uid != Some(uid) {
                    return Err(self.precondition_failed(
                        &key,
                        PreconditionMismatch::Uid {
                            expected: uid,
                            actual: current.metadata.uid,
                        },
                    ));
                }
            }

            object.metadata.uid = current.metadata.uid;
            object.metadata.creation_timestamp = current.metadata.creation_timestamp;
            object.metadata.resource_version = stored;
            object.metadata.generation = if object.spec == current.spec {
                current.metadata.generation
            } else {
                current.metadata.generation + 1
            };

            self.admit(ctx, update_validation, &key, &object, Some(&current))?;
            if options.dry_run {
                debug!(kind = %self.schema.kind, key = %key, "dry-run update");
                return Ok((object, false));
            }
            let change = self.commit(&key, Precondition::Version(stored), Mutation::Put(object))?;
            Ok((change.object, false))
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<Object> {
        ctx.check()?;
        let key = self.key_for(ctx, name)?;

        self.key_locks.with_key(&key, || {
            ctx.check()?;
            let current = self
                .backend
                .get(&self.schema.resource, &key)?
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
            options
                .preconditions
                .verify(&current.metadata)
                .map_err(|m| self.precondition_failed(&key, m))?;
            if options.dry_run {
                debug!(kind = %self.schema.kind, key = %key, "dry-run delete");
                return Ok(current);
            }
            let change = self.commit(
                &key,
                Precondition::Version(current.resource_version()),
                Mutation::Delete,
            )?;
            Ok(change.prior.unwrap_or(current))
        })
    }

    fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<WatchSession> {
        ctx.check()?;
        if options.continue_token.is_some() {
            return Err(StoreError::Invalid(
                "continue tokens are not accepted by watch".into(),
            ));
        }
        let predicate: Arc<dyn EventFilter> =
            Arc::new(SelectionPredicate::new(&self.schema, ctx.namespace(), options)?);
        let capacity = self.config.watch_queue_capacity;

        let _section = self
            .commit_section
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let requested = options.resource_version;
        if requested.is_unset() {
            return Ok(self.broadcaster.subscribe(ctx, predicate, capacity));
        }
        self.ensure_issued(requested)?;
        let backlog = self
            .backend
            .changes_since(&self.schema.resource, requested)?;
        debug!(
            kind = %self.schema.kind,
            from = %requested,
            backlog = backlog.len(),
            "watch resuming from version"
        );
        Ok(self
            .broadcaster
            .subscribe_with_backlog(ctx, predicate, capacity, &backlog))
    }
}

impl<B: Backend + ?Sized> std::fmt::Debug for GenericStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericStore")
            .field("kind", &self.schema.kind)
            .field("resource", &self.schema.resource)
            .field("watchers", &self.broadcaster.session_count())
            .finish()
    }
}
