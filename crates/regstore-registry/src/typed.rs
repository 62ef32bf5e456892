use std::marker::PhantomData;
use std::sync::Arc;

use regstore_admission::ValidationChain;
use regstore_storage::{Replacement, StandardStorage, StoreError, StoreResult};
use regstore_types::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, Object, ObjectList, RequestContext,
    Resource, ResourceVersion, UpdateOptions,
};
use regstore_watch::{WatchError, WatchEvent, WatchSession};
use serde::Serialize;
use tracing::error;

// ---------------------------------------------------------------------------
// Narrowing
// ---------------------------------------------------------------------------

/// Narrow a generic object returned by storage into `K`.
///
/// Storage bound to `K`'s schema only ever holds `K`, so a failure here is a
/// wiring defect rather than a request error.
pub(crate) fn narrow<K: Resource>(object: Object) -> K {
    let key = object.key();
    match K::try_from_object(object) {
        Ok(typed) => typed,
        Err(err) => {
            error!(expected = K::KIND, key = %key, error = %err, "storage returned an incompatible object");
            panic!("storage for {} returned incompatible object {key}: {err}", K::KIND);
        }
    }
}

fn widen<K: Resource>(resource: &K) -> StoreResult<Object> {
    resource
        .clone()
        .into_object()
        .map_err(|e| StoreError::internal(format!("encoding {}: {e}", K::KIND)))
}

// ---------------------------------------------------------------------------
// Lists and watches
// ---------------------------------------------------------------------------

/// A typed page of list results.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<K> {
    pub items: Vec<K>,
    pub resource_version: ResourceVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<u64>,
}

impl<K: Resource> ResourceList<K> {
    fn narrow(list: ObjectList) -> Self {
        Self {
            items: list.items.into_iter().map(narrow).collect(),
            resource_version: list.resource_version,
            continue_token: list.continue_token,
            remaining_item_count: list.remaining_item_count,
        }
    }
}

impl<K> ResourceList<K> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A watch event carrying a typed object.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    Error(WatchError),
}

impl<K: Resource> TypedEvent<K> {
    fn narrow(event: WatchEvent) -> Self {
        match event {
            WatchEvent::Added(o) => Self::Added(narrow(o)),
            WatchEvent::Modified(o) => Self::Modified(narrow(o)),
            WatchEvent::Deleted(o) => Self::Deleted(narrow(o)),
            WatchEvent::Error(e) => Self::Error(e),
        }
    }

    pub fn object(&self) -> Option<&K> {
        match self {
            Self::Added(k) | Self::Modified(k) | Self::Deleted(k) => Some(k),
            Self::Error(_) => None,
        }
    }

    pub fn revision(&self) -> ResourceVersion {
        self.object()
            .map(|k| k.metadata().resource_version)
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

/// A watch session that narrows every event into `K`.
pub struct TypedWatch<K> {
    session: WatchSession,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Resource> TypedWatch<K> {
    pub fn new(session: WatchSession) -> Self {
        Self {
            session,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    pub async fn next(&mut self) -> Option<TypedEvent<K>> {
        self.session.next().await.map(TypedEvent::narrow)
    }

    pub fn try_next(&mut self) -> Option<TypedEvent<K>> {
        self.session.try_next().map(TypedEvent::narrow)
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    pub fn into_inner(self) -> WatchSession {
        self.session
    }
}

impl<K> std::fmt::Debug for TypedWatch<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedWatch")
            .field("session", &self.session)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypedStorage
// ---------------------------------------------------------------------------

/// Strongly typed view of a [`StandardStorage`] bound to kind `K`.
///
/// Store errors pass through unchanged; only successful results are
/// narrowed.
pub struct TypedStorage<K> {
    storage: Arc<dyn StandardStorage>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for TypedStorage<K> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> TypedStorage<K> {
    /// Bind `storage` to `K`.
    ///
    /// # Panics
    ///
    /// If the storage serves a different kind.
    pub fn new(storage: Arc<dyn StandardStorage>) -> Self {
        let schema = storage.schema();
        if schema.kind != K::KIND
            || schema.api_version != K::API_VERSION
            || schema.namespaced != K::NAMESPACED
        {
            error!(
                expected = K::KIND,
                found = %schema.kind,
                "typed storage bound to the wrong kind"
            );
            panic!(
                "typed storage for {}/{} bound to storage for {}/{}",
                K::API_VERSION,
                K::KIND,
                schema.api_version,
                schema.kind
            );
        }
        Self {
            storage,
            _kind: PhantomData,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StandardStorage> {
        &self.storage
    }

    pub fn get(&self, ctx: &RequestContext, name: &str, options: &GetOptions) -> StoreResult<K> {
        self.storage.get(ctx, name, options).map(narrow)
    }

    pub fn list(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<ResourceList<K>> {
        self.storage.list(ctx, options).map(ResourceList::narrow)
    }

    pub fn create(
        &self,
        ctx: &RequestContext,
        resource: &K,
        validation: &ValidationChain,
        options: &CreateOptions,
    ) -> StoreResult<K> {
        let object = widen(resource)?;
        self.storage
            .create(ctx, object, validation, options)
            .map(narrow)
    }

    /// Replace the stored object named like `resource`.
    ///
    /// A non-empty `resource_version` on `resource` is a precondition.
    pub fn update(
        &self,
        ctx: &RequestContext,
        resource: &K,
        create_validation: &ValidationChain,
        update_validation: &ValidationChain,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> StoreResult<(K, bool)> {
        let object = widen(resource)?;
        let name = object.metadata.name.clone();
        self.storage
            .update(
                ctx,
                &name,
                &Replacement::new(object),
                create_validation,
                update_validation,
                force_allow_create,
                options,
            )
            .map(|(object, created)| (narrow(object), created))
    }

    pub fn delete(&self, ctx: &RequestContext, name: &str, options: &DeleteOptions) -> StoreResult<K> {
        self.storage.delete(ctx, name, options).map(narrow)
    }

    pub fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<TypedWatch<K>> {
        self.storage.watch(ctx, options).map(TypedWatch::new)
    }
}

impl<K> std::fmt::Debug for TypedStorage<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedStorage")
            .field("kind", &self.storage.schema().kind)
            .finish()
    }
}
