use regstore_admission::ValidationChain;
use regstore_types::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, Object, ObjectList, RequestContext,
    UpdateOptions,
};
use regstore_watch::WatchSession;

use crate::error::StoreResult;
use crate::schema::ResourceSchema;
use crate::update::UpdatedObjectInfo;

/// Schema-agnostic CRUD+watch storage for one resource kind.
///
/// All implementations must satisfy these invariants:
/// - Mutations of one key are atomic; a stale version is rejected, never
///   merged.
/// - Every committed mutation gets a fresh version from one global clock.
/// - Validation runs before any mutation; a rejected request leaves the
///   store unchanged.
/// - Watch sessions observe committed changes in commit order.
pub trait StandardStorage: Send + Sync {
    fn schema(&self) -> &ResourceSchema;

    /// Fetch the object named `name` in the request's namespace.
    fn get(&self, ctx: &RequestContext, name: &str, options: &GetOptions) -> StoreResult<Object>;

    /// Enumerate matching objects in key order.
    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<ObjectList>;

    /// Insert a new object after running `validation` on it.
    fn create(
        &self,
        ctx: &RequestContext,
        object: Object,
        validation: &ValidationChain,
        options: &CreateOptions,
    ) -> StoreResult<Object>;

    /// Replace the object named `name` with the one `info` produces.
    ///
    /// Returns the stored object and whether it was created. An absent key
    /// is `NotFound` unless `force_allow_create` is set, in which case
    /// `create_validation` runs instead of `update_validation`.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        create_validation: &ValidationChain,
        update_validation: &ValidationChain,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> StoreResult<(Object, bool)>;

    /// Remove the object named `name`, returning its last stored state.
    fn delete(&self, ctx: &RequestContext, name: &str, options: &DeleteOptions)
        -> StoreResult<Object>;

    /// Open a watch session over matching objects.
    fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> StoreResult<WatchSession>;
}
