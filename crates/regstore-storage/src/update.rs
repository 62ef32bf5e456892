use regstore_types::{Object, Preconditions, RequestContext};

use crate::error::{StoreError, StoreResult};

/// Supplies the desired object for an update.
///
/// The store calls [`Self::updated_object`] exactly once, under the key lock,
/// with the object currently stored (`None` when creating on update).
pub trait UpdatedObjectInfo: Send + Sync {
    /// Expectations checked against the current object before
    /// [`Self::updated_object`] runs.
    fn preconditions(&self) -> Preconditions {
        Preconditions::default()
    }

    fn updated_object(&self, ctx: &RequestContext, current: Option<&Object>) -> StoreResult<Object>;
}

/// Replace the stored object wholesale.
///
/// A non-empty `resource_version` on the replacement acts as a version
/// precondition.
#[derive(Debug, Clone)]
pub struct Replacement {
    object: Object,
}

impl Replacement {
    pub fn new(object: Object) -> Self {
        Self { object }
    }
}

impl UpdatedObjectInfo for Replacement {
    fn preconditions(&self) -> Preconditions {
        let rv = self.object.resource_version();
        Preconditions {
            uid: self.object.metadata.uid,
            resource_version: (!rv.is_unset()).then_some(rv),
        }
    }

    fn updated_object(&self, _ctx: &RequestContext, _current: Option<&Object>) -> StoreResult<Object> {
        Ok(self.object.clone())
    }
}

/// Derive the new object from the current one with a closure.
///
/// A mutator needs something to mutate, so it never creates.
pub struct Mutator<F> {
    preconditions: Preconditions,
    func: F,
}

impl<F> Mutator<F>
where
    F: Fn(&Object) -> StoreResult<Object> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            preconditions: Preconditions::default(),
            func,
        }
    }

    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = preconditions;
        self
    }
}

impl<F> UpdatedObjectInfo for Mutator<F>
where
    F: Fn(&Object) -> StoreResult<Object> + Send + Sync,
{
    fn preconditions(&self) -> Preconditions {
        self.preconditions.clone()
    }

    fn updated_object(&self, _ctx: &RequestContext, current: Option<&Object>) -> StoreResult<Object> {
        match current {
            Some(current) => (self.func)(current),
            None => Err(StoreError::Invalid(
                "a mutator cannot create an absent object".into(),
            )),
        }
    }
}

impl<F> std::fmt::Debug for Mutator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutator")
            .field("preconditions", &self.preconditions)
            .finish_non_exhaustive()
    }
}
