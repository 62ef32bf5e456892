use regstore_types::Object;

/// Decides which objects a watch session is interested in.
///
/// The store compiles list options (namespace, label and field selectors)
/// into one of these; the broadcaster only ever calls [`Self::matches`].
pub trait EventFilter: Send + Sync {
    fn matches(&self, object: &Object) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&Object) -> bool + Send + Sync,
{
    fn matches(&self, object: &Object) -> bool {
        self(object)
    }
}

/// Filter that accepts every object.
#[derive(Clone, Copy, Debug, Default)]
pub struct Everything;

impl EventFilter for Everything {
    fn matches(&self, _object: &Object) -> bool {
        true
    }
}
