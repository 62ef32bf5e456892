use std::fmt;
use std::time::Duration;

use regstore_types::{Object, RequestContext};

// ---------------------------------------------------------------------------
// HookDecision
// ---------------------------------------------------------------------------

/// The outcome of a single hook evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    /// The object is acceptable to this hook; continue with the next one.
    Pass,
    /// The object is rejected.
    Fail { reason: String },
}

impl HookDecision {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

// ---------------------------------------------------------------------------
// HookResult
// ---------------------------------------------------------------------------

/// Recorded result of one hook that ran.
#[derive(Clone, Debug)]
pub struct HookResult {
    pub hook_name: String,
    pub passed: bool,
    /// Populated on failure.
    pub reason: Option<String>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// ValidationHook trait
// ---------------------------------------------------------------------------

/// A single admission check.
///
/// `prior` is `None` on create and the currently stored object on update.
/// Hooks must be pure functions of their inputs: the store may call them
/// from any thread, in the order they appear in the chain, exactly once per
/// request.
pub trait ValidationHook: Send + Sync {
    /// Human-readable name, reported on rejection.
    fn name(&self) -> &str;

    fn validate(
        &self,
        ctx: &RequestContext,
        proposed: &Object,
        prior: Option<&Object>,
    ) -> HookDecision;
}

/// A [`ValidationHook`] backed by a closure. Build one with [`hook_fn`].
pub struct FnHook<F> {
    name: String,
    func: F,
}

impl<F> ValidationHook for FnHook<F>
where
    F: Fn(&RequestContext, &Object, Option<&Object>) -> HookDecision + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(
        &self,
        ctx: &RequestContext,
        proposed: &Object,
        prior: Option<&Object>,
    ) -> HookDecision {
        (self.func)(ctx, proposed, prior)
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").field("name", &self.name).finish()
    }
}

/// Wrap a closure as a named hook.
pub fn hook_fn<F>(name: impl Into<String>, func: F) -> FnHook<F>
where
    F: Fn(&RequestContext, &Object, Option<&Object>) -> HookDecision + Send + Sync,
{
    FnHook {
        name: name.into(),
        func,
    }
}
