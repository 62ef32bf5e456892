use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regstore_types::{Object, RequestContext};
use tracing::{debug, info};

use crate::error::AdmissionError;
use crate::hook::{HookDecision, HookResult, ValidationHook};

// ---------------------------------------------------------------------------
// ChainOutcome
// ---------------------------------------------------------------------------

/// The outcome of running an object through a full chain.
#[derive(Clone, Debug)]
pub struct ChainOutcome {
    /// Results of the hooks that ran, in evaluation order. On rejection the
    /// last entry is the failing hook.
    pub hook_results: Vec<HookResult>,
    /// Total wall-clock time for the chain.
    pub elapsed: Duration,
}

impl ChainOutcome {
    pub fn is_accepted(&self) -> bool {
        self.hook_results.iter().all(|r| r.passed)
    }

    /// The first failure as an error, if any.
    pub fn into_result(self) -> Result<(), AdmissionError> {
        match self.hook_results.into_iter().find(|r| !r.passed) {
            Some(failed) => Err(AdmissionError::Rejected {
                hook: failed.hook_name,
                reason: failed.reason.unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationChain
// ---------------------------------------------------------------------------

/// An ordered list of validation hooks.
///
/// Chains are cheap to clone (hooks are shared) so callers can build one
/// per admission configuration and pass it to every request.
#[derive(Clone, Default)]
pub struct ValidationChain {
    hooks: Vec<Arc<dyn ValidationHook>>,
}

impl ValidationChain {
    /// An empty chain, which accepts every object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::add_hook`].
    pub fn with_hook(mut self, hook: impl ValidationHook + 'static) -> Self {
        self.add_hook(hook);
        self
    }

    /// Append a hook to the end of the chain.
    pub fn add_hook(&mut self, hook: impl ValidationHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// Append an already shared hook.
    pub fn add_shared(&mut self, hook: Arc<dyn ValidationHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the chain in registration order.
    ///
    /// The chain is **fail-fast**: the first failing hook stops evaluation
    /// and later hooks are never invoked.
    pub fn evaluate(
        &self,
        ctx: &RequestContext,
        proposed: &Object,
        prior: Option<&Object>,
    ) -> ChainOutcome {
        let chain_start = Instant::now();
        let mut hook_results = Vec::with_capacity(self.hooks.len());

        for hook in &self.hooks {
            let hook_start = Instant::now();
            let decision = hook.validate(ctx, proposed, prior);
            let elapsed = hook_start.elapsed();

            debug!(
                hook = hook.name(),
                key = %proposed.key(),
                passed = decision.is_pass(),
                "validation hook evaluated"
            );

            match decision {
                HookDecision::Pass => hook_results.push(HookResult {
                    hook_name: hook.name().to_string(),
                    passed: true,
                    reason: None,
                    elapsed,
                }),
                HookDecision::Fail { reason } => {
                    info!(hook = hook.name(), key = %proposed.key(), %reason, "object rejected");
                    hook_results.push(HookResult {
                        hook_name: hook.name().to_string(),
                        passed: false,
                        reason: Some(reason),
                        elapsed,
                    });
                    break;
                }
            }
        }

        ChainOutcome {
            hook_results,
            elapsed: chain_start.elapsed(),
        }
    }

    /// Run the chain and convert a rejection into an error.
    pub fn check(
        &self,
        ctx: &RequestContext,
        proposed: &Object,
        prior: Option<&Object>,
    ) -> Result<(), AdmissionError> {
        self.evaluate(ctx, proposed, prior).into_result()
    }
}

impl fmt::Debug for ValidationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("ValidationChain").field("hooks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hook::hook_fn;
    use regstore_types::{ObjectMeta, TypeMeta};

    fn object(name: &str) -> Object {
        Object::new(
            TypeMeta::new("v1", "Thing"),
            ObjectMeta::namespaced("default", name),
            serde_json::json!({ "replicas": 1 }),
        )
    }

    fn counting(name: &'static str, calls: Arc<AtomicUsize>, pass: bool) -> impl ValidationHook {
        hook_fn(name, move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            if pass {
                HookDecision::Pass
            } else {
                HookDecision::fail(format!("{name} says no"))
            }
        })
    }

    #[test]
    fn empty_chain_accepts() {
        let outcome = ValidationChain::new().evaluate(&RequestContext::new(), &object("a"), None);
        assert!(outcome.is_accepted());
        assert!(outcome.hook_results.is_empty());
    }

    #[test]
    fn all_passing_hooks_run_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = ValidationChain::new();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            chain.add_hook(hook_fn(name, move |_, _, _| {
                order.lock().unwrap().push(name);
                HookDecision::Pass
            }));
        }

        let outcome = chain.evaluate(&RequestContext::new(), &object("a"), None);
        assert!(outcome.is_accepted());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        let names: Vec<&str> = outcome.hook_results.iter().map(|r| r.hook_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn chain_short_circuits_on_first_failure() {
        let calls = [
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        ];
        let chain = ValidationChain::new()
            .with_hook(counting("one", Arc::clone(&calls[0]), true))
            .with_hook(counting("two", Arc::clone(&calls[1]), false))
            .with_hook(counting("three", Arc::clone(&calls[2]), true));

        let outcome = chain.evaluate(&RequestContext::new(), &object("a"), None);
        assert!(!outcome.is_accepted());
        assert_eq!(outcome.hook_results.len(), 2);
        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 1);
        assert_eq!(calls[2].load(Ordering::SeqCst), 0);

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err, AdmissionError::rejected("two", "two says no"));
    }

    #[test]
    fn update_hooks_see_prior_object() {
        let chain = ValidationChain::new().with_hook(hook_fn("immutable-replicas", |_, new, old| {
            match old {
                Some(old) if old.spec["replicas"] != new.spec["replicas"] => {
                    HookDecision::fail("replicas is immutable")
                }
                _ => HookDecision::Pass,
            }
        }));

        let old = object("a");
        let mut new = old.clone();
        new.spec = serde_json::json!({ "replicas": 2 });

        let ctx = RequestContext::new();
        assert!(chain.check(&ctx, &new, None).is_ok());
        assert!(chain.check(&ctx, &old, Some(&old)).is_ok());
        let err = chain.check(&ctx, &new, Some(&old)).unwrap_err();
        assert_eq!(err.hook(), "immutable-replicas");
        assert_eq!(err.reason(), "replicas is immutable");
    }

    #[test]
    fn hooks_can_read_request_namespace() {
        let chain = ValidationChain::new().with_hook(hook_fn("same-namespace", |ctx, obj, _| {
            if ctx.namespace() == obj.metadata.namespace.as_deref() {
                HookDecision::Pass
            } else {
                HookDecision::fail("namespace mismatch")
            }
        }));
        assert!(chain
            .check(&RequestContext::with_namespace("default"), &object("a"), None)
            .is_ok());
        assert!(chain
            .check(&RequestContext::with_namespace("other"), &object("a"), None)
            .is_err());
    }

    #[test]
    fn cloned_chains_share_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ValidationChain::new().with_hook(counting("c", Arc::clone(&calls), true));
        let copy = chain.clone();
        chain.check(&RequestContext::new(), &object("a"), None).unwrap();
        copy.check(&RequestContext::new(), &object("a"), None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(format!("{copy:?}"), "ValidationChain { hooks: [\"c\"] }");
    }
}
