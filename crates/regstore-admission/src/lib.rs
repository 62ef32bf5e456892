//! Validation hook chains for regstore.
//!
//! The admission layer supplies ordered lists of validation hooks with every
//! create and update call. The store runs the chain after computing the
//! proposed object and before any mutation; the first failing hook rejects
//! the request and no later hook runs.
//!
//! The store treats hooks as opaque: it never inspects what they check, and
//! it never re-runs a chain on its own.
//!
//! # Quick Start
//!
//! ```rust
//! use regstore_admission::{hook_fn, HookDecision, ValidationChain};
//! use regstore_types::{Object, ObjectMeta, RequestContext, TypeMeta};
//!
//! let chain = ValidationChain::new().with_hook(hook_fn("non-empty-spec", |_ctx, proposed, _prior| {
//!     if proposed.spec.is_null() {
//!         HookDecision::fail("spec must be set")
//!     } else {
//!         HookDecision::Pass
//!     }
//! }));
//!
//! let obj = Object::new(
//!     TypeMeta::new("v1", "Thing"),
//!     ObjectMeta::new("a"),
//!     serde_json::Value::Null,
//! );
//! let outcome = chain.evaluate(&RequestContext::new(), &obj, None);
//! assert!(!outcome.is_accepted());
//! ```

pub mod chain;
pub mod error;
pub mod hook;

pub use chain::{ChainOutcome, ValidationChain};
pub use error::AdmissionError;
pub use hook::{hook_fn, FnHook, HookDecision, HookResult, ValidationHook};
