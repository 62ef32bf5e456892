//! Typed registries for regstore.
//!
//! The generic store speaks only [`Object`](regstore_types::Object). A
//! registry puts strong typing around it: [`TypedStorage`] widens typed
//! resources on the way in and narrows results on the way out, passing store
//! errors through untouched. Narrowing cannot fail for correctly wired
//! storage, so a mismatch panics.
//!
//! # Kinds
//!
//! - [`NetworkPolicy`] -- `networking.k8s.io/v1`, namespaced, served through
//!   the [`NetworkPolicyRegistry`] trait

pub mod networkpolicy;
pub mod typed;

pub use networkpolicy::{
    network_policy_storage, new_registry, NetworkPolicy, NetworkPolicyList, NetworkPolicyRegistry,
    NetworkPolicySpec,
};
pub use typed::{ResourceList, TypedEvent, TypedStorage, TypedWatch};
