//! Foundation types for regstore.
//!
//! This crate provides the object model shared by the generic store, the
//! watch broadcaster, and the typed registries built on top of them. Every
//! other regstore crate depends on `regstore-types`.
//!
//! # Key Types
//!
//! - [`Object`] -- Type-erased resource object handled by the generic store
//! - [`Resource`] -- Trait implemented by concrete resource kinds
//! - [`ObjectKey`] -- `(namespace, name)` identity of an object
//! - [`ResourceVersion`] -- Opaque version token issued by the store clock
//! - [`LabelSelector`] / [`FieldSelector`] -- List and watch filters
//! - [`RequestContext`] -- Cancellation, deadline, and request namespace

pub mod context;
pub mod error;
pub mod key;
pub mod meta;
pub mod object;
pub mod options;
pub mod selector;
pub mod version;

pub use context::{ContextError, RequestContext};
pub use error::TypeError;
pub use key::ObjectKey;
pub use meta::{ObjectMeta, TypeMeta};
pub use object::{Object, ObjectList, Resource};
pub use options::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, PreconditionMismatch, Preconditions,
    UpdateOptions,
};
pub use selector::{FieldRequirement, FieldSelector, LabelSelector, Operator, Requirement};
pub use version::ResourceVersion;
