//! Generic object store for regstore.
//!
//! A [`GenericStore`] serves one resource kind, described by a
//! [`ResourceSchema`], over a pluggable [`Backend`]. It never interprets an
//! object's `spec` beyond resolving selectable fields; typed access lives in
//! the registry layer above it.
//!
//! # Guarantees
//!
//! 1. Mutations of one key are atomic. A write against a stale version is a
//!    [`StoreError::Conflict`]; nothing is merged.
//! 2. Every committed mutation gets a fresh version from one backend-wide
//!    clock, so versions order all changes, across keys and kinds.
//! 3. Validation chains run before any mutation and are never retried.
//! 4. Lists paginate over one snapshot: every page of a continued list has
//!    the first page's version.
//! 5. Watches deliver committed changes in commit order, resuming strictly
//!    after a given version from retained history.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] keeps objects in a `BTreeMap` and the most recent
//!   `history_capacity` changes for watch resume and continued lists.

pub mod backend;
pub mod config;
pub mod continuation;
pub mod error;
mod locks;
pub mod memory;
pub mod schema;
pub mod store;
pub mod traits;
pub mod update;

pub use backend::{Backend, Mutation, Precondition, Snapshot};
pub use config::StoreConfig;
pub use continuation::ContinueToken;
pub use error::{BackendError, BackendResult, ConfigError, StoreError, StoreResult};
pub use memory::InMemoryBackend;
pub use schema::{ResourceSchema, SelectionPredicate, FIELD_NAME, FIELD_NAMESPACE};
pub use store::GenericStore;
pub use traits::StandardStorage;
pub use update::{Mutator, Replacement, UpdatedObjectInfo};
