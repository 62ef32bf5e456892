//! Watch fan-out for regstore.
//!
//! The store hands every committed [`Change`] to a [`Broadcaster`], which
//! projects it through each session's filter and enqueues the resulting
//! [`WatchEvent`] without blocking. Every [`WatchSession`] owns a bounded
//! queue; a session whose consumer falls behind is terminated with exactly
//! one [`WatchErrorKind::Overflow`] event and must be re-established by the
//! caller (list, then watch from the list version).

pub mod broadcaster;
pub mod event;
pub mod filter;
pub mod session;

pub use broadcaster::Broadcaster;
pub use event::{Change, ChangeKind, WatchError, WatchErrorKind, WatchEvent};
pub use filter::{EventFilter, Everything};
pub use session::WatchSession;
