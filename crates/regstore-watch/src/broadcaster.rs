use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regstore_types::RequestContext;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::event::{Change, WatchEvent};
use crate::filter::EventFilter;
use crate::session::WatchSession;

/// State shared between a session's registry entry and its consumer.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) capacity: usize,
    pub(crate) overflowed: AtomicBool,
}

/// Registry entry: a filter paired with the sending half of the queue.
struct Subscriber {
    filter: Arc<dyn EventFilter>,
    sender: mpsc::Sender<WatchEvent>,
    shared: Arc<SessionShared>,
}

/// Outcome of offering one event to one session.
enum Delivery {
    Queued,
    Overflowed,
    Closed,
}

impl Subscriber {
    fn offer(&self, event: WatchEvent) -> Delivery {
        match self.sender.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.shared.overflowed.store(true, Ordering::SeqCst);
                Delivery::Overflowed
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

pub(crate) struct BroadcasterInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl BroadcasterInner {
    /// The registry survives a panicking filter: entries are only inserted
    /// or removed whole, so a poisoned map is still consistent.
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn deregister(&self, id: u64) {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(session = id, "watch session deregistered");
        }
    }
}

/// Fan-out of committed changes to watch sessions.
///
/// [`Self::publish`] never blocks on a consumer: each event is offered to
/// each interested session's bounded queue with `try_send`. A session whose
/// queue is full is removed on the spot and marked overflowed; its consumer
/// drains what was already queued, then sees one terminal overflow event.
/// Other sessions are unaffected.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a session that sees changes published from now on.
    pub fn subscribe(
        &self,
        ctx: &RequestContext,
        filter: Arc<dyn EventFilter>,
        capacity: usize,
    ) -> WatchSession {
        self.subscribe_with_backlog(ctx, filter, capacity, std::iter::empty())
    }

    /// Register a session whose queue is first filled from `backlog`.
    ///
    /// The caller must ensure no change is published between the end of the
    /// backlog and this call returning (the store holds its commit section
    /// across both), so the session observes an unbroken sequence.
    pub fn subscribe_with_backlog<'a>(
        &self,
        ctx: &RequestContext,
        filter: Arc<dyn EventFilter>,
        capacity: usize,
        backlog: impl IntoIterator<Item = &'a Change>,
    ) -> WatchSession {
        let capacity = capacity.max(1);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(capacity);
        let shared = Arc::new(SessionShared {
            capacity,
            overflowed: AtomicBool::new(false),
        });
        let subscriber = Subscriber {
            filter,
            sender,
            shared: Arc::clone(&shared),
        };

        let mut live = true;
        let mut replayed = 0usize;
        for change in backlog {
            if let Some(event) = change.project(subscriber.filter.as_ref()) {
                match subscriber.offer(event) {
                    Delivery::Queued => replayed += 1,
                    Delivery::Overflowed | Delivery::Closed => {
                        warn!(session = id, capacity, "watch backlog exceeds queue capacity");
                        live = false;
                        break;
                    }
                }
            }
        }

        if live {
            self.inner.subscribers().insert(id, subscriber);
        }
        debug!(session = id, capacity, replayed, live, "watch session registered");

        WatchSession::new(id, receiver, shared, Arc::downgrade(&self.inner), ctx.child())
    }

    /// Offer a committed change to every session. Returns the number of
    /// sessions that received an event.
    ///
    /// Callers publish in commit order; each session's queue preserves it.
    pub fn publish(&self, change: &Change) -> usize {
        let mut subs = self.inner.subscribers();

        let mut delivered = 0usize;
        subs.retain(|id, sub| {
            let Some(event) = change.project(sub.filter.as_ref()) else {
                return !sub.sender.is_closed();
            };
            match sub.offer(event) {
                Delivery::Queued => {
                    delivered += 1;
                    true
                }
                Delivery::Overflowed => {
                    warn!(
                        session = *id,
                        capacity = sub.shared.capacity,
                        revision = %change.revision,
                        "watch session overflowed; terminating"
                    );
                    false
                }
                Delivery::Closed => {
                    debug!(session = *id, "pruning closed watch session");
                    false
                }
            }
        });
        delivered
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Drop every session. Consumers drain their queues and then end.
    pub fn close_all(&self) {
        self.inner.subscribers().clear();
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("sessions", &self.session_count())
            .finish()
    }
}
