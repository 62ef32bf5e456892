use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use regstore_types::RequestContext;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::broadcaster::{BroadcasterInner, SessionShared};
use crate::event::{WatchError, WatchEvent};

/// Consumer side of a watch.
///
/// A lazy, non-restartable sequence of events in commit order. The session
/// ends (yields `None`) when its context is cancelled or times out, when
/// [`Self::stop`] is called, or after the terminal overflow event. Ending,
/// stopping, or dropping the session deregisters it from the broadcaster and
/// releases its queue.
pub struct WatchSession {
    id: u64,
    receiver: mpsc::Receiver<WatchEvent>,
    shared: Arc<SessionShared>,
    broadcaster: Weak<BroadcasterInner>,
    ctx: RequestContext,
    finished: bool,
}

impl WatchSession {
    pub(crate) fn new(
        id: u64,
        receiver: mpsc::Receiver<WatchEvent>,
        shared: Arc<SessionShared>,
        broadcaster: Weak<BroadcasterInner>,
        ctx: RequestContext,
    ) -> Self {
        Self {
            id,
            receiver,
            shared,
            broadcaster,
            ctx,
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue capacity fixed when the session was created.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// `true` once the session has ended and will yield no more events.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        if self.finished {
            return None;
        }
        let received = tokio::select! {
            biased;
            reason = self.ctx.done() => Err(reason),
            event = self.receiver.recv() => Ok(event),
        };
        match received {
            Ok(Some(event)) => Some(event),
            Ok(None) => self.terminate(),
            Err(reason) => {
                debug!(session = self.id, %reason, "watch context done");
                self.stop();
                None
            }
        }
    }

    /// Take the next queued event without waiting.
    ///
    /// `None` means either nothing is queued yet or the session has ended;
    /// tell them apart with [`Self::is_finished`].
    pub fn try_next(&mut self) -> Option<WatchEvent> {
        if self.finished {
            return None;
        }
        if let Err(reason) = self.ctx.check() {
            debug!(session = self.id, %reason, "watch context done");
            self.stop();
            return None;
        }
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.terminate(),
        }
    }

    /// Cancel the session. Queued events are discarded.
    pub fn stop(&mut self) {
        self.finished = true;
        self.receiver.close();
        self.deregister();
    }

    /// The sender side is gone: either the broadcaster dropped us on
    /// overflow, or it shut down.
    fn terminate(&mut self) -> Option<WatchEvent> {
        self.finished = true;
        self.deregister();
        if self.shared.overflowed.swap(false, Ordering::SeqCst) {
            Some(WatchEvent::Error(WatchError::overflow(self.shared.capacity)))
        } else {
            None
        }
    }

    fn deregister(&self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.deregister(self.id);
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("capacity", &self.shared.capacity)
            .field("finished", &self.finished)
            .finish()
    }
}
