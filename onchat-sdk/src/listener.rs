//! Fan-out of inbound frames to every registered listener.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::envelope::InboundFrame;

type Listener = Arc<dyn Fn(&InboundFrame) + Send + Sync>;

/// Registered listeners, in registration order.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `listener`; it sees every frame dispatched after this returns.
    pub fn register<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            set: Arc::downgrade(self),
            detached: false,
        }
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `frame` to the listeners registered right now.
    ///
    /// The lock is released before any listener runs, so a listener may
    /// subscribe or unsubscribe from inside its callback; that change applies
    /// from the next frame on. A panicking listener is logged and skipped.
    pub fn dispatch(&self, frame: &InboundFrame) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(frame))).is_err() {
                tracing::error!(event = %frame.event(), "listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle returned by [`SocketClient::on_message`](crate::SocketClient::on_message).
///
/// Dropping it unsubscribes. Call [`detach`](Self::detach) to keep the
/// listener for as long as the client lives.
#[must_use = "dropping a Subscription unsubscribes the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    set: Weak<ListenerSet>,
    detached: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    pub fn detach(mut self) {
        self.detached = true;
    }

    fn remove(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.remove(self.id);
        }
        self.set = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.remove();
        }
    }
}
