//! Deferred detach timers
//!
//! One single-shot slot per servo. Arming always supersedes the previous timer
//! for that servo, so at most one live timer exists per id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::types::ServoId;

/// Identifies one arming of a slot
pub type DetachTicket = u64;

#[derive(Debug)]
struct PendingDetach {
    ticket: DetachTicket,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Default)]
pub struct DetachScheduler {
    slots: Arc<Mutex<HashMap<ServoId, PendingDetach>>>,
    tickets: Arc<AtomicU64>,
}

impl DetachScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any timer for `id` and starts a new one running `on_expiry`
    /// after `delay`. Must be called inside a tokio runtime.
    pub fn arm<F, Fut>(&self, id: ServoId, delay: Duration, on_expiry: F) -> DetachTicket
    where
        F: FnOnce(DetachTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = Instant::now() + delay;
        let expiry = on_expiry(ticket);
        let slots = Arc::clone(&self.slots);

        // Spawned under the slot lock so the task cannot clear its slot before it is stored.
        let mut guard = self.slots.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            expiry.await;
            let mut slots = slots.lock();
            if slots.get(&id).is_some_and(|pending| pending.ticket == ticket) {
                slots.remove(&id);
            }
        });
        if let Some(previous) = guard.insert(id, PendingDetach { ticket, handle }) {
            previous.handle.abort();
        }
        debug!(servo_id = id, ticket, ?delay, "detach armed");
        ticket
    }

    /// Cancels the timer for `id`, if any. Returns whether one was pending.
    pub fn cancel(&self, id: ServoId) -> bool {
        match self.slots.lock().remove(&id) {
            Some(pending) => {
                pending.handle.abort();
                debug!(servo_id = id, ticket = pending.ticket, "detach cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        for (_, pending) in drained {
            pending.handle.abort();
        }
    }

    pub fn is_pending(&self, id: ServoId) -> bool {
        self.slots.lock().contains_key(&id)
    }

    /// True while `ticket` is still the live timer for `id`
    pub fn is_current(&self, id: ServoId, ticket: DetachTicket) -> bool {
        self.slots
            .lock()
            .get(&id)
            .is_some_and(|pending| pending.ticket == ticket)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }
}
