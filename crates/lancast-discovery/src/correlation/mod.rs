//! Correlation table: routes a response back to the one caller awaiting it.
//!
//! Each in-flight request owns a single-slot delivery point (a oneshot
//! channel). The dispatcher writes into it at most once; the caller either
//! receives the response or times out and cancels the entry. Whichever side
//! removes the entry first wins the race.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::envelope::Envelope;

/// Receiving half of a pending request's delivery slot.
pub type ResponseWaiter = oneshot::Receiver<Envelope>;

/// Table of in-flight requests keyed by task id.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a delivery slot for `task_id` and return the waiter. Task ids
    /// are caller-generated UUIDs, so at most one live entry exists per id;
    /// re-registering an id replaces (and thereby orphans) the old slot.
    pub fn register(&self, task_id: impl Into<String>) -> ResponseWaiter {
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(task_id.into(), sender);
        receiver
    }

    /// Deliver `envelope` to the waiter registered for `task_id`, removing
    /// the entry. Returns `false` when no entry exists (a late or
    /// unsolicited response, discarded without error).
    pub fn resolve(&self, task_id: &str, envelope: Envelope) -> bool {
        let Some(sender) = self.pending.lock().remove(task_id) else {
            return false;
        };
        // A failed send means the caller dropped its waiter mid-race (its
        // timeout fired); the entry existed, so this datagram was still an
        // awaited response and must not fall through to command dispatch.
        if sender.send(envelope).is_err() {
            debug!(task_id = %task_id, "response arrived after caller gave up");
        }
        true
    }

    /// Remove an entry without delivery. Called on the requester's timeout
    /// path; a `resolve` arriving afterwards finds nothing and reports the
    /// response as unsolicited.
    pub fn cancel(&self, task_id: &str) {
        if self.pending.lock().remove(task_id).is_some() {
            debug!(task_id = %task_id, "pending request cancelled");
        }
    }

    /// Number of in-flight requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no requests are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
