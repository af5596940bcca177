//! Self-echo suppression.
//!
//! Every event the bridge posts is eventually observed again by a receive
//! loop on the side it was posted to. The suppresser remembers the ids of
//! bridge-originated events so those loops can drop their reflections.
//!
//! The canonical event id is only known once the server acknowledges a send,
//! while the receive loop may already hold a batch containing that event.
//! Senders therefore bracket each send with [`EchoSuppresser::start_sending`]
//! and receive loops call [`EchoSuppresser::wait`] before filtering a batch,
//! which stalls them until every in-flight send has registered or failed.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// Registry of bridge-originated event ids plus an in-flight send barrier.
#[derive(Debug)]
pub struct EchoSuppresser {
    sent: RwLock<SentEvents>,
    in_flight: watch::Sender<usize>,
    retention: Option<Duration>,
}

#[derive(Debug, Default)]
struct SentEvents {
    ids: HashSet<String>,
    /// Insertion order, oldest first. Only consulted when a retention window is set.
    order: VecDeque<(Instant, String)>,
}

impl EchoSuppresser {
    /// Create a suppresser that never forgets a sent event.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a suppresser that forgets sent events older than `retention`.
    ///
    /// The window must exceed the longest plausible delay between a send and
    /// its reflection, otherwise late echoes will be relayed.
    pub fn with_retention(retention: Duration) -> Self {
        Self::build(Some(retention))
    }

    fn build(retention: Option<Duration>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            sent: RwLock::new(SentEvents::default()),
            in_flight,
            retention,
        }
    }

    /// Mark a send as in flight until the returned guard is dropped.
    pub fn start_sending(&self) -> SendingGuard<'_> {
        self.in_flight.send_modify(|count| *count += 1);
        SendingGuard { suppresser: self }
    }

    fn done_sending(&self) {
        self.in_flight
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Number of sends currently in flight.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until no send is in flight.
    pub async fn wait(&self) {
        let pending = self.in_flight();
        if pending == 0 {
            return;
        }
        debug!(pending, "Waiting for in-flight sends");
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Record that the bridge itself produced `event_id`.
    pub fn sent(&self, event_id: &str) {
        let mut sent = self.sent.write();
        if !sent.ids.insert(event_id.to_string()) {
            return;
        }

        if let Some(retention) = self.retention {
            let now = Instant::now();
            sent.order.push_back((now, event_id.to_string()));
            while let Some((at, _)) = sent.order.front() {
                if now.duration_since(*at) <= retention {
                    break;
                }
                if let Some((_, expired)) = sent.order.pop_front() {
                    sent.ids.remove(&expired);
                }
            }
        }
        debug!(event_id, "Recorded bridge-originated event");
    }

    /// Whether `event_id` was produced by the bridge.
    pub fn was_sent(&self, event_id: &str) -> bool {
        self.sent.read().ids.contains(event_id)
    }
}

impl Default for EchoSuppresser {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one send counted as in flight; dropping it completes the send.
#[must_use = "the send is only counted while the guard is alive"]
#[derive(Debug)]
pub struct SendingGuard<'a> {
    suppresser: &'a EchoSuppresser,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.suppresser.done_sending();
    }
}
