//! Single-slot reconnect timer.
//!
//! At most one timer is pending at any time. Arming replaces the pending
//! timer; cancelling is idempotent. A fired timer posts
//! [`Event::ReconnectDue`] into the supervisor's channel, tagged with its
//! [`TimerId`] so the supervisor can tell a live fire from one that was
//! cancelled after it had already been queued.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::event::{Event, EventSender};

/// Identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Pending {
    id: TimerId,
    delay: Duration,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct ReconnectScheduler {
    events: EventSender,
    pending: Option<Pending>,
    next_id: u64,
}

impl ReconnectScheduler {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            pending: None,
            next_id: 0,
        }
    }

    /// Schedule a reconnect after `delay`, cancelling any pending one first.
    pub fn arm(&mut self, delay: Duration) -> TimerId {
        self.cancel();

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ReconnectDue { timer: id }).await;
        });
        tracing::debug!(timer = id.0, delay_ms = delay.as_millis() as u64, "Reconnect timer armed");

        self.pending = Some(Pending { id, delay, task });
        id
    }

    /// Prevent the pending timer from firing. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                tracing::debug!(timer = pending.id.0, "Reconnect timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Consume a fire notification. Returns `true` only if `id` is the
    /// pending timer, which is then cleared.
    pub fn take_fired(&mut self, id: TimerId) -> bool {
        if self.pending_id() != Some(id) {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_id(&self) -> Option<TimerId> {
        self.pending.as_ref().map(|p| p.id)
    }

    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.delay)
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
