//! Events fed into the session supervisor.
//!
//! Transport tasks and reconnect timers never touch supervisor state
//! directly: they send an [`Event`] into one channel and the event loop
//! applies them one at a time.

use std::fmt;

use tokio::sync::mpsc;

use crate::scheduler::TimerId;

/// Capacity of the supervisor's inbound event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Identifies one connection attempt. Never reused across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and content events raised by a transport session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Authenticated with the server, not yet in the world.
    LoggedIn,

    /// Fully operational.
    Spawned,

    /// A chat or system line from the server, already rendered to text.
    Message { text: String },

    /// The server kicked us. `reason` is the structured reason as sent.
    Kicked { reason: serde_json::Value },

    /// Connectivity or protocol failure. Always followed by `Ended`.
    Error { message: String },

    /// The session is gone. Last event a session ever raises.
    Ended { reason: String },
}

/// Everything the supervisor reacts to besides operator commands.
#[derive(Debug, Clone)]
pub enum Event {
    Session { id: SessionId, event: SessionEvent },
    ReconnectDue { timer: TimerId },
}

impl Event {
    pub fn session(id: SessionId, event: SessionEvent) -> Self {
        Event::Session { id, event }
    }
}

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create the supervisor's event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
