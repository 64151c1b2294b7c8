//! Capabilities the supervisor needs from a remote session transport.
//!
//! The supervisor never sees the wire format. It asks a [`Transport`] to
//! open a session, receives that session's events through the shared
//! event channel, and drives it through a [`SessionHandle`].

use std::time::Duration;

use crate::event::{EventSender, SessionId};

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    /// Identity presented to the server.
    pub username: String,
    /// Protocol/version hint passed through to the server.
    pub version: String,
    pub tls: bool,
    /// Skip TLS certificate verification (self-signed gateways).
    pub tls_insecure: bool,
    /// Drop the session after this long without inbound traffic.
    pub idle_timeout: Duration,
}

impl Default for ConnectTarget {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
            username: "bot".to_string(),
            version: "1.21.11".to_string(),
            tls: false,
            tls_insecure: false,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

impl ConnectTarget {
    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Failure to even start opening a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid server address {0:?}")]
    InvalidAddress(String),
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Opens sessions. Opening is non-blocking: the returned handle is live
/// immediately and the connection proceeds in the background, reporting
/// progress as [`crate::event::SessionEvent`]s tagged with `id`.
pub trait Transport {
    type Session: SessionHandle;

    fn open(
        &mut self,
        target: &ConnectTarget,
        id: SessionId,
        events: EventSender,
    ) -> Result<Self::Session, ConnectError>;
}

/// Commands accepted by an open session. None of these block.
pub trait SessionHandle {
    /// Send a chat line.
    fn send(&self, text: &str);

    /// Leave gracefully.
    fn quit(&self);

    /// Drop the connection immediately.
    fn force_end(&self, reason: &str);
}
