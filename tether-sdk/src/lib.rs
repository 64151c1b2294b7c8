//! Resilient session core for long-lived chat-bot connections.
//!
//! [`session::Supervisor`] keeps one session alive against a remote server:
//! it opens sessions through a [`transport::Transport`], classifies why they
//! end, and reconnects with bounded exponential backoff
//! ([`backoff::Backoff`]) through a single-slot timer
//! ([`scheduler::ReconnectScheduler`]). [`client::LineTransport`] is a
//! ready-made TCP/TLS transport speaking newline-delimited JSON.

pub mod backoff;
pub mod client;
pub mod command;
pub mod event;
pub mod scheduler;
pub mod session;
pub mod termination;
pub mod transport;
