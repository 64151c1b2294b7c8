//! Session lifecycle supervisor.
//!
//! The [`Supervisor`] owns the current session (if any), the reconnect
//! bookkeeping and the reconnect timer. All mutation goes through
//! [`Supervisor::handle_event`] and [`Supervisor::apply`], which the event
//! loop calls one at a time; nothing here blocks or awaits.
//!
//! ```text
//! Idle ──start──▶ Connecting ──loggedIn──▶ LoggedIn ──spawned──▶ Active
//!                     ▲                                            │
//!                     │ timer                               ended / kicked
//!                     │                                            ▼
//!               AwaitingReconnect ◀────── classify + backoff ──────┘
//! ```
//!
//! Operator `quit` moves any phase to `Disconnecting` and then
//! `Terminated(0)`; a ban moves straight to `Terminated(1)`.

use std::time::Duration;

use crate::backoff::{Backoff, ReconnectState};
use crate::command::Command;
use crate::event::{Event, EventSender, SessionEvent, SessionId};
use crate::scheduler::ReconnectScheduler;
use crate::termination::Termination;
use crate::transport::{ConnectTarget, SessionHandle, Transport};

/// Exit status after an operator quit.
pub const EXIT_QUIT: i32 = 0;
/// Exit status after a ban.
pub const EXIT_BANNED: i32 = 1;

/// Reason handed to the transport when the operator simulates a kick.
pub const SIMULATED_KICK_REASON: &str = "Simulated kick";

/// Lifecycle phase of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session and no timer armed.
    Idle,
    Connecting,
    LoggedIn,
    Active,
    /// Operator quit in progress; waiting for the session to end.
    Disconnecting,
    AwaitingReconnect,
    /// Terminal; carries the process exit status.
    Terminated(i32),
}

/// How loud a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Text received from the server.
    Chat,
    Info,
    Warn,
    Error,
}

/// Operator-facing output surface.
pub trait OutputSink {
    /// Write one notification without corrupting a partially typed line.
    fn emit(&mut self, severity: Severity, message: &str);

    /// Show the input prompt from now on.
    fn enable_prompt(&mut self);

    /// Redraw the prompt after an operator line was handled.
    fn redraw_prompt(&mut self);

    /// Stop interactive rendering; later emits are plain log lines.
    fn close(&mut self);
}

struct Current<S> {
    id: SessionId,
    handle: S,
    /// First classified failure reported before `Ended`.
    cause: Option<Termination>,
}

pub struct Supervisor<T: Transport, O: OutputSink> {
    transport: T,
    output: O,
    target: ConnectTarget,
    policy: Backoff,
    reconnect: ReconnectState,
    scheduler: ReconnectScheduler,
    events: EventSender,
    current: Option<Current<T::Session>>,
    phase: Phase,
    next_session: u64,
}

impl<T: Transport, O: OutputSink> Supervisor<T, O> {
    pub fn new(
        transport: T,
        output: O,
        target: ConnectTarget,
        policy: Backoff,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            output,
            target,
            reconnect: ReconnectState::new(&policy),
            policy,
            scheduler: ReconnectScheduler::new(events.clone()),
            events,
            current: None,
            phase: Phase::Idle,
            next_session: 0,
        }
    }

    /// Open the first session.
    pub fn start(&mut self) {
        if self.phase == Phase::Idle {
            self.connect();
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Session { id, event } => self.handle_session_event(id, event),
            Event::ReconnectDue { timer } => {
                if !self.scheduler.take_fired(timer) {
                    tracing::debug!(?timer, "Ignoring stale reconnect timer");
                    return;
                }
                if self.phase == Phase::AwaitingReconnect {
                    self.connect();
                }
            }
        }
    }

    pub fn handle_session_event(&mut self, id: SessionId, event: SessionEvent) {
        if matches!(self.phase, Phase::Terminated(_)) {
            return;
        }
        let Some(current) = self.current.as_mut().filter(|c| c.id == id) else {
            tracing::debug!(session = %id, ?event, "Dropping event from stale session");
            return;
        };

        match event {
            SessionEvent::LoggedIn => {
                if self.phase == Phase::Connecting {
                    self.phase = Phase::LoggedIn;
                }
                tracing::info!(session = %id, "Logged in");
                self.output.emit(Severity::Info, "Logged in!");
            }
            SessionEvent::Spawned => {
                if matches!(self.phase, Phase::Connecting | Phase::LoggedIn) {
                    self.phase = Phase::Active;
                }
                self.reconnect.reset(&self.policy);
                tracing::info!(session = %id, "Spawned");
                self.output.emit(Severity::Info, "Spawned; session is active");
                self.output.enable_prompt();
            }
            SessionEvent::Message { text } => {
                self.output.emit(Severity::Chat, &text);
            }
            SessionEvent::Kicked { reason } => {
                let termination = Termination::from_kick(&reason);
                tracing::warn!(session = %id, ?termination, "Kicked");
                if termination.is_fatal() {
                    self.banned(termination);
                } else if self.phase != Phase::Disconnecting {
                    current.cause = Some(termination);
                }
            }
            SessionEvent::Error { message } => {
                tracing::warn!(session = %id, error = %message, "Transport error");
                if current.cause.is_none() {
                    current.cause = Some(Termination::TransportError { detail: message });
                }
            }
            SessionEvent::Ended { reason } => {
                let cause = current.cause.take();
                self.current = None;
                if self.phase == Phase::Disconnecting {
                    tracing::info!(session = %id, %reason, "Session closed after quit");
                    self.phase = Phase::Terminated(EXIT_QUIT);
                    return;
                }
                self.terminated(cause.unwrap_or(Termination::GracefulEnd { reason }));
            }
        }
    }

    /// Apply one parsed operator command.
    pub fn apply(&mut self, command: Command) {
        if matches!(self.phase, Phase::Terminated(_)) {
            return;
        }
        match command {
            Command::Chat(text) => {
                if self.phase != Phase::Disconnecting {
                    if let Some(current) = &self.current {
                        current.handle.send(&text);
                    }
                }
                self.output.redraw_prompt();
            }
            Command::Quit => self.quit(),
            Command::Reconnect => self.manual_reconnect(),
            Command::Kick => self.simulate_kick(),
            Command::Empty | Command::Unknown(_) => self.output.redraw_prompt(),
        }
    }

    /// Give up waiting for a quitting session to close.
    pub fn abandon_quit(&mut self) {
        if self.phase != Phase::Disconnecting {
            return;
        }
        if let Some(current) = self.current.take() {
            tracing::warn!(session = %current.id, "Session did not close in time; dropping it");
            current.handle.force_end("quit");
        }
        self.phase = Phase::Terminated(EXIT_QUIT);
    }

    fn connect(&mut self) {
        self.scheduler.cancel();
        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.phase = Phase::Connecting;

        tracing::info!(session = %id, addr = %self.target.addr(), username = %self.target.username, "Connecting");
        self.output.emit(
            Severity::Info,
            &format!("Connecting to {} as {}...", self.target.addr(), self.target.username),
        );

        match self.transport.open(&self.target, id, self.events.clone()) {
            Ok(handle) => {
                self.current = Some(Current { id, handle, cause: None });
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "Failed to open session");
                self.current = None;
                self.terminated(Termination::TransportError { detail: e.to_string() });
            }
        }
    }

    /// Non-fatal termination: report it and schedule the next attempt.
    fn terminated(&mut self, termination: Termination) {
        let severity = match termination {
            Termination::GracefulEnd { .. } => Severity::Warn,
            _ => Severity::Error,
        };
        self.output.emit(severity, &termination.describe());

        match self.reconnect.next_attempt(&self.policy) {
            Some(delay) => {
                self.scheduler.arm(delay);
                self.phase = Phase::AwaitingReconnect;
                let attempt = self.reconnect.attempt_count();
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.output.emit(
                    Severity::Warn,
                    &format!(
                        "Reconnecting in {} (attempt {attempt}/{})",
                        format_delay(delay),
                        self.policy.max_attempts()
                    ),
                );
            }
            None => {
                self.phase = Phase::Idle;
                tracing::error!(max_attempts = self.policy.max_attempts(), "Giving up on reconnecting");
                self.output.emit(
                    Severity::Error,
                    &format!(
                        "Max reconnect attempts ({}) reached; reconnect manually to try again",
                        self.policy.max_attempts()
                    ),
                );
            }
        }
    }

    fn banned(&mut self, termination: Termination) {
        tracing::error!(?termination, "Banned; exiting");
        self.output.emit(Severity::Error, &termination.describe());
        if let Some(current) = self.current.take() {
            current.handle.force_end("banned");
        }
        self.scheduler.cancel();
        self.output.close();
        self.phase = Phase::Terminated(EXIT_BANNED);
    }

    fn quit(&mut self) {
        if self.phase == Phase::Disconnecting {
            return;
        }
        self.output.emit(Severity::Info, "Quitting...");
        self.scheduler.cancel();
        self.output.close();
        match &self.current {
            Some(current) => {
                current.handle.quit();
                self.phase = Phase::Disconnecting;
            }
            None => self.phase = Phase::Terminated(EXIT_QUIT),
        }
    }

    /// Bypasses backoff: tear down without classification and connect now.
    /// Attempt count and delay carry over.
    fn manual_reconnect(&mut self) {
        if self.phase == Phase::Disconnecting {
            return;
        }
        self.output.emit(Severity::Info, "Reconnecting...");
        self.scheduler.cancel();
        if let Some(current) = self.current.take() {
            tracing::info!(session = %current.id, "Tearing down session for manual reconnect");
            current.handle.quit();
        }
        self.connect();
    }

    fn simulate_kick(&mut self) {
        if self.phase == Phase::Disconnecting {
            return;
        }
        let Some(current) = &self.current else {
            self.output.redraw_prompt();
            return;
        };
        let id = current.id;
        current.handle.force_end(SIMULATED_KICK_REASON);
        self.handle_session_event(
            id,
            SessionEvent::Ended { reason: SIMULATED_KICK_REASON.to_string() },
        );
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.phase {
            Phase::Terminated(code) => Some(code),
            _ => None,
        }
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current.as_ref().map(|c| c.id)
    }

    pub fn attempt_count(&self) -> u32 {
        self.reconnect.attempt_count()
    }

    pub fn current_delay(&self) -> Duration {
        self.reconnect.current_delay()
    }

    pub fn policy(&self) -> &Backoff {
        &self.policy
    }

    pub fn scheduler(&self) -> &ReconnectScheduler {
        &self.scheduler
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// `5s`, `1.5s`, `250ms`.
pub fn format_delay(delay: Duration) -> String {
    let ms = delay.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}
