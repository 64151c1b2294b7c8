//! Event loop wiring the supervisor to the terminal.

use std::io::{self, IsTerminal, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use tether_sdk::client::LineTransport;
use tether_sdk::command::{Command, CommandDispatcher};
use tether_sdk::event;
use tether_sdk::session::{Phase, Supervisor};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::config::Resolved;
use crate::console::{ConsoleSink, EditorAction};
use crate::input::{self, INPUT_CHANNEL_CAPACITY, Input};

/// How long a quitting session may take to close before it is dropped.
pub const QUIT_GRACE: Duration = Duration::from_secs(2);

type App = Supervisor<LineTransport, ConsoleSink<Stdout>>;

/// Restores cooked mode on drop, including on early return.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal");
        }
    }
}

/// Run until the supervisor terminates; returns the process exit code.
pub async fn run(settings: Resolved) -> Result<i32> {
    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    let _raw = if interactive { Some(RawModeGuard::enable()?) } else { None };

    let (input_tx, mut input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    input::spawn_reader(interactive, input_tx).context("failed to start input reader")?;

    let (events_tx, mut events_rx) = event::channel();
    let sink = ConsoleSink::new(io::stdout(), settings.prompt.clone(), interactive);
    let dispatcher = CommandDispatcher::new(settings.prefix.clone());
    let mut app: App = Supervisor::new(
        LineTransport::new(),
        sink,
        settings.target.clone(),
        settings.backoff,
        events_tx,
    );

    tracing::info!(
        addr = %settings.target.addr(),
        username = %settings.target.username,
        interactive,
        "Starting tether"
    );
    app.start();

    let mut input_open = true;
    let mut quit_deadline: Option<Instant> = None;

    loop {
        if let Some(code) = app.exit_code() {
            tracing::info!(code, "Exiting");
            return Ok(code);
        }
        if app.phase() == Phase::Disconnecting && quit_deadline.is_none() {
            quit_deadline = Some(Instant::now() + QUIT_GRACE);
        }
        let deadline = quit_deadline;

        tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => app.handle_event(event),
                // The supervisor holds a sender, so this only happens on teardown.
                None => return Ok(app.exit_code().unwrap_or(0)),
            },
            input = input_rx.recv(), if input_open => match input {
                Some(input) => handle_input(&mut app, &dispatcher, input),
                None => {
                    input_open = false;
                    app.apply(Command::Quit);
                }
            },
            Ok(()) = tokio::signal::ctrl_c() => app.apply(Command::Quit),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                app.abandon_quit();
            }
        }
    }
}

fn handle_input(app: &mut App, dispatcher: &CommandDispatcher, input: Input) {
    match input {
        Input::Key(key) => match app.output_mut().handle_key(key) {
            Some(EditorAction::Submit(line)) => app.apply(dispatcher.parse(&line)),
            Some(EditorAction::Interrupt) => app.apply(Command::Quit),
            None => {}
        },
        Input::Line(line) => app.apply(dispatcher.parse(&line)),
        Input::Closed => app.apply(Command::Quit),
    }
}
