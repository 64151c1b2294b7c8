//! Operator input reader.
//!
//! Blocking terminal reads run on a dedicated thread and are forwarded to
//! the event loop over a channel.

use std::io::{self, BufRead};

use crossterm::event::{self, Event as TermEvent, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;

pub const INPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum Input {
    /// Raw key press (interactive terminal).
    Key(KeyEvent),
    /// Whole line (piped stdin).
    Line(String),
    /// Input is gone: EOF or a read error.
    Closed,
}

pub fn spawn_reader(interactive: bool, tx: mpsc::Sender<Input>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("tether-input".to_string())
        .spawn(move || {
            if interactive {
                read_keys(&tx);
            } else {
                read_lines(&tx);
            }
        })?;
    Ok(())
}

fn read_keys(tx: &mpsc::Sender<Input>) {
    loop {
        match event::read() {
            Ok(TermEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                if tx.blocking_send(Input::Key(key)).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Terminal read failed");
                let _ = tx.blocking_send(Input::Closed);
                return;
            }
        }
    }
}

fn read_lines(tx: &mpsc::Sender<Input>) {
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if tx.blocking_send(Input::Line(line)).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    let _ = tx.blocking_send(Input::Closed);
}
