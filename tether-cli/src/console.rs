//! Operator console: line editor plus the terminal output sink.
//!
//! Output and input share one terminal row. Every notification clears the
//! row, prints the message above it, then redraws the prompt and whatever
//! the operator had typed so far.

use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::queue;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use tether_sdk::session::{OutputSink, Severity};

/// Single-line input buffer with a cursor.
#[derive(Debug, Default, Clone)]
pub struct LineEditor {
    chars: Vec<char>,
    cursor: usize,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.chars.len();
    }

    /// Ctrl-U: delete everything before the cursor.
    pub fn kill_to_start(&mut self) {
        self.chars.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Ctrl-W: delete the word before the cursor.
    pub fn delete_word(&mut self) {
        let mut start = self.cursor;
        while start > 0 && self.chars[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && !self.chars[start - 1].is_whitespace() {
            start -= 1;
        }
        self.chars.drain(start..self.cursor);
        self.cursor = start;
    }

    /// Take the line and reset the editor.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.chars).into_iter().collect()
    }
}

/// Result of a key press that the caller has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    /// Enter pressed; the trimmed line.
    Submit(String),
    /// Ctrl-C, or Ctrl-D on an empty line.
    Interrupt,
}

/// Terminal-backed [`OutputSink`].
///
/// In interactive mode the terminal is expected to be in raw mode and the
/// sink owns cursor placement on the input row. Otherwise it writes plain
/// timestamped lines and never draws a prompt.
pub struct ConsoleSink<W: Write> {
    out: W,
    prompt: String,
    editor: LineEditor,
    interactive: bool,
    prompt_enabled: bool,
    closed: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, prompt: impl Into<String>, interactive: bool) -> Self {
        Self {
            out,
            prompt: prompt.into(),
            editor: LineEditor::new(),
            interactive,
            prompt_enabled: false,
            closed: false,
        }
    }

    /// Feed one key press into the editor.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<EditorAction> {
        if self.closed {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => {
                let line = self.editor.take();
                self.log_io(|s| s.end_input_row());
                return Some(EditorAction::Submit(line.trim().to_string()));
            }
            KeyCode::Char('c') if ctrl => return Some(EditorAction::Interrupt),
            KeyCode::Char('d') if ctrl => {
                if self.editor.is_empty() {
                    return Some(EditorAction::Interrupt);
                }
                self.editor.delete();
            }
            KeyCode::Char('u') if ctrl => self.editor.kill_to_start(),
            KeyCode::Char('w') if ctrl => self.editor.delete_word(),
            KeyCode::Char('a') if ctrl => self.editor.home(),
            KeyCode::Char('e') if ctrl => self.editor.end(),
            KeyCode::Char(c) if !ctrl => self.editor.insert(c),
            KeyCode::Backspace => self.editor.backspace(),
            KeyCode::Delete => self.editor.delete(),
            KeyCode::Left => self.editor.left(),
            KeyCode::Right => self.editor.right(),
            KeyCode::Home => self.editor.home(),
            KeyCode::End => self.editor.end(),
            _ => return None,
        }
        self.log_io(|s| s.draw_input_row());
        None
    }

    fn newline(&self) -> &'static str {
        // Raw mode does not translate \n.
        if self.interactive { "\r\n" } else { "\n" }
    }

    fn draw_input_row(&mut self) -> io::Result<()> {
        if !self.interactive || self.closed {
            return Ok(());
        }
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        let mut column = self.editor.cursor();
        if self.prompt_enabled {
            queue!(self.out, Print(&self.prompt))?;
            column += self.prompt.chars().count();
        }
        queue!(
            self.out,
            Print(self.editor.text()),
            MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX))
        )?;
        self.out.flush()
    }

    fn end_input_row(&mut self) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        let nl = self.newline();
        queue!(self.out, Print(nl))?;
        self.out.flush()
    }

    fn write_message(&mut self, severity: Severity, message: &str) -> io::Result<()> {
        let text = sanitize_text(message);
        let stamp = now_str();
        let nl = self.newline();
        let styled = self.interactive && !self.closed;

        if styled {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        }
        for line in text.split('\n') {
            queue!(self.out, Print(format!("[{stamp}] ")))?;
            match (severity, styled) {
                (Severity::Warn, true) => queue!(self.out, Print("warning: ".yellow()))?,
                (Severity::Error, true) => queue!(self.out, Print("error: ".red().bold()))?,
                (Severity::Warn, false) => queue!(self.out, Print("warning: "))?,
                (Severity::Error, false) => queue!(self.out, Print("error: "))?,
                (Severity::Chat | Severity::Info, _) => {}
            }
            queue!(self.out, Print(line), Print(nl))?;
        }
        self.out.flush()?;

        if styled {
            self.draw_input_row()?;
        }
        Ok(())
    }

    fn log_io(&mut self, f: impl FnOnce(&mut Self) -> io::Result<()>) {
        if let Err(e) = f(self) {
            tracing::warn!(error = %e, "Console write failed");
        }
    }
}

impl<W: Write> OutputSink for ConsoleSink<W> {
    fn emit(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Chat => tracing::debug!(target: "tether::chat", "{message}"),
            Severity::Info => tracing::info!("{message}"),
            Severity::Warn => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
        self.log_io(|s| s.write_message(severity, message));
    }

    fn enable_prompt(&mut self) {
        if !self.prompt_enabled {
            self.prompt_enabled = true;
            self.log_io(|s| s.draw_input_row());
        }
    }

    fn redraw_prompt(&mut self) {
        self.log_io(|s| s.draw_input_row());
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.interactive {
            self.log_io(|s| {
                queue!(s.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
                s.out.flush()
            });
        }
        self.closed = true;
    }
}

fn now_str() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Strip terminal control characters (ESC sequences, C0/C1 controls) from
/// remote text so it cannot move the cursor or restyle the terminal.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR_LINE: &str = "\x1b[2K";

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn typed(sink: &mut ConsoleSink<Vec<u8>>, text: &str) {
        for c in text.chars() {
            sink.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn output(sink: &mut ConsoleSink<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(&mut sink.out)).unwrap()
    }

    #[test]
    fn editor_cursor_editing() {
        let mut e = LineEditor::new();
        for c in "helo".chars() {
            e.insert(c);
        }
        e.left();
        e.insert('l');
        assert_eq!(e.text(), "hello");
        assert_eq!(e.cursor(), 4);
        e.end();
        e.backspace();
        e.home();
        e.delete();
        assert_eq!(e.text(), "ell");
        e.left();
        e.right();
        e.right();
        assert_eq!(e.cursor(), 2);
    }

    #[test]
    fn editor_kill_and_word_delete() {
        let mut e = LineEditor::new();
        for c in "say hello  world".chars() {
            e.insert(c);
        }
        e.delete_word();
        assert_eq!(e.text(), "say hello  ");
        e.delete_word();
        assert_eq!(e.text(), "say ");
        e.insert('x');
        e.left();
        e.kill_to_start();
        assert_eq!(e.text(), "x");
        assert_eq!(e.cursor(), 0);
    }

    #[test]
    fn enter_submits_trimmed_line_and_clears() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", true);
        typed(&mut sink, "  hello  ");
        assert_eq!(sink.handle_key(key(KeyCode::Enter)), Some(EditorAction::Submit("hello".into())));
        assert!(sink.editor.is_empty());
    }

    #[test]
    fn ctrl_c_and_ctrl_d_interrupt() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", true);
        assert_eq!(sink.handle_key(ctrl('c')), Some(EditorAction::Interrupt));
        assert_eq!(sink.handle_key(ctrl('d')), Some(EditorAction::Interrupt));
        typed(&mut sink, "ab");
        sink.handle_key(key(KeyCode::Home));
        assert_eq!(sink.handle_key(ctrl('d')), None);
        assert_eq!(sink.editor.text(), "b");
    }

    #[test]
    fn emit_preserves_partial_input() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", true);
        sink.enable_prompt();
        typed(&mut sink, "half typ");
        output(&mut sink);

        sink.emit(Severity::Chat, "<alex> hi");
        let out = output(&mut sink);
        assert!(out.starts_with("\x1b[1G\x1b[2K"), "{out:?}");
        let msg = out.find("<alex> hi\r\n").expect("message written");
        let redraw = out.rfind("> half typ").expect("prompt redrawn");
        assert!(redraw > msg);
        assert_eq!(sink.editor.text(), "half typ");
    }

    #[test]
    fn prompt_hidden_until_enabled() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", true);
        sink.emit(Severity::Info, "Connecting");
        assert!(!output(&mut sink).contains("> "));
        sink.enable_prompt();
        assert!(output(&mut sink).ends_with("> \x1b[3G"));
    }

    #[test]
    fn closed_console_writes_plain_lines() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", true);
        sink.enable_prompt();
        typed(&mut sink, "draft");
        sink.close();
        output(&mut sink);

        sink.emit(Severity::Error, "Banned");
        let out = output(&mut sink);
        assert!(out.ends_with("error: Banned\r\n"), "{out:?}");
        assert!(!out.contains(CLEAR_LINE));
        assert!(!out.contains("draft"));
        assert_eq!(sink.handle_key(key(KeyCode::Enter)), None);
    }

    #[test]
    fn non_interactive_output_is_line_oriented() {
        let mut sink = ConsoleSink::new(Vec::new(), "> ", false);
        sink.enable_prompt();
        sink.emit(Severity::Warn, "Disconnected: closed");
        sink.emit(Severity::Chat, "two\nlines");
        sink.redraw_prompt();
        let out = output(&mut sink);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] warning: Disconnected: closed"));
        assert!(lines[1].ends_with("] two"));
        assert!(lines[2].ends_with("] lines"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn sanitize_strips_escape_sequences() {
        assert_eq!(sanitize_text("a\x1b[31mb\x07c\td\ne"), "a[31mbc\td\ne");
    }
}
