//! Operator input parsing.

/// What an operator line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Forward to the server as chat.
    Chat(String),
    /// `q`: leave and exit.
    Quit,
    /// `r`: drop the session and connect again right away.
    Reconnect,
    /// `k`: simulate the server ending the session.
    Kick,
    /// Blank line.
    Empty,
    /// Prefixed text that is not a known command.
    Unknown(String),
}

/// Splits operator lines into chat and control commands.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    prefix: String,
}

impl CommandDispatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse(&self, line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix(self.prefix.as_str()) else {
            return Command::Chat(line.to_string());
        };
        match rest {
            "q" => Command::Quit,
            "r" => Command::Reconnect,
            "k" => Command::Kick,
            other => Command::Unknown(other.to_string()),
        }
    }
}
