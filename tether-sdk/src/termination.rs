//! Classification of why a session ended.
//!
//! Kick reasons arrive as structured JSON: a plain string, a chat
//! component (`text` / `translate` / `extra`), or the NBT-style
//! `{ "type": ..., "value": ... }` encoding newer servers use. Everything is
//! normalised to chat-component shape before it is inspected.

use serde_json::{Map, Value};

/// Translation key the server uses for a permanent ban.
pub const BAN_TRANSLATE_KEY: &str = "multiplayer.disconnect.banned";

/// Why the current session terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Permanent ban. Fatal: the process exits non-zero.
    Banned { reason: String },
    KickedWithReason { reason: String },
    KickedNoReason,
    /// Connectivity failure, protocol error, failed open.
    TransportError { detail: String },
    /// The remote closed the session without a kick.
    GracefulEnd { reason: String },
}

impl Termination {
    pub fn from_kick(reason: &Value) -> Self {
        let normalized = normalize(reason);
        let text = flatten(&normalized);
        if is_ban(&normalized) {
            Termination::Banned { reason: text }
        } else if text.trim().is_empty() {
            Termination::KickedNoReason
        } else {
            Termination::KickedWithReason { reason: text }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Termination::Banned { .. })
    }

    /// Short human-readable notice for the operator.
    pub fn describe(&self) -> String {
        match self {
            Termination::Banned { reason } if reason.is_empty() => "Banned from the server".to_string(),
            Termination::Banned { reason } => format!("Banned from the server: {reason}"),
            Termination::KickedWithReason { reason } => format!("Kicked: {reason}"),
            Termination::KickedNoReason => "Kicked with no reason given".to_string(),
            Termination::TransportError { detail } => format!("Connection error: {detail}"),
            Termination::GracefulEnd { reason } => format!("Disconnected: {reason}"),
        }
    }
}

/// Whether a (possibly NBT-encoded) kick reason is a ban.
pub fn is_ban(reason: &Value) -> bool {
    let normalized = normalize(reason);
    translate_keys(&normalized)
        .iter()
        .any(|key| key == BAN_TRANSLATE_KEY)
}

/// Render a (possibly NBT-encoded) chat component as plain text.
pub fn render(reason: &Value) -> String {
    flatten(&normalize(reason))
}

/// Convert NBT-style typed values to plain JSON and parse JSON carried in
/// strings.
fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                    return normalize(&parsed);
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => normalize_object(map),
        _ => value.clone(),
    }
}

fn normalize_object(map: &Map<String, Value>) -> Value {
    let tag = map.get("type").and_then(Value::as_str);
    match (tag, map.get("value")) {
        (Some("compound"), Some(Value::Object(fields))) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        (Some("list"), Some(inner)) => {
            let element_type = inner.get("type").cloned().unwrap_or(Value::Null);
            let items = match inner.get("value") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        let mut typed = Map::new();
                        typed.insert("type".to_string(), element_type.clone());
                        typed.insert("value".to_string(), item.clone());
                        normalize_object(&typed)
                    })
                    .collect(),
                _ => Vec::new(),
            };
            Value::Array(items)
        }
        // Scalar NBT tag, or a bare `{ "value": ... }` wrapper.
        (Some(_), Some(inner)) if map.len() == 2 => normalize(inner),
        (None, Some(inner)) if map.len() == 1 => normalize(inner),
        _ => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
    }
}

fn translate_keys(component: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    collect_translate_keys(component, &mut keys);
    keys
}

fn collect_translate_keys(component: &Value, keys: &mut Vec<String>) {
    match component {
        Value::Array(items) => items.iter().for_each(|c| collect_translate_keys(c, keys)),
        Value::Object(map) => {
            if let Some(key) = map.get("translate").and_then(Value::as_str) {
                keys.push(key.to_string());
            }
            if let Some(extra) = map.get("extra") {
                collect_translate_keys(extra, keys);
            }
        }
        _ => {}
    }
}

fn flatten(component: &Value) -> String {
    match component {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(flatten).collect(),
        Value::Object(map) => {
            let mut out = match map.get("text") {
                Some(text) => flatten(text),
                None => String::new(),
            };
            if out.is_empty() {
                // NBT encodes a bare text component under the empty key.
                if let Some(text) = map.get("") {
                    out = flatten(text);
                }
            }
            if let Some(key) = map.get("translate").and_then(Value::as_str) {
                out.push_str(key);
                if let Some(Value::Array(args)) = map.get("with") {
                    let args: Vec<String> = args.iter().map(flatten).collect();
                    if !args.is_empty() {
                        out.push_str(&format!(" ({})", args.join(", ")));
                    }
                }
            }
            if let Some(extra) = map.get("extra") {
                out.push_str(&flatten(extra));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compound_ban_reason_is_fatal() {
        let reason = json!({
            "type": "compound",
            "value": { "translate": { "value": "multiplayer.disconnect.banned" } }
        });
        let t = Termination::from_kick(&reason);
        assert!(t.is_fatal(), "{t:?}");
    }

    #[test]
    fn typed_compound_ban_reason_is_fatal() {
        let reason = json!({
            "type": "compound",
            "value": {
                "translate": { "type": "string", "value": "multiplayer.disconnect.banned" },
                "with": {
                    "type": "list",
                    "value": { "type": "string", "value": ["griefing"] }
                }
            }
        });
        assert!(is_ban(&reason));
        assert_eq!(
            Termination::from_kick(&reason),
            Termination::Banned { reason: "multiplayer.disconnect.banned (griefing)".to_string() }
        );
    }

    #[test]
    fn chat_component_ban_in_string() {
        let reason = json!("{\"translate\":\"multiplayer.disconnect.banned\"}");
        assert!(is_ban(&reason));
    }

    #[test]
    fn plain_text_kick_keeps_reason() {
        let t = Termination::from_kick(&json!("Server restarting"));
        assert_eq!(t, Termination::KickedWithReason { reason: "Server restarting".to_string() });
        assert_eq!(t.describe(), "Kicked: Server restarting");
    }

    #[test]
    fn empty_reasons_are_reasonless() {
        for reason in [json!(""), json!(null), json!({"text": ""}), json!("   ")] {
            assert_eq!(Termination::from_kick(&reason), Termination::KickedNoReason, "{reason}");
        }
    }

    #[test]
    fn component_extra_is_concatenated() {
        let reason = json!({
            "text": "You were kicked: ",
            "extra": [{ "text": "idle" }, " too long"]
        });
        assert_eq!(render(&reason), "You were kicked: idle too long");
    }

    #[test]
    fn nbt_text_compound_renders() {
        let reason = json!({
            "type": "compound",
            "value": {
                "text": { "type": "string", "value": "Flying is not enabled" }
            }
        });
        assert_eq!(render(&reason), "Flying is not enabled");
        assert!(!is_ban(&reason));
    }

    #[test]
    fn other_translate_keys_are_not_bans() {
        let reason = json!({ "translate": "multiplayer.disconnect.kicked" });
        assert_eq!(
            Termination::from_kick(&reason),
            Termination::KickedWithReason { reason: "multiplayer.disconnect.kicked".to_string() }
        );
    }

    #[test]
    fn only_bans_are_fatal() {
        assert!(!Termination::KickedNoReason.is_fatal());
        assert!(!Termination::GracefulEnd { reason: "bye".into() }.is_fatal());
        assert!(!Termination::TransportError { detail: "reset".into() }.is_fatal());
    }
}
