//! Structured records parsed from Claude session JSONL lines.
//!
//! Only the top-level fields the pipeline needs are kept, and message content
//! is carried verbatim. The serialized form uses the same key names as the
//! session log, so a [`Record`] can be forwarded to subscribers as-is.

pub mod parser;

pub use parser::{parse_init_announcement, parse_line};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One fragment of message content. Order within a message is meaningful.
///
/// The fragment object is kept exactly as it appeared in the log, so fields
/// and fragment types this crate does not model survive serialization.
/// [`ContentFragment::view`] gives the typed reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFragment(Value);

/// Typed reading of a [`ContentFragment`], borrowed from the raw object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FragmentView<'a> {
    Text {
        text: &'a str,
    },
    Thinking {
        thinking: &'a str,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a Value,
    },
    ToolResult {
        tool_use_id: &'a str,
        content: &'a Value,
        is_error: Option<bool>,
    },
    /// Any other fragment type, or a fragment with no `type`.
    Other {
        kind: Option<&'a str>,
    },
}

impl ContentFragment {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self(serde_json::json!({"type": "text", "text": text.into()}))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn view(&self) -> FragmentView<'_> {
        match self.kind() {
            Some("text") => match self.0.get("text").and_then(Value::as_str) {
                Some(text) => FragmentView::Text { text },
                None => FragmentView::Other { kind: Some("text") },
            },
            Some("thinking") => FragmentView::Thinking {
                thinking: str_field(&self.0, "thinking"),
            },
            Some("tool_use") => FragmentView::ToolUse {
                id: str_field(&self.0, "id"),
                name: str_field(&self.0, "name"),
                input: value_field(&self.0, "input"),
            },
            Some("tool_result") => FragmentView::ToolResult {
                tool_use_id: str_field(&self.0, "tool_use_id"),
                content: value_field(&self.0, "content"),
                is_error: self.0.get("is_error").and_then(Value::as_bool),
            },
            kind => FragmentView::Other { kind },
        }
    }
}

fn str_field<'a>(json: &'a Value, field: &str) -> &'a str {
    json.get(field).and_then(Value::as_str).unwrap_or("")
}

static NULL: Value = Value::Null;

fn value_field<'a>(json: &'a Value, field: &str) -> &'a Value {
    json.get(field).unwrap_or(&NULL)
}

/// Token accounting for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
    }
}

/// The `message` payload of a record. Empty when the line carried no message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Vec<ContentFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Message {
    /// Concatenated text of all text fragments.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|fragment| match fragment.view() {
                FragmentView::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One parsed session log line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub parent_uuid: Option<String>,
    pub session_id: Option<String>,
    pub uuid: Option<String>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: Message,
}

impl Record {
    pub fn role(&self) -> Option<Role> {
        self.message.role
    }

    pub fn is_assistant(&self) -> bool {
        self.role() == Some(Role::Assistant)
    }

    pub fn is_user(&self) -> bool {
        self.role() == Some(Role::User)
    }
}
