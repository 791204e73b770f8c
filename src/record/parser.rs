//! Line parser for session JSONL records and worker stream-json output.

use super::{ContentFragment, Message, Record, Role, Usage};
use serde_json::Value;
use tracing::warn;

/// Parse one JSONL line into a [`Record`].
///
/// Blank lines and lines that are not a JSON object yield `None`; malformed
/// JSON is logged. Unknown top-level fields are dropped; content fragments are
/// kept as written.
pub fn parse_line(line: &str) -> Option<Record> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let json = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to parse JSONL line: {}", e);
            return None;
        }
    };

    if !json.is_object() {
        warn!("Ignoring JSONL line that is not an object");
        return None;
    }

    Some(Record {
        parent_uuid: extract_id_field(&json, "parentUuid"),
        session_id: extract_id_field(&json, "sessionId"),
        uuid: extract_id_field(&json, "uuid"),
        timestamp: extract_id_field(&json, "timestamp"),
        message: json.get("message").map(parse_message).unwrap_or_default(),
    })
}

/// Recognize the worker's `system/init` announcement and return its session id.
pub fn parse_init_announcement(line: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(line.trim()).ok()?;
    if json.get("type").and_then(Value::as_str) != Some("system")
        || json.get("subtype").and_then(Value::as_str) != Some("init")
    {
        return None;
    }
    extract_id_field(&json, "session_id")
}

/// Extract a non-empty string field.
fn extract_id_field(json: &Value, field: &str) -> Option<String> {
    json.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Extract a counter, treating anything but a non-negative integer as zero.
fn extract_counter(json: &Value, field: &str) -> u64 {
    json.get(field).and_then(Value::as_u64).unwrap_or(0)
}

fn parse_message(json: &Value) -> Message {
    if !json.is_object() {
        return Message::default();
    }

    Message {
        role: json
            .get("role")
            .and_then(Value::as_str)
            .and_then(|role| role.parse::<Role>().ok()),
        content: parse_content(json.get("content")),
        usage: json.get("usage").filter(|u| u.is_object()).map(parse_usage),
    }
}

fn parse_content(content: Option<&Value>) -> Vec<ContentFragment> {
    match content {
        Some(Value::String(text)) => vec![ContentFragment::text(text.clone())],
        Some(Value::Array(items)) => items.iter().cloned().map(ContentFragment::from_value).collect(),
        _ => Vec::new(),
    }
}

fn parse_usage(json: &Value) -> Usage {
    Usage {
        input_tokens: extract_counter(json, "input_tokens"),
        output_tokens: extract_counter(json, "output_tokens"),
        cache_creation_input_tokens: extract_counter(json, "cache_creation_input_tokens"),
        cache_read_input_tokens: extract_counter(json, "cache_read_input_tokens"),
    }
}
