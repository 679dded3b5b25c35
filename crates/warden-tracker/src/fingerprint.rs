//! State fingerprints: SHA-256 over a canonical serialization of the
//! message history.
//!
//! Hash input layout: one JSON array with one entry per message, in order.
//! Each entry is `[role, content, tool_calls, tool_call_id]`, where
//! `tool_calls` is a list of `{arguments, id, name}` objects and
//! `tool_call_id` is `null` when absent. Object keys are sorted at every
//! depth and nothing is pretty-printed, so equal histories always hash to
//! equal bytes.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use warden_contracts::message::Message;

/// Lowercase hex SHA-256 fingerprint of `messages`.
pub fn fingerprint(messages: &[Message]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_history(messages).as_bytes());
    hex::encode(hasher.finalize())
}

/// The exact bytes `fingerprint` hashes.
pub fn canonical_history(messages: &[Message]) -> String {
    let entries: Vec<Value> = messages.iter().map(message_entry).collect();
    let mut out = String::new();
    write_canonical(&Value::Array(entries), &mut out);
    out
}

fn message_entry(message: &Message) -> Value {
    let calls: Vec<Value> = message
        .tool_calls
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "arguments": Value::Object(c.arguments.clone()),
            })
        })
        .collect();
    json!([
        message.role.as_str(),
        message.content,
        calls,
        message.tool_call_id,
    ])
}

/// Serialize `value` with object keys sorted recursively.
pub fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
