//! Stored output record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Characters of serialized content kept in the metadata preview
pub const META_PREVIEW_MAX_CHARS: usize = 200;

/// Name of a JSON value's type as reported to the model
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

/// Truncate to at most `max_chars` characters, reporting whether anything was cut
pub fn truncate_chars(input: &str, max_chars: usize) -> (String, bool) {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (input[..byte_idx].to_string(), true),
        None => (input.to_string(), false),
    }
}

/// Shape summary of a stored payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    /// JSON type of the root value
    pub root_type: String,

    /// Array length or object key count, for container roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
}

impl OutputSummary {
    pub fn of(value: &Value) -> Self {
        let item_count = match value {
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        };
        Self {
            root_type: value_type_name(value).to_string(),
            item_count,
        }
    }
}

/// Indexable attributes of a stored output
///
/// Persisted separately from the payload so listing never has to read
/// (or parse) the payload itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutputMeta {
    // --- Identity ---
    /// Unique output ID
    pub id: String,

    /// Tool that produced the output
    pub tool_name: String,

    /// Conversation the tool call belonged to
    pub conversation_id: String,

    /// Message that issued the tool call
    pub message_id: String,

    // --- Attributes ---
    /// When the output was stored
    pub created_at: DateTime<Utc>,

    /// Whether the tool call succeeded
    pub success: bool,

    /// Byte size reported by the tool
    pub size_bytes: u64,

    /// Short prefix of the serialized payload
    #[serde(default)]
    pub preview: String,

    /// Shape of the payload
    pub summary: OutputSummary,
}

/// A persisted tool result: metadata plus the raw payload
///
/// Immutable once written. Re-executing a tool produces a new record with a
/// new id rather than updating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutput {
    #[serde(flatten)]
    pub meta: StoredOutputMeta,

    /// Arguments the tool was called with
    #[serde(default)]
    pub args: Value,

    /// Raw tool payload
    pub content: Value,
}

impl StoredOutput {
    /// Build a new record with a fresh id and the current timestamp
    pub fn new(
        tool_name: impl Into<String>,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        success: bool,
        size_bytes: u64,
        args: Value,
        content: Value,
    ) -> Self {
        let serialized = serde_json::to_string(&content).unwrap_or_default();
        let (preview, _) = truncate_chars(&serialized, META_PREVIEW_MAX_CHARS);
        Self {
            meta: StoredOutputMeta {
                id: Uuid::new_v4().to_string(),
                tool_name: tool_name.into(),
                conversation_id: conversation_id.into(),
                message_id: message_id.into(),
                created_at: Utc::now(),
                success,
                size_bytes,
                preview,
                summary: OutputSummary::of(&content),
            },
            args,
            content,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_has_unique_ids() {
        let a = StoredOutput::new("web.fetch", "conv", "msg", true, 10, json!({}), json!([1, 2]));
        let b = StoredOutput::new("web.fetch", "conv", "msg", true, 10, json!({}), json!([1, 2]));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.meta.summary.root_type, "array");
        assert_eq!(a.meta.summary.item_count, Some(2));
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "x".repeat(1000);
        let record = StoredOutput::new("t", "c", "m", true, 1002, json!({}), json!(long));
        assert_eq!(record.meta.preview.chars().count(), META_PREVIEW_MAX_CHARS);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let (out, cut) = truncate_chars("héllo", 2);
        assert_eq!(out, "hé");
        assert!(cut);

        let (out, cut) = truncate_chars("hi", 5);
        assert_eq!(out, "hi");
        assert!(!cut);
    }

    #[test]
    fn test_flattened_serialization() {
        let record = StoredOutput::new("t", "c", "m", false, 4, json!({"q": 1}), json!(null));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tool_name"], "t");
        assert_eq!(json["success"], false);
        assert!(json.get("meta").is_none());

        let loaded: StoredOutput = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, record);
    }
}
