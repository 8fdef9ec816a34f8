//! Action parser and normalizer
//!
//! Turns one raw model reply into a validated `ControllerAction`:
//!
//! 1. Extract the JSON body from the reply text.
//! 2. Normalize: hoist `step`/`next_step` wrappers and map alias field names
//!    onto canonical ones (only where the canonical field is absent).
//! 3. Decode into the tagged union.
//! 4. On decode failure, accept only `action: "respond"` with a message, as
//!    `Complete`. Anything else is a parse error.
//! 5. Validate `next_step` payloads.
//!
//! Nothing here retries or invents a step.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use super::action::{ControllerAction, Step};
use crate::core::ActionError;

pub const JSON_START_MARKER: &str = "=====JSON_START=====";
pub const JSON_END_MARKER: &str = "=====JSON_END=====";

const TOOL_ALIASES: &[&str] = &["tool_name", "name"];
const ARGS_ALIASES: &[&str] = &["tool_args", "arguments", "tool_input"];
const MESSAGE_ALIASES: &[&str] = &["response", "content"];

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// JSON text of a reply: marked envelope, then code fence, then the trimmed reply
pub fn extract_json(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find(JSON_START_MARKER) {
        let after = start + JSON_START_MARKER.len();
        if let Some(end) = trimmed[after..].find(JSON_END_MARKER) {
            return trimmed[after..after + end].trim().to_string();
        }
    }

    if let Some(caps) = fence_regex().and_then(|re| re.captures(trimmed)) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Parse raw reply text into a validated action
pub fn parse_reply(raw: &str) -> Result<ControllerAction, ActionError> {
    let body = extract_json(raw);
    if body.is_empty() {
        return Err(ActionError::parse("empty reply"));
    }
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| ActionError::parse(format!("reply is not valid JSON: {}", e)))?;
    parse_action(&value)
}

/// Parse a decoded JSON reply into a validated action
pub fn parse_action(value: &Value) -> Result<ControllerAction, ActionError> {
    let normalized = normalize_action_value(value);

    let action = match serde_json::from_value::<ControllerAction>(normalized.clone()) {
        Ok(action) => action,
        Err(decode_err) => {
            if normalized.get("action").and_then(Value::as_str) == Some("respond") {
                if let Some(message) = non_empty_str(&normalized, "message") {
                    return Ok(ControllerAction::Complete {
                        message: message.to_string(),
                    });
                }
            }
            return Err(ActionError::parse(decode_err.to_string()));
        }
    };

    validate(&action)?;
    Ok(action)
}

fn validate(action: &ControllerAction) -> Result<(), ActionError> {
    match action {
        ControllerAction::NextStep(next) => Step::try_from(next).map(|_| ()),
        ControllerAction::AskUser { question, .. } if question.trim().is_empty() => Err(
            ActionError::validation(Some("ask_user"), "ask_user requires non-empty 'question' field"),
        ),
        ControllerAction::GuardrailStop { reason, .. } if reason.trim().is_empty() => {
            Err(ActionError::validation(
                None,
                "guardrail_stop requires non-empty 'reason' field",
            ))
        }
        _ => Ok(()),
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn apply_aliases(map: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    for alias in aliases {
        if map.contains_key(canonical) {
            return;
        }
        if let Some(val) = map.remove(*alias) {
            map.insert(canonical.to_string(), val);
        }
    }
}

/// Rewrite wrapper shapes and alias field names at the raw value level
pub fn normalize_action_value(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut out = map.clone();

    // Older nested shape: {"action": "next_step", "step": {...}}
    let nested = match out.remove("step") {
        Some(step) => Some(step),
        None => out.remove("next_step"),
    };
    if let Some(Value::Object(step)) = nested {
        for (key, val) in step {
            out.entry(key).or_insert(val);
        }
    }

    apply_aliases(&mut out, "tool", TOOL_ALIASES);
    apply_aliases(&mut out, "args", ARGS_ALIASES);
    apply_aliases(&mut out, "message", MESSAGE_ALIASES);

    // An empty enum value means "unset"
    if out.get("resume_to").is_some_and(is_blank) {
        out.remove("resume_to");
    }

    Value::Object(out)
}

/// Tool arguments as an object
///
/// JSON text is decoded; a non-object value is wrapped as `{"value": v}`;
/// text that is not JSON becomes `{"input": text}`; null or blank is `{}`.
pub fn normalize_tool_args(args: Value) -> Value {
    match args {
        Value::Null => json!({}),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return json!({});
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) if value.is_object() => value,
                Ok(Value::Null) => json!({}),
                Ok(value) => json!({ "value": value }),
                Err(_) => json!({ "input": text }),
            }
        }
        Value::Object(_) => args,
        other => json!({ "value": other }),
    }
}
