//! Provider schema adapter
//!
//! Builds the structured-output request for the controller action schema.
//! Each provider dialect rejects a different set of JSON Schema constructs;
//! `adapt_schema` removes or rewrites only those, walking the schema with
//! awareness of which maps hold property *names* (never stripped) and which
//! hold schema keywords.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Structured-output dialect of a model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderDialect {
    #[default]
    Anthropic,
    OpenAi,
    Gemini,
    Ollama,
}

impl ProviderDialect {
    pub const ALL: [ProviderDialect; 4] = [
        ProviderDialect::Anthropic,
        ProviderDialect::OpenAi,
        ProviderDialect::Gemini,
        ProviderDialect::Ollama,
    ];

    /// Resolve a provider name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(ProviderDialect::Anthropic),
            "openai" | "open_ai" | "gpt" => Some(ProviderDialect::OpenAi),
            "gemini" | "google" => Some(ProviderDialect::Gemini),
            "ollama" => Some(ProviderDialect::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderDialect::Anthropic => "anthropic",
            ProviderDialect::OpenAi => "openai",
            ProviderDialect::Gemini => "gemini",
            ProviderDialect::Ollama => "ollama",
        }
    }

    /// Keywords this dialect rejects outright
    fn unsupported_keywords(&self) -> &'static [&'static str] {
        match self {
            // Numeric and length bounds
            ProviderDialect::Anthropic => &[
                "minimum",
                "maximum",
                "exclusiveMinimum",
                "exclusiveMaximum",
                "multipleOf",
                "minLength",
                "maxLength",
                "minItems",
                "maxItems",
            ],
            ProviderDialect::OpenAi => &[
                "$schema",
                "default",
                "patternProperties",
                "if",
                "then",
                "else",
            ],
            ProviderDialect::Gemini => &[
                "additionalProperties",
                "$schema",
                "definitions",
                "$defs",
                "$ref",
                "patternProperties",
                "if",
                "then",
                "else",
                "allOf",
                "anyOf",
                "oneOf",
                "not",
                "default",
            ],
            ProviderDialect::Ollama => &[],
        }
    }
}

impl fmt::Display for ProviderDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keywords whose value is a map from names to subschemas
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "$defs", "definitions"];

/// Keywords whose value is a single subschema
const SUBSCHEMA_KEYWORDS: &[&str] = &[
    "items",
    "additionalProperties",
    "not",
    "if",
    "then",
    "else",
    "contains",
];

/// Keywords whose value is a list of subschemas
const SCHEMA_LIST_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// Depth at which `$ref` inlining gives up on recursive definitions
const MAX_REF_DEPTH: usize = 16;

/// The canonical controller action schema
///
/// Flat: one required discriminator and independently optional fields. No
/// schema-level alternation, no nested per-step objects. `args` is a JSON
/// string so strict dialects cannot force it to `{}`.
pub fn canonical_action_schema() -> Value {
    json!({
        "type": "object",
        "required": ["action"],
        "properties": {
            "action": {
                "type": "string",
                "enum": ["next_step", "complete", "guardrail_stop", "ask_user"]
            },
            "thinking": {
                "type": "object",
                "properties": {
                    "task": { "type": "string" },
                    "facts": { "type": "array", "items": { "type": "string" } },
                    "decisions": { "type": "array", "items": { "type": "string" } },
                    "risks": { "type": "array", "items": { "type": "string" } },
                    "confidence": { "type": "number" }
                }
            },
            "type": {
                "type": "string",
                "enum": ["tool", "respond", "ask_user"]
            },
            "description": { "type": "string" },
            "tool": { "type": "string" },
            "args": { "type": "string" },
            "message": { "type": "string" },
            "reason": { "type": "string" },
            "question": { "type": "string" },
            "context": { "type": "string" },
            "resume_to": {
                "type": "string",
                "enum": ["reflecting", "controller"]
            }
        }
    })
}

/// Rewrite `schema` into a form `dialect` accepts
///
/// A schema that already avoids every construct the dialect rejects comes
/// back structurally identical.
pub fn adapt_schema(schema: &Value, dialect: ProviderDialect) -> Value {
    let defs = match dialect {
        ProviderDialect::Gemini => collect_definitions(schema),
        _ => Map::new(),
    };
    Adapter { dialect, defs: &defs }.schema(schema, 0)
}

/// The provider's structured-output request payload for the action schema
pub fn output_format(dialect: ProviderDialect) -> Value {
    let schema = adapt_schema(&canonical_action_schema(), dialect);
    match dialect {
        ProviderDialect::Anthropic => json!({ "type": "json_schema", "schema": schema }),
        ProviderDialect::OpenAi => json!({
            "type": "json_schema",
            "json_schema": { "name": "controller_action", "schema": schema }
        }),
        ProviderDialect::Gemini => json!({
            "response_mime_type": "application/json",
            "response_schema": schema
        }),
        ProviderDialect::Ollama => schema,
    }
}

fn collect_definitions(schema: &Value) -> Map<String, Value> {
    let mut defs = Map::new();
    for key in ["definitions", "$defs"] {
        if let Some(Value::Object(map)) = schema.get(key) {
            for (name, def) in map {
                defs.insert(format!("#/{}/{}", key, name), def.clone());
            }
        }
    }
    defs
}

struct Adapter<'a> {
    dialect: ProviderDialect,
    defs: &'a Map<String, Value>,
}

impl Adapter<'_> {
    fn schema(&self, value: &Value, ref_depth: usize) -> Value {
        let Value::Object(map) = value else {
            // Boolean schemas and anything unexpected pass through.
            return value.clone();
        };

        if self.dialect == ProviderDialect::Gemini {
            if let Some(Value::String(target)) = map.get("$ref") {
                return match self.defs.get(target) {
                    Some(def) if ref_depth < MAX_REF_DEPTH => self.schema(def, ref_depth + 1),
                    _ => json!({}),
                };
            }
        }

        let unsupported = self.dialect.unsupported_keywords();
        let mut out = Map::new();
        for (key, val) in map {
            let key = key.as_str();
            if unsupported.contains(&key) {
                continue;
            }
            if key == "additionalProperties"
                && self.dialect == ProviderDialect::Anthropic
                && val != &Value::Bool(false)
            {
                // Only `false` is accepted.
                continue;
            }
            if key == "type" && self.dialect == ProviderDialect::Gemini {
                if let Value::Array(types) = val {
                    let (ty, nullable) = collapse_type_list(types);
                    if let Some(ty) = ty {
                        out.insert("type".to_string(), ty);
                    }
                    if nullable {
                        out.insert("nullable".to_string(), Value::Bool(true));
                    }
                    continue;
                }
            }

            let adapted = if SCHEMA_MAP_KEYWORDS.contains(&key) {
                match val {
                    Value::Object(entries) => Value::Object(
                        entries
                            .iter()
                            .map(|(name, sub)| (name.clone(), self.schema(sub, ref_depth)))
                            .collect(),
                    ),
                    other => other.clone(),
                }
            } else if SUBSCHEMA_KEYWORDS.contains(&key) {
                match val {
                    Value::Array(list) => {
                        Value::Array(list.iter().map(|s| self.schema(s, ref_depth)).collect())
                    }
                    other => self.schema(other, ref_depth),
                }
            } else if SCHEMA_LIST_KEYWORDS.contains(&key) {
                match val {
                    Value::Array(list) => {
                        Value::Array(list.iter().map(|s| self.schema(s, ref_depth)).collect())
                    }
                    other => other.clone(),
                }
            } else {
                // Literal keyword values (`enum`, `required`, `const`, ...)
                val.clone()
            };
            out.insert(key.to_string(), adapted);
        }
        Value::Object(out)
    }
}

/// `["string", "null"]` -> (`"string"`, nullable)
fn collapse_type_list(types: &[Value]) -> (Option<Value>, bool) {
    let nullable = types.iter().any(|t| t == "null");
    let first = types.iter().find(|t| *t != "null").cloned();
    (first, nullable)
}
