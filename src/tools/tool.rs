//! Tool trait definition
//!
//! Any handler that accepts JSON arguments and returns a result-or-error with
//! a byte size can be dispatched by the controller loop.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ToolSpec;

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output of the tool
    pub payload: Value,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
    /// Size of the serialized payload in bytes
    pub size_bytes: u64,
}

fn serialized_len(value: &Value) -> u64 {
    serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0)
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(payload: Value) -> Self {
        Self {
            size_bytes: serialized_len(&payload),
            payload,
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        let payload = serde_json::json!({ "error": message.into() });
        Self {
            size_bytes: serialized_len(&payload),
            payload,
            is_error: true,
        }
    }

    /// Override the reported byte size
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// The error message of a failed result, if any
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error {
            return None;
        }
        self.payload.get("error").and_then(|v| v.as_str())
    }
}

/// How a tool prefers its results to reach the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultMode {
    /// Inline below the configured threshold, persist above it
    #[default]
    Auto,
    /// Inline up to the hard inline cap; larger results are still persisted
    Inline,
    /// Always persist
    Persist,
}

/// Trait for tools that the controller can dispatch
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// Get a description of this tool
    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn args_schema(&self) -> Value;

    /// Tool spec advertised to the model
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.args_schema(),
        }
    }

    /// Delivery preference for this tool's results
    fn result_mode(&self) -> ToolResultMode {
        ToolResultMode::Auto
    }

    /// Execute the tool with the given arguments
    ///
    /// `Err` is for failures the tool could not express as a result; the
    /// executor turns it into a failed `ToolResult`.
    async fn execute(&self, args: &Value) -> Result<ToolResult>;
}
