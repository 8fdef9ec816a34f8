//! Tool Executor
//!
//! Dispatches a tool step by name. Every outcome is a `ToolResult`: unknown
//! tools, tool errors and timeouts become failed results that the model sees
//! on its next turn.

use std::time::Duration;

use serde_json::Value;

use crate::tools::{ToolRegistry, ToolResult};

/// Handles tool execution with an optional timeout
pub struct ToolExecutor;

impl ToolExecutor {
    /// Execute a tool by name
    pub async fn execute(
        tools: &ToolRegistry,
        tool_name: &str,
        args: &Value,
        timeout: Option<Duration>,
    ) -> ToolResult {
        let Some(tool) = tools.get(tool_name) else {
            tracing::warn!("[Executor] Unknown tool: {}", tool_name);
            return ToolResult::error(format!(
                "Unknown tool '{}'. Available tools: {}",
                tool_name,
                tools.tool_names().join(", ")
            ));
        };

        tracing::info!("[Executor] Executing tool: {}", tool_name);
        tracing::debug!("[Executor] Args: {}", args);

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(args)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        "[Executor] Tool {} timed out after {}ms",
                        tool_name,
                        limit.as_millis()
                    );
                    return ToolResult::error(format!(
                        "Tool '{}' timed out after {}ms",
                        tool_name,
                        limit.as_millis()
                    ));
                }
            },
            None => tool.execute(args).await,
        };

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    "[Executor] Tool {} completed. Is error: {}, size: {} bytes",
                    tool_name,
                    result.is_error,
                    result.size_bytes
                );
                result
            }
            Err(e) => {
                tracing::warn!("[Executor] Tool {} failed: {}", tool_name, e);
                ToolResult::error(format!("Tool execution failed: {}", e))
            }
        }
    }
}
