//! Traversal operations exposed as model-callable tools
//!
//! `tool_outputs.list`, `.stats`, `.extract`, `.count` and `.sample` wrap the
//! `TraversalSuite`. Traversal errors become failed tool results; they never
//! touch controller state.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::registry::ToolRegistry;
use super::tool::{Tool, ToolResult};
use crate::core::TraversalResult;
use crate::store::OutputStore;
use crate::traversal::{
    CountRequest, ExtractRequest, ListRequest, SampleRequest, StatsRequest, TraversalOperation,
    TraversalSuite,
};

/// Name prefix shared by every traversal tool
pub const TOOL_OUTPUTS_PREFIX: &str = "tool_outputs.";

/// Full tool name of a traversal operation
pub fn tool_name(op: TraversalOperation) -> &'static str {
    match op {
        TraversalOperation::List => "tool_outputs.list",
        TraversalOperation::Stats => "tool_outputs.stats",
        TraversalOperation::Extract => "tool_outputs.extract",
        TraversalOperation::Count => "tool_outputs.count",
        TraversalOperation::Sample => "tool_outputs.sample",
    }
}

/// Whether `name` is one of the traversal tools
pub fn is_tool_outputs_tool(name: &str) -> bool {
    name.starts_with(TOOL_OUTPUTS_PREFIX)
}

/// Whether the tool addresses a single stored output by `id`
pub fn requires_output_id(name: &str) -> bool {
    is_tool_outputs_tool(name) && name != tool_name(TraversalOperation::List)
}

/// One traversal operation as a tool
pub struct TraversalTool {
    op: TraversalOperation,
    suite: TraversalSuite,
}

impl TraversalTool {
    pub fn new(op: TraversalOperation, suite: TraversalSuite) -> Self {
        Self { op, suite }
    }

    fn run<Req, Resp>(
        &self,
        args: &Value,
        f: impl FnOnce(&TraversalSuite, &Req) -> TraversalResult<Resp>,
    ) -> Result<ToolResult>
    where
        Req: DeserializeOwned,
        Resp: Serialize,
    {
        let request: Req = match serde_json::from_value(args.clone()) {
            Ok(req) => req,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Invalid arguments for {}: {}",
                    self.name(),
                    e
                )))
            }
        };
        match f(&self.suite, &request) {
            Ok(resp) => Ok(ToolResult::success(serde_json::to_value(resp)?)),
            Err(e) => {
                tracing::debug!("[ToolOutputs] {} failed: {}", self.name(), e);
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Tool for TraversalTool {
    fn name(&self) -> &str {
        tool_name(self.op)
    }

    fn description(&self) -> &str {
        match self.op {
            TraversalOperation::List => {
                "List stored tool outputs. Filter by conversation_id, tool_name, success and time range; sort and paginate."
            }
            TraversalOperation::Stats => {
                "Summarize a stored output: size, root type, depth, per-type counts, array and object summaries, optional schema."
            }
            TraversalOperation::Extract => {
                "Extract values from a stored output by JSONPath. Missing paths return default_value (or null) and are listed in missing_paths."
            }
            TraversalOperation::Count => {
                "Count array lengths, object keys, path matches or nested array items in a stored output."
            }
            TraversalOperation::Sample => {
                "Sample items from an array in a stored output using first, last, random, systematic or stratified selection."
            }
        }
    }

    fn args_schema(&self) -> Value {
        let id = json!({ "type": "string", "description": "Stored output id" });
        match self.op {
            TraversalOperation::List => json!({
                "type": "object",
                "properties": {
                    "conversation_id": { "type": "string" },
                    "tool_name": { "type": "string" },
                    "success": { "type": "boolean" },
                    "after": { "type": "string", "description": "RFC 3339 timestamp" },
                    "before": { "type": "string", "description": "RFC 3339 timestamp" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "offset": { "type": "integer", "minimum": 0 },
                    "sort_by": { "type": "string", "enum": ["created_at", "size", "tool_name"] },
                    "sort_order": { "type": "string", "enum": ["asc", "desc"] },
                    "include_preview": { "type": "boolean" },
                    "preview_length": { "type": "integer", "minimum": 0 }
                }
            }),
            TraversalOperation::Stats => json!({
                "type": "object",
                "properties": {
                    "id": id,
                    "include_schema": { "type": "boolean" },
                    "max_depth": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "sample_arrays": { "type": "boolean" },
                    "paths": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["id"]
            }),
            TraversalOperation::Extract => json!({
                "type": "object",
                "properties": {
                    "id": id,
                    "paths": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
                    "flatten": { "type": "boolean" },
                    "include_paths": { "type": "boolean" },
                    "default_value": {}
                },
                "required": ["id", "paths"]
            }),
            TraversalOperation::Count => json!({
                "type": "object",
                "properties": {
                    "id": id,
                    "counts": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "path": { "type": "string" },
                                "mode": {
                                    "type": "string",
                                    "enum": ["array_length", "object_keys", "matches", "nested_total"]
                                }
                            },
                            "required": ["name", "path"]
                        }
                    }
                },
                "required": ["id", "counts"]
            }),
            TraversalOperation::Sample => json!({
                "type": "object",
                "properties": {
                    "id": id,
                    "path": { "type": "string", "description": "JSONPath to the array" },
                    "size": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Items to return; the whole array when it is smaller, at most 1000 otherwise"
                    },
                    "strategy": {
                        "type": "string",
                        "enum": ["first", "last", "random", "systematic", "stratified"]
                    },
                    "seed": { "type": "integer" },
                    "stride": { "type": "integer", "minimum": 1 },
                    "group_by": { "type": "string", "description": "Item-relative path for stratified" }
                },
                "required": ["id", "path", "size"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> Result<ToolResult> {
        match self.op {
            TraversalOperation::List => self.run(args, |s, r: &ListRequest| s.list(r)),
            TraversalOperation::Stats => self.run(args, |s, r: &StatsRequest| s.stats(r)),
            TraversalOperation::Extract => self.run(args, |s, r: &ExtractRequest| s.extract(r)),
            TraversalOperation::Count => self.run(args, |s, r: &CountRequest| s.count(r)),
            TraversalOperation::Sample => self.run(args, |s, r: &SampleRequest| s.sample(r)),
        }
    }
}

/// Register all five traversal tools against `store`
pub fn register_tool_output_tools(registry: &mut ToolRegistry, store: OutputStore) -> Result<()> {
    let suite = TraversalSuite::new(store);
    for op in TraversalOperation::ALL {
        registry.register(TraversalTool::new(op, suite.clone()))?;
    }
    Ok(())
}
