//! Tool system for the controller
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolResult` - Result type for tool execution
//! - `ToolRegistry` - Lookup-by-name registry the controller dispatches through
//! - `tool_outputs` - Traversal operations exposed as tools

mod registry;
mod tool;

pub mod tool_outputs;

pub use registry::ToolRegistry;
pub use tool::{Tool, ToolResult, ToolResultMode};
pub use tool_outputs::{register_tool_output_tools, TraversalTool, TOOL_OUTPUTS_PREFIX};
