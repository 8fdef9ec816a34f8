//! Persisted-output descriptor
//!
//! What the model sees in place of a tool result that was too large to
//! inline: the stored id, its size, a bounded preview and the tools that can
//! inspect it.

use serde::{Deserialize, Serialize};

use super::delivery::OutputDelivery;
use crate::store::{truncate_chars, OutputSummary, StoredOutput};
use crate::tools::tool_outputs::tool_name;
use crate::tools::ToolResultMode;
use crate::traversal::TraversalOperation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOutputDescriptor {
    pub id: String,
    pub tool_name: String,
    pub size_bytes: u64,
    pub preview: String,
    pub preview_truncated: bool,
    /// Tool names that accept this id
    pub available_operations: Vec<String>,
    pub summary: OutputSummary,
    /// Delivery mode the tool declared
    #[serde(default)]
    pub result_mode: ToolResultMode,
    #[serde(default)]
    pub forced_persist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_reason: Option<String>,
}

impl PersistedOutputDescriptor {
    pub fn for_output(output: &StoredOutput, preview_max_chars: usize) -> Self {
        let serialized = serde_json::to_string(&output.content).unwrap_or_default();
        let (preview, preview_truncated) = truncate_chars(&serialized, preview_max_chars);
        Self {
            id: output.meta.id.clone(),
            tool_name: output.meta.tool_name.clone(),
            size_bytes: output.meta.size_bytes,
            preview,
            preview_truncated,
            available_operations: TraversalOperation::ALL
                .iter()
                .map(|op| tool_name(*op).to_string())
                .collect(),
            summary: output.meta.summary.clone(),
            result_mode: ToolResultMode::default(),
            forced_persist: false,
            forced_reason: None,
        }
    }

    /// Record how delivery was resolved
    pub fn with_delivery(mut self, delivery: &OutputDelivery) -> Self {
        self.result_mode = delivery.requested;
        self.forced_persist = delivery.forced_persist;
        self.forced_reason = delivery.forced_reason.map(str::to_string);
        self
    }

    /// Context message fed back to the model
    pub fn to_context_message(&self) -> String {
        let body = serde_json::to_string(&serde_json::json!({ "persisted_output": self }))
            .unwrap_or_default();
        format!(
            "Tool '{}' returned {} bytes, which were stored instead of inlined. \
             Use the listed tool_outputs tools with id '{}' to inspect them.\n{}",
            self.tool_name, self.size_bytes, self.id, body
        )
    }
}
