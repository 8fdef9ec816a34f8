//! Output delivery
//!
//! Decides whether a tool result is inlined into model context or persisted
//! behind a descriptor, from the tool's declared `ToolResultMode` and the
//! result size.

use serde::{Deserialize, Serialize};

use crate::tools::tool_outputs::is_tool_outputs_tool;
use crate::tools::ToolResultMode;

/// Reason recorded when an `Inline` tool's result had to be persisted anyway
pub const FORCED_INLINE_HARD_LIMIT: &str = "inline_size_exceeds_hard_limit";

/// Where a tool result ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Inline,
    Persist,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputDelivery {
    /// Mode the tool declared
    pub requested: ToolResultMode,
    pub resolved: DeliveryMode,
    /// Persisted against the tool's `Inline` preference
    pub forced_persist: bool,
    pub forced_reason: Option<&'static str>,
}

impl OutputDelivery {
    /// Resolve delivery for one result
    ///
    /// `tool_outputs.*` results are always inlined. Otherwise `Persist`
    /// always stores, `Auto` stores above `inline_threshold`, and `Inline`
    /// stores only above `inline_hard_max`.
    pub fn resolve(
        tool_name: &str,
        requested: ToolResultMode,
        size_bytes: u64,
        inline_threshold: u64,
        inline_hard_max: u64,
    ) -> Self {
        let inline = Self {
            requested,
            resolved: DeliveryMode::Inline,
            forced_persist: false,
            forced_reason: None,
        };
        if is_tool_outputs_tool(tool_name) {
            return inline;
        }

        match requested {
            ToolResultMode::Persist => Self {
                resolved: DeliveryMode::Persist,
                ..inline
            },
            ToolResultMode::Auto if size_bytes > inline_threshold => Self {
                resolved: DeliveryMode::Persist,
                ..inline
            },
            ToolResultMode::Inline if size_bytes > inline_hard_max => Self {
                resolved: DeliveryMode::Persist,
                forced_persist: true,
                forced_reason: Some(FORCED_INLINE_HARD_LIMIT),
                ..inline
            },
            ToolResultMode::Auto | ToolResultMode::Inline => inline,
        }
    }

    pub fn is_persist(&self) -> bool {
        self.resolved == DeliveryMode::Persist
    }
}
