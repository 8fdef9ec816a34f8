//! Controller Configuration
//!
//! Configuration options for the ControllerLoop.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderDialect;

/// Default inline threshold: tool results above this many bytes are persisted
pub const DEFAULT_INLINE_THRESHOLD_BYTES: u64 = 16 * 1024;

/// Default cap for tools that prefer inline results
pub const DEFAULT_INLINE_HARD_MAX_BYTES: u64 = 64 * 1024;

/// Default cap on model turns per run
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default character budget of a persisted-output preview
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 1200;

const DEFAULT_SYSTEM_PROMPT: &str = "You are the controller of a tool-using agent. \
Reply with exactly one JSON action per turn. \
Use next_step with 'tool' and 'args' (a JSON string) to call a tool, \
'message' to answer, or 'question' to ask the user. \
Large tool results are stored and returned as a descriptor with an id; \
inspect them with the tool_outputs.* tools instead of asking for the full payload.";

/// Configuration for a ControllerLoop
///
/// Use the builder pattern to configure the controller:
///
/// ```ignore
/// let config = ControllerConfig::new("You are a research agent")
///     .with_inline_threshold(32 * 1024)
///     .with_max_iterations(20)
///     .with_tool_timeout(Duration::from_secs(30))
///     .with_dialect(ProviderDialect::Gemini);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// System prompt for the model
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool results larger than this are persisted instead of inlined
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold_bytes: u64,

    /// Results of `Inline`-mode tools larger than this are persisted anyway
    #[serde(default = "default_inline_hard_max")]
    pub inline_hard_max_bytes: u64,

    /// Maximum number of model turns per run (prevents runaway loops)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Characters of a persisted payload shown in its descriptor
    #[serde(default = "default_preview_max_chars")]
    pub preview_max_chars: usize,

    /// Per-tool execution timeout in milliseconds (none by default)
    #[serde(default)]
    pub tool_timeout_ms: Option<u64>,

    /// Structured-output dialect override; the provider's dialect when unset
    #[serde(default)]
    pub dialect: Option<ProviderDialect>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_inline_threshold() -> u64 {
    DEFAULT_INLINE_THRESHOLD_BYTES
}

fn default_inline_hard_max() -> u64 {
    DEFAULT_INLINE_HARD_MAX_BYTES
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_preview_max_chars() -> usize {
    DEFAULT_PREVIEW_MAX_CHARS
}

impl ControllerConfig {
    /// Create a new configuration with a system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD_BYTES,
            inline_hard_max_bytes: DEFAULT_INLINE_HARD_MAX_BYTES,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            preview_max_chars: DEFAULT_PREVIEW_MAX_CHARS,
            tool_timeout_ms: None,
            dialect: None,
        }
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read controller config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid controller config {}", path.display()))?;
        Ok(config)
    }

    /// Set the inline threshold in bytes
    pub fn with_inline_threshold(mut self, bytes: u64) -> Self {
        self.inline_threshold_bytes = bytes;
        self
    }

    /// Set the hard cap for `Inline`-mode tools
    pub fn with_inline_hard_max(mut self, bytes: u64) -> Self {
        self.inline_hard_max_bytes = bytes;
        self
    }

    /// Set maximum model turns per run
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the descriptor preview length
    pub fn with_preview_max_chars(mut self, chars: usize) -> Self {
        self.preview_max_chars = chars;
        self
    }

    /// Set a per-tool execution timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Force a structured-output dialect
    pub fn with_dialect(mut self, dialect: ProviderDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Tool timeout as a `Duration`
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}
