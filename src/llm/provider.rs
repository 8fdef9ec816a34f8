//! Model provider trait
//!
//! Abstracts the model backend so the controller loop can run against any
//! provider that supports structured output. Providers own their wire format
//! and translate the dialect-adapted `output_format` into their request.

use anyhow::Result;

use super::schema::ProviderDialect;
use super::types::{Message, ToolSpec};

/// Everything a provider needs for one controller turn
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    /// System prompt for the controller
    pub system_prompt: &'a str,

    /// Conversation so far, oldest first
    pub messages: &'a [Message],

    /// Tools the model may name in a `next_step`
    pub tools: &'a [ToolSpec],

    /// Structured-output payload built for the provider's dialect
    pub output_format: &'a serde_json::Value,
}

/// Trait for model providers that drive the controller loop.
///
/// One call is one model turn. The reply is the raw text of the model's
/// structured output; the controller parses it. Transport failures are
/// returned as errors and end the loop with a model failure.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Request one structured controller turn.
    async fn request_turn(&self, request: TurnRequest<'_>) -> Result<String>;

    /// Schema dialect the provider accepts.
    fn dialect(&self) -> ProviderDialect;

    /// Get the provider name (e.g., "anthropic", "gemini").
    fn provider_name(&self) -> &str;
}
