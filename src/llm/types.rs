//! Context types exchanged with a model provider
//!
//! The controller speaks plain text in both directions: the model replies
//! with one structured action, and tool results come back as serialized JSON
//! in a user message. Providers translate these to their own wire formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender of a context message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of controller context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Text content
    pub content: String,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A tool the model may name in a `next_step`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// JSON schema for the tool arguments
    pub input_schema: Value,
}
