//! Shadow Agent Controller
//!
//! A controller runtime for tool-using language-model agents. Each model turn
//! yields one structured action; tool results too large to inline are
//! persisted and inspected through the `tool_outputs.*` traversal tools.

pub mod core;
pub mod tools;

// Model-facing types and schema dialects
pub mod llm;

// Controller loop, action parsing and persisted-output descriptors
pub mod controller;

// Stored tool outputs and the operations over them
pub mod store;
pub mod traversal;

pub mod logging;

pub use controller::{ControllerConfig, ControllerLoop, StepRecord};
pub use core::{ControllerError, ControllerState, FailureCause, ResumeTarget};
pub use llm::{ModelProvider, ProviderDialect};
pub use store::OutputStore;
pub use traversal::TraversalSuite;
