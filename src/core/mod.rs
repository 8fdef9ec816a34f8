//! Core types for the controller runtime
//!
//! This module provides the fundamental types used throughout the crate:
//! - `ControllerState` - State machine driven by the controller loop
//! - `FailureCause` / `ResumeTarget` - Data carried by terminal and suspended states
//! - Error types for parsing, storage and traversal

pub mod error;
pub mod state;

pub use error::{
    ActionError, ControllerError, StoreError, StoreResult, TraversalError, TraversalResult,
};
pub use state::{ControllerState, FailureCause, ResumeTarget};
