//! Controller
//!
//! Turns model replies into actions and runs them:
//! - `parser` - JSON extraction, alias normalization, action decoding
//! - `action` - `ControllerAction` / `NextStep` and the validated `Step`
//! - `controller_loop` - the state machine over model turns and tool steps
//! - `delivery` - inline or persist, per tool result
//! - `descriptor` - what the model sees for persisted outputs

pub mod action;
pub mod config;
pub mod controller_loop;
pub mod delivery;
pub mod descriptor;
pub mod executor;
pub mod parser;

#[cfg(test)]
mod tests;

pub use action::{ControllerAction, NextStep, Step, StepKind};
pub use config::ControllerConfig;
pub use controller_loop::{ControllerLoop, StepRecord};
pub use delivery::{DeliveryMode, OutputDelivery};
pub use descriptor::PersistedOutputDescriptor;
pub use executor::ToolExecutor;
pub use parser::{extract_json, parse_action, parse_reply};
