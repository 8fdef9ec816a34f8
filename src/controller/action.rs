//! Controller actions
//!
//! `ControllerAction` is the decoded form of one model turn. A `NextStep`
//! carries a flat set of optional fields; `Step` is the validated, executable
//! form the loop actually runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::normalize_tool_args;
use crate::core::{ActionError, ResumeTarget};

/// One model turn, discriminated by the `action` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControllerAction {
    NextStep(NextStep),
    Complete {
        message: String,
    },
    GuardrailStop {
        reason: String,
        #[serde(default)]
        message: Option<String>,
    },
    AskUser {
        question: String,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        resume_to: ResumeTarget,
    },
}

impl ControllerAction {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerAction::NextStep(_) => "next_step",
            ControllerAction::Complete { .. } => "complete",
            ControllerAction::GuardrailStop { .. } => "guardrail_stop",
            ControllerAction::AskUser { .. } => "ask_user",
        }
    }
}

/// Flat payload of a `next_step` action
///
/// Every field is optional at decode time. `Step::try_from` decides which
/// step this is and whether its payload is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    /// Free-form reasoning; never executed
    #[serde(default)]
    pub thinking: Value,

    /// Explicit step type; inferred from the payload fields when absent
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Tool arguments; an object, or JSON text encoding one
    #[serde(default)]
    pub args: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_to: Option<ResumeTarget>,
}

/// The kinds of executable step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Tool,
    Respond,
    AskUser,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Tool => "tool",
            StepKind::Respond => "respond",
            StepKind::AskUser => "ask_user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "tool" => Some(StepKind::Tool),
            "respond" => Some(StepKind::Respond),
            "ask_user" => Some(StepKind::AskUser),
            _ => None,
        }
    }

    /// Name of the field that carries this kind's payload
    pub fn payload_field(&self) -> &'static str {
        match self {
            StepKind::Tool => "tool",
            StepKind::Respond => "message",
            StepKind::AskUser => "question",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated, executable step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Tool {
        tool: String,
        args: Value,
        description: Option<String>,
    },
    Respond {
        message: String,
    },
    AskUser {
        question: String,
        context: Option<String>,
        resume_to: ResumeTarget,
    },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Tool { .. } => StepKind::Tool,
            Step::Respond { .. } => StepKind::Respond,
            Step::AskUser { .. } => StepKind::AskUser,
        }
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl NextStep {
    /// Step type from field presence
    ///
    /// `Ok(None)` when no payload field is set; an error when more than one is.
    pub fn infer_kind(&self) -> Result<Option<StepKind>, ActionError> {
        let present: Vec<StepKind> = [
            (StepKind::Tool, &self.tool),
            (StepKind::Respond, &self.message),
            (StepKind::AskUser, &self.question),
        ]
        .into_iter()
        .filter(|(_, field)| non_blank(field).is_some())
        .map(|(kind, _)| kind)
        .collect();

        match present.as_slice() {
            [] => Ok(None),
            [kind] => Ok(Some(*kind)),
            many => {
                let fields: Vec<String> = many
                    .iter()
                    .map(|k| format!("'{}'", k.payload_field()))
                    .collect();
                Err(ActionError::validation(
                    None,
                    format!(
                        "Ambiguous next_step: {} are set; provide 'type' to choose one",
                        fields.join(", ")
                    ),
                ))
            }
        }
    }

    /// Explicit type if given, otherwise the inferred one
    pub fn effective_kind(&self) -> Result<StepKind, ActionError> {
        if let Some(explicit) = non_blank(&self.step_type) {
            return StepKind::parse(explicit).ok_or_else(|| {
                ActionError::validation(
                    Some(explicit),
                    format!(
                        "Unknown next_step type '{}': expected one of tool, respond, ask_user",
                        explicit
                    ),
                )
            });
        }
        self.infer_kind()?.ok_or_else(|| {
            ActionError::validation(
                None,
                "Cannot determine step type: provide 'type' or 'tool'/'message'/'question'",
            )
        })
    }
}

impl TryFrom<&NextStep> for Step {
    type Error = ActionError;

    fn try_from(next: &NextStep) -> Result<Self, Self::Error> {
        let kind = next.effective_kind()?;
        let payload = match kind {
            StepKind::Tool => non_blank(&next.tool),
            StepKind::Respond => non_blank(&next.message),
            StepKind::AskUser => non_blank(&next.question),
        };
        let Some(payload) = payload else {
            return Err(ActionError::validation(
                Some(kind.as_str()),
                format!(
                    "next_step type={} requires non-empty '{}' field",
                    kind,
                    kind.payload_field()
                ),
            ));
        };

        let step = match kind {
            StepKind::Tool => Step::Tool {
                tool: payload.to_string(),
                args: normalize_tool_args(next.args.clone()),
                description: next.description.clone(),
            },
            StepKind::Respond => Step::Respond {
                message: payload.to_string(),
            },
            StepKind::AskUser => Step::AskUser {
                question: payload.to_string(),
                context: next.context.clone(),
                resume_to: next.resume_to.unwrap_or_default(),
            },
        };
        Ok(step)
    }
}
