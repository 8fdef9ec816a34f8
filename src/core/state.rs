//! Controller state machine types

use serde::{Deserialize, Serialize};

/// Phase the controller re-enters after the user answers a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResumeTarget {
    /// Re-present the last step result together with the answer before the next turn
    #[default]
    Reflecting,
    /// Request the next turn with only the answer appended
    Controller,
}

impl ResumeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeTarget::Reflecting => "reflecting",
            ResumeTarget::Controller => "controller",
        }
    }
}

/// Why a controller run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    /// The model reply could not be decoded
    Parse(String),
    /// The decoded action violated the step payload invariant
    Validation(String),
    /// The model provider failed to produce a turn
    Model(String),
    /// Persisting an oversized tool result failed
    Store(String),
    /// The iteration cap was reached
    IterationBudgetExhausted { limit: usize },
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Parse(msg) => write!(f, "Model reply could not be parsed: {}", msg),
            FailureCause::Validation(msg) => write!(f, "Model reply failed validation: {}", msg),
            FailureCause::Model(msg) => write!(f, "Model request failed: {}", msg),
            FailureCause::Store(msg) => {
                write!(f, "Failed to persist oversized tool output: {}", msg)
            }
            FailureCause::IterationBudgetExhausted { limit } => {
                write!(f, "Iteration budget exhausted after {} iterations", limit)
            }
        }
    }
}

/// Current state of a controller run
///
/// `Requesting -> Parsing -> Executing -> Requesting`, with exits to
/// `AwaitingUser` (suspended) or one of the terminal states. Terminal states
/// have no outgoing transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    /// Awaiting the next model turn
    Requesting,

    /// Decoding the model reply
    Parsing,

    /// Running the decoded step
    Executing,

    /// Suspended until the user answers
    AwaitingUser {
        question: String,
        context: Option<String>,
        resume_to: ResumeTarget,
    },

    /// Finished successfully
    Completed { message: String },

    /// Stopped by a guardrail or an external cancel
    Aborted {
        reason: String,
        message: Option<String>,
    },

    /// Could not proceed
    Failed { cause: FailureCause },
}

impl ControllerState {
    /// Check if the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::Completed { .. }
                | ControllerState::Aborted { .. }
                | ControllerState::Failed { .. }
        )
    }

    /// Check if the run is suspended on a user question
    pub fn is_awaiting_user(&self) -> bool {
        matches!(self, ControllerState::AwaitingUser { .. })
    }

    /// Create a failed state
    pub fn failed(cause: FailureCause) -> Self {
        ControllerState::Failed { cause }
    }

    /// Create an aborted state
    pub fn aborted(reason: impl Into<String>, message: Option<String>) -> Self {
        ControllerState::Aborted {
            reason: reason.into(),
            message,
        }
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: &ControllerState) -> bool {
        use ControllerState::*;

        if self.is_terminal() {
            return false;
        }
        // Terminal states are reachable from every live state (cancel, budget, failure).
        if next.is_terminal() {
            return true;
        }
        matches!(
            (self, next),
            (Requesting, Parsing)
                | (Parsing, Executing)
                | (Executing, Requesting)
                | (Executing, AwaitingUser { .. })
                | (AwaitingUser { .. }, Requesting)
        )
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Requesting => "requesting",
            ControllerState::Parsing => "parsing",
            ControllerState::Executing => "executing",
            ControllerState::AwaitingUser { .. } => "awaiting_user",
            ControllerState::Completed { .. } => "completed",
            ControllerState::Aborted { .. } => "aborted",
            ControllerState::Failed { .. } => "failed",
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::Requesting
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Requesting => write!(f, "Requesting"),
            ControllerState::Parsing => write!(f, "Parsing"),
            ControllerState::Executing => write!(f, "Executing"),
            ControllerState::AwaitingUser { question, .. } => {
                write!(f, "Awaiting user: {}", question)
            }
            ControllerState::Completed { .. } => write!(f, "Completed"),
            ControllerState::Aborted { reason, .. } => write!(f, "Aborted: {}", reason),
            ControllerState::Failed { cause } => write!(f, "Failed: {}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_checks() {
        assert!(ControllerState::Completed {
            message: "done".into()
        }
        .is_terminal());
        assert!(ControllerState::failed(FailureCause::Parse("bad".into())).is_terminal());
        assert!(ControllerState::aborted("cancelled", None).is_terminal());
        assert!(!ControllerState::Requesting.is_terminal());

        let waiting = ControllerState::AwaitingUser {
            question: "Which file?".into(),
            context: None,
            resume_to: ResumeTarget::Controller,
        };
        assert!(waiting.is_awaiting_user());
        assert!(!waiting.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use ControllerState::*;

        assert!(Requesting.can_transition_to(&Parsing));
        assert!(Parsing.can_transition_to(&Executing));
        assert!(Executing.can_transition_to(&Requesting));
        assert!(!Requesting.can_transition_to(&Executing));
        assert!(Parsing.can_transition_to(&ControllerState::failed(FailureCause::Parse(
            "x".into()
        ))));

        let done = Completed {
            message: "ok".into(),
        };
        assert!(!done.can_transition_to(&Requesting));
        assert!(!done.can_transition_to(&ControllerState::aborted("late", None)));
    }

    #[test]
    fn test_failure_display_is_specific() {
        let cause = FailureCause::IterationBudgetExhausted { limit: 3 };
        assert_eq!(cause.to_string(), "Iteration budget exhausted after 3 iterations");

        let state = ControllerState::failed(FailureCause::Validation(
            "next_step type=tool requires non-empty 'tool' field".into(),
        ));
        assert!(state.to_string().contains("'tool' field"));
    }
}
