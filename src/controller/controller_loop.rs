//! Controller Loop
//!
//! The state machine that drives one conversation:
//! - Requesting: ask the model for its next action
//! - Parsing: decode and validate the reply
//! - Executing: run a tool step, or settle into a terminal/awaiting state
//!
//! Tool results that resolve to persisted delivery (by size and the tool's
//! result mode) are written to the output store and replaced by a descriptor
//! before they reach the model.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::{ControllerError, ControllerState, FailureCause, ResumeTarget};
use crate::llm::{output_format, Message, ModelProvider, ProviderDialect, ToolSpec, TurnRequest};
use crate::store::{OutputStore, StoredOutput};
use crate::tools::tool_outputs::requires_output_id;
use crate::tools::{ToolRegistry, ToolResult};

use super::action::{ControllerAction, Step};
use super::config::ControllerConfig;
use super::delivery::{DeliveryMode, OutputDelivery};
use super::descriptor::PersistedOutputDescriptor;
use super::executor::ToolExecutor;
use super::parser::parse_reply;

/// Record of one executed tool step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Model turn (1-based) that requested the step
    pub iteration: usize,
    pub tool: String,
    /// Arguments as executed, after id hydration
    pub args: Value,
    pub success: bool,
    pub size_bytes: u64,
    pub delivery: DeliveryMode,
    /// Set when the result was persisted instead of inlined
    pub persisted: Option<PersistedOutputDescriptor>,
    pub duration_ms: u64,
}

/// Drives model turns and tool steps until a terminal or awaiting state
///
/// # Example
///
/// ```ignore
/// let mut tools = ToolRegistry::new();
/// register_tool_output_tools(&mut tools, store.clone())?;
///
/// let mut controller = ControllerLoop::new(config, provider, Arc::new(tools), store);
/// match controller.run("Summarize the sales export").await? {
///     ControllerState::AwaitingUser { question, .. } => { /* ask, then resume */ }
///     state => println!("{}", state),
/// }
/// ```
pub struct ControllerLoop {
    config: ControllerConfig,
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    store: OutputStore,
    tool_specs: Vec<ToolSpec>,
    output_format: Value,
    state: ControllerState,
    messages: Vec<Message>,
    conversation_id: String,
    message_id: String,
    iterations: usize,
    steps: Vec<StepRecord>,
    last_persisted_id: Option<String>,
    last_step_result: Option<String>,
    cancel: CancellationToken,
    external_cancel: bool,
}

impl ControllerLoop {
    pub fn new(
        config: ControllerConfig,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        store: OutputStore,
    ) -> Self {
        let dialect = config.dialect.unwrap_or_else(|| provider.dialect());
        let tool_specs = tools.specs();
        tracing::info!(
            "[Controller] Created with provider {} ({}), {} tools",
            provider.provider_name(),
            dialect,
            tool_specs.len()
        );

        Self {
            config,
            provider,
            tools,
            store,
            tool_specs,
            output_format: output_format(dialect),
            state: ControllerState::default(),
            messages: Vec::new(),
            conversation_id: uuid::Uuid::new_v4().to_string(),
            message_id: String::new(),
            iterations: 0,
            steps: Vec::new(),
            last_persisted_id: None,
            last_step_result: None,
            cancel: CancellationToken::new(),
            external_cancel: false,
        }
    }

    /// Use a fixed conversation id for persisted outputs
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = id.into();
        self
    }

    /// Share an external cancellation token
    ///
    /// The caller owns it: once cancelled, every later run aborts until the
    /// loop is rebuilt with another token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self.external_cancel = true;
        self
    }

    /// Token that aborts the current (or next) run at an iteration boundary
    ///
    /// An internal token is spent by the abort it causes and replaced, so
    /// fetch it again for later runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Model turns taken by the current run
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Id of the most recently persisted output, if any
    pub fn last_persisted_id(&self) -> Option<&str> {
        self.last_persisted_id.as_deref()
    }

    pub fn dialect(&self) -> ProviderDialect {
        self.config
            .dialect
            .unwrap_or_else(|| self.provider.dialect())
    }

    /// Start a run for a new user message
    ///
    /// Each run is a new state-machine instance starting in `Requesting`,
    /// with its own iteration budget; a terminal state of the previous run is
    /// discarded rather than transitioned out of. Context from earlier runs
    /// is kept. Fails while a question is pending; answer it with
    /// [`ControllerLoop::resume`] instead.
    pub async fn run(
        &mut self,
        user_message: impl Into<String>,
    ) -> Result<ControllerState, ControllerError> {
        if self.state.is_awaiting_user() {
            return Err(ControllerError::InvalidTransition {
                from: self.state.name().to_string(),
                to: "requesting (a question is pending; resume instead)".to_string(),
            });
        }

        let user_message = user_message.into();
        tracing::info!("[Controller] New run: {}", user_message);

        tracing::debug!("[Controller] New state machine (previous: {})", self.state.name());
        self.state = ControllerState::default();
        self.iterations = 0;
        self.message_id = uuid::Uuid::new_v4().to_string();
        self.messages.push(Message::user(user_message));

        Ok(self.advance().await)
    }

    /// Answer a pending question and continue the run
    pub async fn resume(
        &mut self,
        answer: impl Into<String>,
    ) -> Result<ControllerState, ControllerError> {
        let ControllerState::AwaitingUser { resume_to, .. } = &self.state else {
            return Err(ControllerError::NotAwaitingUser(self.state.name().to_string()));
        };
        let resume_to = *resume_to;
        let answer = answer.into();
        tracing::info!("[Controller] Resuming ({:?}) with answer: {}", resume_to, answer);

        let content = match (resume_to, &self.last_step_result) {
            (ResumeTarget::Reflecting, Some(previous)) => format!(
                "User answered: {}\n\nReflect on the previous step result before choosing the next action:\n{}",
                answer, previous
            ),
            _ => format!("User answered: {}", answer),
        };
        self.messages.push(Message::user(content));
        self.transition(ControllerState::Requesting);

        Ok(self.advance().await)
    }

    fn transition(&mut self, next: ControllerState) {
        if !self.state.can_transition_to(&next) {
            tracing::error!(
                "[Controller] Illegal transition {} -> {}",
                self.state.name(),
                next.name()
            );
        }
        tracing::debug!("[Controller] {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn fail(&mut self, cause: FailureCause) {
        tracing::warn!("[Controller] Run failed: {}", cause);
        self.transition(ControllerState::failed(cause));
    }

    async fn advance(&mut self) -> ControllerState {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("[Controller] Cancelled after {} turns", self.iterations);
                self.transition(ControllerState::aborted("cancelled", None));
                if !self.external_cancel {
                    self.cancel = CancellationToken::new();
                }
                break;
            }

            if self.iterations >= self.config.max_iterations {
                self.fail(FailureCause::IterationBudgetExhausted {
                    limit: self.config.max_iterations,
                });
                break;
            }
            self.iterations += 1;

            tracing::debug!(
                "[Controller] Turn {} ({} messages)",
                self.iterations,
                self.messages.len()
            );
            let request = TurnRequest {
                system_prompt: &self.config.system_prompt,
                messages: &self.messages,
                tools: &self.tool_specs,
                output_format: &self.output_format,
            };
            let reply = match self.provider.request_turn(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.fail(FailureCause::Model(e.to_string()));
                    break;
                }
            };
            self.messages.push(Message::assistant(reply.clone()));

            self.transition(ControllerState::Parsing);
            let action = match parse_reply(&reply) {
                Ok(action) => action,
                Err(e) if e.is_validation() => {
                    self.fail(FailureCause::Validation(e.to_string()));
                    break;
                }
                Err(e) => {
                    self.fail(FailureCause::Parse(e.to_string()));
                    break;
                }
            };
            tracing::info!("[Controller] Action: {}", action.name());

            self.transition(ControllerState::Executing);
            let next = match action {
                ControllerAction::Complete { message } => ControllerState::Completed { message },
                ControllerAction::GuardrailStop { reason, message } => {
                    ControllerState::aborted(reason, message)
                }
                ControllerAction::AskUser {
                    question,
                    context,
                    resume_to,
                } => ControllerState::AwaitingUser {
                    question,
                    context,
                    resume_to,
                },
                ControllerAction::NextStep(next) => match Step::try_from(&next) {
                    Err(e) => ControllerState::failed(FailureCause::Validation(e.to_string())),
                    Ok(Step::Respond { message }) => ControllerState::Completed { message },
                    Ok(Step::AskUser {
                        question,
                        context,
                        resume_to,
                    }) => ControllerState::AwaitingUser {
                        question,
                        context,
                        resume_to,
                    },
                    Ok(Step::Tool {
                        tool,
                        args,
                        description,
                    }) => {
                        if let Some(description) = description {
                            tracing::debug!("[Controller] Step: {}", description);
                        }
                        match self.execute_tool_step(tool, args).await {
                            Ok(()) => ControllerState::Requesting,
                            Err(cause) => ControllerState::failed(cause),
                        }
                    }
                },
            };

            let settled = !matches!(next, ControllerState::Requesting);
            if let ControllerState::Failed { cause } = next {
                self.fail(cause);
            } else {
                self.transition(next);
            }
            if settled {
                break;
            }
        }

        tracing::info!(
            "[Controller] Stopped in {} after {} turns",
            self.state.name(),
            self.iterations
        );
        self.state.clone()
    }

    /// Run one tool step and feed its result (or descriptor) back as context
    async fn execute_tool_step(&mut self, tool: String, mut args: Value) -> Result<(), FailureCause> {
        if requires_output_id(&tool) {
            self.hydrate_output_id(&tool, &mut args);
        }

        let started = Instant::now();
        let result = match self.preflight(&tool, &args) {
            Some(rejection) => rejection,
            None => {
                ToolExecutor::execute(&self.tools, &tool, &args, self.config.tool_timeout()).await
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let result_mode = self
            .tools
            .get(&tool)
            .map(|t| t.result_mode())
            .unwrap_or_default();
        let delivery = OutputDelivery::resolve(
            &tool,
            result_mode,
            result.size_bytes,
            self.config.inline_threshold_bytes,
            self.config.inline_hard_max_bytes,
        );

        let (content, persisted) = if delivery.is_persist() {
            let output = StoredOutput::new(
                tool.as_str(),
                self.conversation_id.as_str(),
                self.message_id.as_str(),
                !result.is_error,
                result.size_bytes,
                args.clone(),
                result.payload.clone(),
            );
            self.store
                .write(&output)
                .map_err(|e| FailureCause::Store(e.to_string()))?;

            let descriptor =
                PersistedOutputDescriptor::for_output(&output, self.config.preview_max_chars)
                    .with_delivery(&delivery);
            if let Some(reason) = delivery.forced_reason {
                tracing::info!("[Controller] Forced persistence of {}: {}", tool, reason);
            }
            tracing::info!(
                "[Controller] Persisted {} bytes from {} as {}",
                descriptor.size_bytes,
                tool,
                descriptor.id
            );
            self.last_persisted_id = Some(descriptor.id.clone());
            (descriptor.to_context_message(), Some(descriptor))
        } else {
            (inline_result_message(&tool, &result), None)
        };

        self.steps.push(StepRecord {
            iteration: self.iterations,
            tool,
            args,
            success: !result.is_error,
            size_bytes: result.size_bytes,
            delivery: delivery.resolved,
            persisted,
            duration_ms,
        });
        self.last_step_result = Some(content.clone());
        self.messages.push(Message::user(content));
        Ok(())
    }

    /// Fill a missing output id from the most recent persisted output
    fn hydrate_output_id(&self, tool: &str, args: &mut Value) {
        let Some(last_id) = &self.last_persisted_id else {
            return;
        };
        let Value::Object(map) = args else {
            return;
        };
        let missing = map
            .get("id")
            .and_then(Value::as_str)
            .map_or(true, |id| id.trim().is_empty());
        if missing {
            tracing::debug!("[Controller] Hydrated {} id with {}", tool, last_id);
            map.insert("id".to_string(), Value::String(last_id.clone()));
        }
    }

    /// Reject a traversal call whose id is not in the store
    fn preflight(&self, tool: &str, args: &Value) -> Option<ToolResult> {
        if !requires_output_id(tool) {
            return None;
        }
        let id = args.get("id").and_then(Value::as_str)?.trim();
        if id.is_empty() || self.store.exists(id) {
            return None;
        }
        tracing::warn!("[Controller] {} called with unknown id {}", tool, id);
        Some(ToolResult::error(format!(
            "No stored output with id '{}'. Call tool_outputs.list to see the available ids.",
            id
        )))
    }
}

fn inline_result_message(tool: &str, result: &ToolResult) -> String {
    let body = serde_json::to_string(&result.payload).unwrap_or_default();
    if result.is_error {
        format!("Tool '{}' failed:\n{}", tool, body)
    } else {
        format!("Tool '{}' result:\n{}", tool, body)
    }
}
