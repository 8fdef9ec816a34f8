//! End-to-end controller scenarios against a scripted provider

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{ControllerConfig, ControllerLoop, DeliveryMode};
use crate::core::{ControllerError, ControllerState, FailureCause, ResumeTarget};
use crate::llm::{Message, ModelProvider, ProviderDialect, Role, TurnRequest};
use crate::store::OutputStore;
use crate::tools::{register_tool_output_tools, Tool, ToolRegistry, ToolResult, ToolResultMode};

/// Replays canned replies and records what it was sent
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
    formats: Mutex<Vec<Value>>,
    dialect: ProviderDialect,
}

impl ScriptedProvider {
    fn new(replies: Vec<Value>) -> Arc<Self> {
        Self::from_text(replies.into_iter().map(|v| v.to_string()).collect())
    }

    fn from_text(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
            dialect: ProviderDialect::Anthropic,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_context(&self) -> Vec<Message> {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn request_turn(&self, request: TurnRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.messages.to_vec());
        self.formats
            .lock()
            .unwrap()
            .push(request.output_format.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))
    }

    fn dialect(&self) -> ProviderDialect {
        self.dialect
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Returns 500 records reported as exactly 20 KiB
struct ExportTool;

#[async_trait]
impl Tool for ExportTool {
    fn name(&self) -> &str {
        "sales.export"
    }
    fn description(&self) -> &str {
        "Exports sales records"
    }
    fn args_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: &Value) -> Result<ToolResult> {
        let rows: Vec<Value> = (0..500)
            .map(|i| json!({"id": i, "region": if i % 2 == 0 { "eu" } else { "us" }}))
            .collect();
        Ok(ToolResult::success(json!(rows)).with_size_bytes(20480))
    }
}

/// Small inline result
struct PingTool;

#[async_trait]
impl Tool for PingTool {
    fn name(&self) -> &str {
        "ping"
    }
    fn description(&self) -> &str {
        "Replies pong"
    }
    fn args_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _args: &Value) -> Result<ToolResult> {
        Ok(ToolResult::success(json!("pong")))
    }
}

/// Small payload reported at a fixed size, with a declared result mode
struct SizedTool {
    name: &'static str,
    mode: ToolResultMode,
    size_bytes: u64,
}

#[async_trait]
impl Tool for SizedTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "Returns a fixed-size result"
    }
    fn args_schema(&self) -> Value {
        json!({"type": "object"})
    }
    fn result_mode(&self) -> ToolResultMode {
        self.mode
    }
    async fn execute(&self, _args: &Value) -> Result<ToolResult> {
        Ok(ToolResult::success(json!({"rows": 3})).with_size_bytes(self.size_bytes))
    }
}

fn setup(provider: Arc<ScriptedProvider>, config: ControllerConfig) -> (ControllerLoop, TempDir) {
    setup_with_tools(provider, config, Vec::new())
}

fn setup_with_tools(
    provider: Arc<ScriptedProvider>,
    config: ControllerConfig,
    extra: Vec<SizedTool>,
) -> (ControllerLoop, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = OutputStore::new(temp.path());

    let mut tools = ToolRegistry::new();
    tools.register(ExportTool).unwrap();
    tools.register(PingTool).unwrap();
    for tool in extra {
        tools.register(tool).unwrap();
    }
    register_tool_output_tools(&mut tools, store.clone()).unwrap();

    let controller = ControllerLoop::new(config, provider, Arc::new(tools), store)
        .with_conversation_id("conv-test");
    (controller, temp)
}

fn tool_step(tool: &str, args: Value) -> Value {
    json!({"action": "next_step", "type": "tool", "tool": tool, "args": args})
}

fn complete(message: &str) -> Value {
    json!({"action": "complete", "message": message})
}

#[tokio::test]
async fn test_large_result_is_persisted_and_traversable() {
    let provider = ScriptedProvider::new(vec![
        tool_step("sales.export", json!({})),
        tool_step("tool_outputs.stats", json!({})),
        tool_step(
            "tool_outputs.sample",
            json!({"path": "$", "size": 10, "strategy": "first"}),
        ),
        complete("500 sales rows"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("Summarize the export").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Completed {
            message: "500 sales rows".into()
        }
    );
    assert_eq!(provider.calls(), 4);

    let steps = controller.steps();
    assert_eq!(steps.len(), 3);

    let descriptor = steps[0].persisted.as_ref().expect("export should be persisted");
    assert_eq!(descriptor.size_bytes, 20480);
    assert_eq!(descriptor.tool_name, "sales.export");
    assert!(descriptor
        .available_operations
        .contains(&"tool_outputs.stats".to_string()));
    assert!(descriptor
        .available_operations
        .contains(&"tool_outputs.sample".to_string()));
    assert_eq!(controller.last_persisted_id(), Some(descriptor.id.as_str()));

    // The model saw the descriptor, never the raw rows
    let context = provider.last_context();
    let export_result = &context[2];
    assert_eq!(export_result.role, Role::User);
    assert!(export_result.content.contains("persisted_output"));
    assert!(export_result.content.contains(&descriptor.id));

    // Traversal tools were hydrated with the persisted id and never persisted themselves
    assert_eq!(steps[1].args["id"], json!(descriptor.id));
    assert!(steps[1].success);
    assert!(steps[1].persisted.is_none());
    assert!(context[4].content.contains("\"root_type\":\"array\""));
    assert!(context[4].content.contains("\"root_length\":500"));

    assert!(steps[2].success);
    let sample_message = &context[6].content;
    let body: Value = serde_json::from_str(
        sample_message
            .split_once('\n')
            .map(|(_, body)| body)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body["indices"], json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
    assert_eq!(body["total_items"], json!(500));
}

#[tokio::test]
async fn test_malformed_next_step_fails_first_turn() {
    let provider = ScriptedProvider::new(vec![
        json!({"action": "next_step", "type": "tool", "args": {}}),
        complete("never reached"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("go").await.unwrap();
    let ControllerState::Failed {
        cause: FailureCause::Validation(message),
    } = state
    else {
        panic!("expected validation failure, got {:?}", state);
    };
    assert!(message.contains("requires non-empty 'tool' field"));
    assert_eq!(provider.calls(), 1);
    assert!(controller.steps().is_empty());
}

#[tokio::test]
async fn test_payloadless_next_step_fails_first_turn() {
    for reply in [
        json!({"action": "next_step"}),
        json!({"action": "next_step", "thinking": {"plan": "look around first"}}),
    ] {
        let provider = ScriptedProvider::new(vec![reply.clone(), reply]);
        let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

        let state = controller.run("go").await.unwrap();
        let ControllerState::Failed {
            cause: FailureCause::Validation(message),
        } = state
        else {
            panic!("expected validation failure, got {:?}", state);
        };
        assert!(message.contains("Cannot determine step type"));
        assert_eq!(provider.calls(), 1);
        assert!(controller.steps().is_empty());
    }
}

#[tokio::test]
async fn test_unparseable_reply_fails_with_parse_cause() {
    let provider = ScriptedProvider::from_text(vec!["I think we should look at sales".into()]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("go").await.unwrap();
    assert!(matches!(
        state,
        ControllerState::Failed {
            cause: FailureCause::Parse(_)
        }
    ));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_fenced_reply_with_prose() {
    let reply = format!(
        "Calling ping now.\n```json\n{}\n```",
        tool_step("ping", json!("{}"))
    );
    let provider =
        ScriptedProvider::from_text(vec![reply, complete("pong received").to_string()]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("ping it").await.unwrap();
    assert!(matches!(state, ControllerState::Completed { .. }));
    assert_eq!(controller.steps().len(), 1);
    assert!(controller.steps()[0].persisted.is_none());
    assert!(provider.last_context()[2].content.contains("pong"));
}

#[tokio::test]
async fn test_respond_step_completes() {
    let provider = ScriptedProvider::new(vec![json!({
        "action": "next_step",
        "thinking": "nothing to do",
        "message": "Hello!"
    })]);
    let (mut controller, _temp) = setup(provider, ControllerConfig::default());

    let state = controller.run("hi").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Completed {
            message: "Hello!".into()
        }
    );
}

#[tokio::test]
async fn test_guardrail_stop_aborts() {
    let provider = ScriptedProvider::new(vec![json!({
        "action": "guardrail_stop",
        "reason": "pii",
        "message": "Refusing to export personal data"
    })]);
    let (mut controller, _temp) = setup(provider, ControllerConfig::default());

    let state = controller.run("dump users").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Aborted {
            reason: "pii".into(),
            message: Some("Refusing to export personal data".into())
        }
    );
    assert!(state.is_terminal());
}

#[tokio::test]
async fn test_ask_user_and_resume_reflecting() {
    let provider = ScriptedProvider::new(vec![
        tool_step("ping", json!({})),
        json!({"action": "ask_user", "question": "Which region?"}),
        complete("EU it is"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("report").await.unwrap();
    assert_eq!(
        state,
        ControllerState::AwaitingUser {
            question: "Which region?".into(),
            context: None,
            resume_to: ResumeTarget::Reflecting,
        }
    );

    // A new run is refused while the question is pending
    assert!(controller.run("something else").await.is_err());

    let state = controller.resume("eu").await.unwrap();
    assert!(matches!(state, ControllerState::Completed { .. }));

    let last = provider.last_context();
    let answer = &last[last.len() - 1];
    assert!(answer.content.starts_with("User answered: eu"));
    assert!(answer.content.contains("pong"));
}

#[tokio::test]
async fn test_ask_user_step_resume_to_controller() {
    let provider = ScriptedProvider::new(vec![
        json!({
            "action": "next_step",
            "type": "ask_user",
            "question": "Proceed?",
            "context": "This deletes rows",
            "resume_to": "controller"
        }),
        complete("ok"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("clean up").await.unwrap();
    assert!(state.is_awaiting_user());

    controller.resume("yes").await.unwrap();
    let last = provider.last_context();
    assert_eq!(last[last.len() - 1].content, "User answered: yes");
}

#[tokio::test]
async fn test_resume_when_not_awaiting() {
    let provider = ScriptedProvider::new(vec![complete("done")]);
    let (mut controller, _temp) = setup(provider, ControllerConfig::default());

    controller.run("x").await.unwrap();
    let err = controller.resume("late answer").await.unwrap_err();
    assert_eq!(err, ControllerError::NotAwaitingUser("completed".into()));
}

#[tokio::test]
async fn test_iteration_budget() {
    let provider = ScriptedProvider::new(vec![
        tool_step("ping", json!({})),
        tool_step("ping", json!({})),
        tool_step("ping", json!({})),
    ]);
    let config = ControllerConfig::default().with_max_iterations(2);
    let (mut controller, _temp) = setup(provider.clone(), config);

    let state = controller.run("loop forever").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Failed {
            cause: FailureCause::IterationBudgetExhausted { limit: 2 }
        }
    );
    assert_eq!(provider.calls(), 2);
    assert_eq!(controller.iterations(), 2);
}

#[tokio::test]
async fn test_cancel_before_run() {
    let provider = ScriptedProvider::new(vec![complete("unused")]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    controller.cancellation_token().cancel();
    let state = controller.run("go").await.unwrap();
    assert_eq!(state, ControllerState::aborted("cancelled", None));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_cancel_is_spent_by_one_run() {
    let provider = ScriptedProvider::new(vec![complete("second run")]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    controller.cancellation_token().cancel();
    let state = controller.run("first").await.unwrap();
    assert_eq!(state, ControllerState::aborted("cancelled", None));

    let state = controller.run("second").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Completed {
            message: "second run".into()
        }
    );
    assert_eq!(provider.calls(), 1);
    assert!(!controller.cancellation_token().is_cancelled());
}

#[tokio::test]
async fn test_external_cancel_token_stays_with_caller() {
    let provider = ScriptedProvider::new(vec![complete("unused")]);
    let token = CancellationToken::new();
    let (controller, _temp) = setup(provider.clone(), ControllerConfig::default());
    let mut controller = controller.with_cancellation_token(token.clone());

    token.cancel();
    for message in ["first", "second"] {
        let state = controller.run(message).await.unwrap();
        assert_eq!(state, ControllerState::aborted("cancelled", None));
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_new_run_after_failure_starts_fresh() {
    let provider = ScriptedProvider::new(vec![
        tool_step("ping", json!({})),
        tool_step("ping", json!({})),
        complete("done"),
    ]);
    let config = ControllerConfig::default().with_max_iterations(1);
    let (mut controller, _temp) = setup(provider.clone(), config);

    let state = controller.run("one").await.unwrap();
    assert!(matches!(state, ControllerState::Failed { .. }));

    // Fresh one-turn budget: one more tool step, then the cap again
    let state = controller.run("two").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Failed {
            cause: FailureCause::IterationBudgetExhausted { limit: 1 }
        }
    );
    assert_eq!(controller.iterations(), 1);
    assert_eq!(controller.steps().len(), 2);
}

#[tokio::test]
async fn test_persist_mode_tool_is_always_persisted() {
    let provider = ScriptedProvider::new(vec![tool_step("mail.threads", json!({})), complete("ok")]);
    let tool = SizedTool {
        name: "mail.threads",
        mode: ToolResultMode::Persist,
        size_bytes: 40,
    };
    let (mut controller, _temp) =
        setup_with_tools(provider.clone(), ControllerConfig::default(), vec![tool]);

    controller.run("threads").await.unwrap();
    let step = &controller.steps()[0];
    assert_eq!(step.delivery, DeliveryMode::Persist);
    let descriptor = step.persisted.as_ref().unwrap();
    assert_eq!(descriptor.result_mode, ToolResultMode::Persist);
    assert!(!descriptor.forced_persist);
    assert!(provider.last_context()[2].content.contains("persisted_output"));
}

#[tokio::test]
async fn test_inline_mode_tool_respects_hard_cap() {
    let provider = ScriptedProvider::new(vec![
        tool_step("report.small", json!({})),
        tool_step("report.huge", json!({})),
        complete("ok"),
    ]);
    let tools = vec![
        SizedTool {
            name: "report.small",
            mode: ToolResultMode::Inline,
            size_bytes: 20480,
        },
        SizedTool {
            name: "report.huge",
            mode: ToolResultMode::Inline,
            size_bytes: 100_000,
        },
    ];
    let (mut controller, _temp) =
        setup_with_tools(provider.clone(), ControllerConfig::default(), tools);

    controller.run("reports").await.unwrap();
    let steps = controller.steps();

    // Above the auto threshold, under the hard cap: stays inline
    assert_eq!(steps[0].delivery, DeliveryMode::Inline);
    assert!(steps[0].persisted.is_none());

    assert_eq!(steps[1].delivery, DeliveryMode::Persist);
    let descriptor = steps[1].persisted.as_ref().unwrap();
    assert!(descriptor.forced_persist);
    assert_eq!(
        descriptor.forced_reason.as_deref(),
        Some("inline_size_exceeds_hard_limit")
    );
    assert_eq!(controller.last_persisted_id(), Some(descriptor.id.as_str()));
}

#[tokio::test]
async fn test_provider_error_fails_with_model_cause() {
    let provider = ScriptedProvider::new(vec![]);
    let (mut controller, _temp) = setup(provider, ControllerConfig::default());

    let state = controller.run("go").await.unwrap();
    let ControllerState::Failed {
        cause: FailureCause::Model(message),
    } = state
    else {
        panic!("expected model failure");
    };
    assert!(message.contains("script exhausted"));
}

#[tokio::test]
async fn test_unknown_output_id_is_rejected_before_dispatch() {
    let provider = ScriptedProvider::new(vec![
        tool_step("tool_outputs.stats", json!({"id": "does-not-exist"})),
        complete("gave up"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("inspect").await.unwrap();
    assert!(matches!(state, ControllerState::Completed { .. }));

    let step = &controller.steps()[0];
    assert!(!step.success);
    let context = provider.last_context();
    assert!(context[2].content.contains("No stored output with id 'does-not-exist'"));
    assert!(context[2].content.contains("tool_outputs.list"));
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let provider = ScriptedProvider::new(vec![
        tool_step("weather", json!({})),
        complete("no weather tool"),
    ]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    let state = controller.run("weather?").await.unwrap();
    assert!(matches!(state, ControllerState::Completed { .. }));
    assert!(!controller.steps()[0].success);
    assert!(provider.last_context()[2]
        .content
        .contains("Unknown tool 'weather'"));
}

#[tokio::test]
async fn test_dialect_override_shapes_output_format() {
    let provider = ScriptedProvider::new(vec![complete("done")]);
    let config = ControllerConfig::default().with_dialect(ProviderDialect::Gemini);
    let (mut controller, _temp) = setup(provider.clone(), config);
    assert_eq!(controller.dialect(), ProviderDialect::Gemini);

    controller.run("x").await.unwrap();
    let formats = provider.formats.lock().unwrap();
    assert!(formats[0].get("response_schema").is_some());
}

#[tokio::test]
async fn test_context_persists_across_runs() {
    let provider = ScriptedProvider::new(vec![complete("first"), complete("second")]);
    let (mut controller, _temp) = setup(provider.clone(), ControllerConfig::default());

    controller.run("one").await.unwrap();
    let state = controller.run("two").await.unwrap();
    assert_eq!(
        state,
        ControllerState::Completed {
            message: "second".into()
        }
    );
    // user, assistant, user
    assert_eq!(provider.last_context().len(), 3);
    assert_eq!(controller.messages().len(), 4);
}
