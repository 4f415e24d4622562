// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Integration tests driving [`Agent::handle_message`] end to end against
//! [`ScriptedMockProvider`], covering multi-round tool calls, compaction,
//! cancellation, and the max-iterations guard.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use agentrt_config::RuntimeConfig;
use agentrt_model::mock::ScriptedMockProvider;
use agentrt_model::ResponseEvent;
use agentrt_tools::{ApprovalPolicy, OutputCategory, Tool, ToolCall, ToolRegistry, ToolResult};

use crate::message::AgentConfig;
use crate::runtime_context::AgentRuntimeContext;
use crate::{Agent, StreamEvent};

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its `text` argument back"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "text": { "type": "string" } } })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let text = call.args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        ToolResult::ok("echo", format!("echo:{text}"))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "boom"
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn arun(&self, _call: &ToolCall) -> ToolResult {
        ToolResult::err("boom", "simulated failure")
    }
}

fn test_registry() -> Arc<ToolRegistry> {
    let mut reg = ToolRegistry::new();
    reg.register(EchoTool);
    reg.register(FailingTool);
    Arc::new(reg)
}

fn agent_with(provider: ScriptedMockProvider, runtime_config: RuntimeConfig) -> Agent {
    Agent::new(
        Arc::new(provider),
        test_registry(),
        AgentConfig::new("conv-1", PathBuf::from("/workspace"), "scripted-mock-model"),
        Arc::new(runtime_config),
        AgentRuntimeContext::default(),
        100_000,
    )
}

async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn single_text_turn_emits_complete() {
    let mut agent = agent_with(ScriptedMockProvider::always_text("hi there"), RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("hello", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Complete { content, .. } if content == "hi there")));

    let complete_blocks = events.iter().find_map(|e| match e {
        StreamEvent::Complete { tool_calls, .. } => Some(tool_calls),
        _ => None,
    });
    let blocks = complete_blocks.expect("complete event present").as_ref().expect("blocks present for text turn");
    assert_eq!(blocks.len(), 1);
    assert!(matches!(&blocks[0], crate::TurnBlock::Text { content } if content == "hi there"));
}

#[tokio::test]
async fn system_message_injected_once_on_first_turn() {
    let mut agent = agent_with(ScriptedMockProvider::always_text("ok"), RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("hello", Vec::new(), None, None, tx).await.unwrap();
    let _ = collect(rx).await;

    let system_count = agent.session().messages.iter().filter(|m| m.role == agentrt_model::Role::System).count();
    assert_eq!(system_count, 1);
}

#[tokio::test]
async fn tool_call_round_trip_executes_and_reports_result() {
    let provider = ScriptedMockProvider::tool_then_text("call-1", "echo", r#"{"text":"hi"}"#, "done");
    let mut agent = agent_with(provider, RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("say hi", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;

    assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCall { tool_name, .. } if tool_name == "echo")));
    let tool_result = events.iter().find_map(|e| match e {
        StreamEvent::ToolResult { result, .. } => Some(result),
        _ => None,
    });
    assert!(tool_result.is_some_and(|r| r.text.as_deref() == Some("echo:hi")));
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Complete { content, .. } if content == "done")));
}

#[tokio::test]
async fn failing_tool_reports_error_result_without_aborting_turn() {
    let provider = ScriptedMockProvider::tool_then_text("call-1", "boom", "{}", "recovered");
    let mut agent = agent_with(provider, RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("try it", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;

    let tool_result = events.iter().find_map(|e| match e {
        StreamEvent::ToolResult { result, is_error, .. } => Some((result, *is_error)),
        _ => None,
    });
    assert!(tool_result.is_some_and(|(_, is_error)| is_error));
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Complete { content, .. } if content == "recovered")));
}

#[tokio::test]
async fn unknown_tool_name_reports_error_result() {
    let provider = ScriptedMockProvider::tool_then_text("call-1", "does_not_exist", "{}", "done");
    let mut agent = agent_with(provider, RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("try it", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;
    assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolResult { is_error: true, .. })));
}

#[tokio::test]
async fn second_turn_appends_to_existing_history() {
    let mut agent = agent_with(
        ScriptedMockProvider::new(vec![
            vec![ResponseEvent::TextDelta("first".into()), ResponseEvent::Done],
            vec![ResponseEvent::TextDelta("second".into()), ResponseEvent::Done],
        ]),
        RuntimeConfig::default(),
    );

    let (tx1, rx1) = mpsc::channel(64);
    agent.handle_message("one", Vec::new(), None, None, tx1).await.unwrap();
    let _ = collect(rx1).await;
    let after_first = agent.session().messages.len();

    let (tx2, rx2) = mpsc::channel(64);
    agent.handle_message("two", Vec::new(), None, None, tx2).await.unwrap();
    let _ = collect(rx2).await;
    let after_second = agent.session().messages.len();

    assert!(after_second > after_first);
    assert!(agent.session().messages.iter().any(|m| m.as_text() == Some("one")));
    assert!(agent.session().messages.iter().any(|m| m.as_text() == Some("two")));
}

#[tokio::test]
async fn max_iterations_guard_emits_error_event() {
    // Every round returns a tool call with no final text, so the loop never
    // naturally terminates and must hit the iteration guard.
    let scripts = (0..25)
        .map(|i| {
            vec![
                ResponseEvent::ToolCall {
                    index: 0,
                    id: format!("call-{i}"),
                    name: "echo".into(),
                    arguments: r#"{"text":"x"}"#.into(),
                },
                ResponseEvent::Done,
            ]
        })
        .collect();
    let mut agent = agent_with(ScriptedMockProvider::new(scripts), RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(256);
    agent.handle_message("loop forever", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Error { code, .. } if code == "max_iterations")));
}

#[tokio::test]
async fn cancelling_mid_turn_stops_before_completion() {
    let mut agent = agent_with(ScriptedMockProvider::always_text("should not finish"), RuntimeConfig::default());
    let cancel = agent.cancel_flag();
    cancel.store(true, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("hello", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;
    assert!(events.iter().all(|e| !matches!(e, StreamEvent::Complete { .. })));
}

#[tokio::test]
async fn compaction_triggers_when_session_is_near_its_token_budget() {
    let mut runtime_config = RuntimeConfig::default();
    runtime_config.compaction_keep_recent = 2;

    let mut agent = Agent::new(
        Arc::new(ScriptedMockProvider::new(vec![
            vec![ResponseEvent::TextDelta("summary of prior turns".into()), ResponseEvent::Done],
            vec![ResponseEvent::TextDelta("final reply".into()), ResponseEvent::Done],
        ])),
        test_registry(),
        AgentConfig::new("conv-1", PathBuf::from("/workspace"), "scripted-mock-model"),
        Arc::new(runtime_config),
        AgentRuntimeContext::default(),
        // A tiny budget forces `is_near_limit` to trip immediately.
        200,
    );

    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("a message long enough to matter for token accounting", Vec::new(), None, None, tx)
        .await
        .unwrap();
    let _ = collect(rx).await;

    // Compaction replaces history with [system, assistant(summary), ...recent];
    // the session should never have been allowed to grow unbounded.
    assert!(agent.session().messages.len() < 6);
}

#[tokio::test]
async fn question_tool_call_emits_question_event_before_tool_call_event() {
    let args = json!({
        "title": "Pick one",
        "questions": [{
            "id": "q1",
            "prompt": "Continue?",
            "options": ["yes", "no"],
            "allow_multiple": false,
            "required": true,
        }]
    })
    .to_string();
    let provider = ScriptedMockProvider::tool_then_text("call-1", "question", args, "done");
    let mut agent = agent_with(provider, RuntimeConfig::default());
    let (tx, rx) = mpsc::channel(64);
    agent.handle_message("ask the user", Vec::new(), None, None, tx).await.unwrap();
    let events = collect(rx).await;

    let question_idx = events.iter().position(|e| matches!(e, StreamEvent::Question { .. }));
    let tool_call_idx = events.iter().position(|e| matches!(e, StreamEvent::ToolCall { .. }));
    assert!(question_idx.is_some() && tool_call_idx.is_some());
    assert!(question_idx.unwrap() < tool_call_idx.unwrap());
}
