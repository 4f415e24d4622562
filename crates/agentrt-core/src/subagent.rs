// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Subagent execution: runs a restricted, read-only child [`Agent`] to
//! completion and folds its event trace into a single [`ToolResult`] for the
//! `task` tool (§4.4).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use agentrt_config::RuntimeConfig;
use agentrt_model::ModelProvider;
use agentrt_tools::{SubagentRunner, ToolRegistry, ToolResult};

use crate::agent::Agent;
use crate::events::StreamEvent;
use crate::message::AgentConfig;
use crate::runtime_context::AgentRuntimeContext;

/// Context budget for a subagent run — smaller than a typical top-level
/// conversation since subagents are scoped to one exploration task.
const SUBAGENT_MAX_CONTEXT_TOKENS: usize = 64_000;

/// Executes `task` tool invocations by running a child agent restricted to
/// read-only tools. The child inherits the parent's MCP servers and
/// deep-thinking default; its conversation id is `"<parent_id>:<type>"`.
pub struct CoreSubagentRunner {
    model: Arc<dyn ModelProvider>,
    read_only_tools: Arc<ToolRegistry>,
    runtime_config: Arc<RuntimeConfig>,
    parent_config: AgentConfig,
    runtime: AgentRuntimeContext,
}

impl CoreSubagentRunner {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        read_only_tools: Arc<ToolRegistry>,
        runtime_config: Arc<RuntimeConfig>,
        parent_config: AgentConfig,
        runtime: AgentRuntimeContext,
    ) -> Self {
        Self { model, read_only_tools, runtime_config, parent_config, runtime }
    }
}

#[async_trait]
impl SubagentRunner for CoreSubagentRunner {
    async fn run_subagent(&self, subagent_type: &str, description: &str, prompt: &str) -> ToolResult {
        let mut child_config = AgentConfig::new(
            format!("{}:{subagent_type}", self.parent_config.conversation_id),
            self.parent_config.workspace_root.clone(),
            self.parent_config.model.clone(),
        );
        child_config.deep_thinking_default = self.parent_config.deep_thinking_default;
        child_config.mcp_servers = self.parent_config.mcp_servers.clone();

        let mut agent = Agent::new(
            self.model.clone(),
            self.read_only_tools.clone(),
            child_config,
            self.runtime_config.clone(),
            self.runtime.clone(),
            SUBAGENT_MAX_CONTEXT_TOKENS,
        );

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(256);
        let run = agent.handle_message(prompt, Vec::new(), None, None, tx);

        let mut trace = Vec::new();
        let mut summary = String::new();

        let (run_result, _) = tokio::join!(run, async {
            while let Some(ev) = rx.recv().await {
                match ev {
                    StreamEvent::AssistantDelta { delta } => append_text(&mut trace, &delta),
                    StreamEvent::ThinkingDelta { .. } => {}
                    StreamEvent::ToolCall { tool_call_id, tool_name, tool_input } => {
                        trace.push(json!({
                            "type": "tool_call",
                            "id": tool_call_id,
                            "name": tool_name,
                            "input": tool_input,
                        }));
                    }
                    StreamEvent::ToolResult { tool_call_id, result, is_error } => {
                        pair_tool_result(&mut trace, &tool_call_id, result.text.as_deref(), is_error);
                    }
                    StreamEvent::Question { .. } => {}
                    StreamEvent::Complete { content, .. } => summary = content,
                    StreamEvent::Error { code, message } => {
                        summary = format!("subagent error ({code}): {message}");
                    }
                }
            }
        });

        if let Err(e) = run_result {
            return ToolResult::err("task", format!("subagent run failed: {e}"));
        }

        let trace_len = trace.len();
        ToolResult::ok_with_data(
            "task",
            summary.clone(),
            json!({
                "trace": trace,
                "summary": summary,
                "subagent_type": subagent_type,
                "description": description,
            }),
        )
        .with_meta(json!({
            "trace_blocks": trace_len,
            "read_only_tools": self.read_only_tools.names(),
        }))
    }
}

/// Coalesce consecutive assistant-delta text into the trailing `text` block
/// rather than emitting one block per chunk.
fn append_text(trace: &mut Vec<serde_json::Value>, delta: &str) {
    if let Some(last) = trace.last_mut() {
        if last.get("type").and_then(|t| t.as_str()) == Some("text") {
            if let Some(obj) = last.as_object_mut() {
                let merged =
                    format!("{}{}", obj.get("content").and_then(|c| c.as_str()).unwrap_or(""), delta);
                obj.insert("content".into(), json!(merged));
                return;
            }
        }
    }
    trace.push(json!({ "type": "text", "content": delta }));
}

/// Attach a tool's result onto its matching `tool_call` block by id.
fn pair_tool_result(trace: &mut [serde_json::Value], tool_call_id: &str, text: Option<&str>, is_error: bool) {
    if let Some(slot) = trace.iter_mut().rev().find(|b| {
        b.get("type").and_then(|t| t.as_str()) == Some("tool_call")
            && b.get("id").and_then(|i| i.as_str()) == Some(tool_call_id)
    }) {
        if let Some(obj) = slot.as_object_mut() {
            obj.insert("result".into(), json!(text));
            obj.insert("is_error".into(), json!(is_error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_text_coalesces_consecutive_chunks() {
        let mut trace = Vec::new();
        append_text(&mut trace, "hel");
        append_text(&mut trace, "lo");
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0]["content"], "hello");
    }

    #[test]
    fn append_text_starts_new_block_after_non_text() {
        let mut trace = vec![json!({ "type": "tool_call", "id": "1", "name": "read", "input": {} })];
        append_text(&mut trace, "done");
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1]["type"], "text");
    }

    #[test]
    fn pair_tool_result_attaches_to_matching_call() {
        let mut trace = vec![json!({ "type": "tool_call", "id": "tc1", "name": "read", "input": {} })];
        pair_tool_result(&mut trace, "tc1", Some("file contents"), false);
        assert_eq!(trace[0]["result"], "file contents");
        assert_eq!(trace[0]["is_error"], false);
    }

    #[test]
    fn pair_tool_result_ignores_unknown_id() {
        let mut trace = vec![json!({ "type": "tool_call", "id": "tc1", "name": "read", "input": {} })];
        pair_tool_result(&mut trace, "missing", Some("x"), false);
        assert!(trace[0].get("result").is_none());
    }
}
