// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};

/// Runs a subagent and returns its final `ToolResult`.
///
/// Implemented by `agentrt-core` (which owns the agent loop) and injected
/// into [`TaskTool`] at registry-construction time. Kept as a trait here,
/// rather than a direct dependency on `agentrt-core`, to avoid a dependency
/// cycle: `agentrt-core` depends on `agentrt-tools` for the tool substrate,
/// so the tool that *launches* a subagent cannot itself depend back on
/// `agentrt-core`.
#[async_trait]
pub trait SubagentRunner: Send + Sync {
    async fn run_subagent(&self, subagent_type: &str, description: &str, prompt: &str) -> ToolResult;
}

const SUPPORTED_SUBAGENT_TYPES: &[&str] = &["explore"];

pub struct TaskTool {
    runner: Arc<dyn SubagentRunner>,
}

impl TaskTool {
    pub fn new(runner: Arc<dyn SubagentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Launches a read-only subagent to investigate something and report back a summary. \
         Only subagent_type 'explore' is supported; the subagent cannot write files or spawn \
         further subagents."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "Short (3-5 word) task description" },
                "prompt": { "type": "string", "description": "The task for the subagent to perform" },
                "subagent_type": {
                    "type": "string",
                    "enum": SUPPORTED_SUBAGENT_TYPES,
                    "description": "Must be 'explore'"
                }
            },
            "required": ["description", "prompt"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let description = match call.args.get("description").and_then(|v| v.as_str()) {
            Some(d) => d.to_string(),
            None => return ToolResult::err("task", "missing required parameter 'description'"),
        };
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolResult::err("task", "missing required parameter 'prompt'"),
        };
        let subagent_type = call.args.get("subagent_type").and_then(|v| v.as_str()).unwrap_or("explore");
        if !SUPPORTED_SUBAGENT_TYPES.contains(&subagent_type) {
            return ToolResult::err(
                "task",
                format!("unsupported subagent_type '{subagent_type}'; only 'explore' is available"),
            );
        }

        debug!(description = %description, subagent_type, "task tool launching subagent");

        self.runner.run_subagent(subagent_type, &description, &prompt).await
    }
}
