// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use agentrt_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// Describes the shape of a tool's text output for context-aware truncation.
///
/// When a tool result exceeds the configured token cap, `agentrt-core` uses
/// this category to pick the right extraction strategy. Each tool declares
/// its own category; `agentrt-core` never hard-codes tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal / process output: keep the first 60 + last 40 lines so both
    /// the command preamble and the final result are visible.
    /// Suitable for: shell, code_interpreter.
    HeadTail,
    /// Ordered match list: keep the leading matches so the model sees the
    /// highest-relevance results first.
    /// Suitable for: grep.
    MatchList,
    /// File content: keep a head and tail window with a separator so the
    /// model sees both the top of the file (imports, declarations) and the
    /// end (recent changes).
    /// Suitable for: read.
    FileContent,
    /// Generic text: hard-truncate at the character boundary.
    /// Used for all tools that do not fit the categories above.
    #[default]
    Generic,
}

/// Trait that every built-in and MCP-backed tool must implement.
///
/// `run` is the synchronous entry point; tools that are inherently
/// asynchronous (e.g. `question`, which suspends on an external answer)
/// override it to return a structured "async-only" error and must be
/// invoked through `arun` instead. `arun` is implemented by every tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Default approval level for this tool
    fn default_policy(&self) -> ApprovalPolicy;
    /// The agent modes in which this tool is available.
    /// Default: all modes (Research, Plan, Agent).
    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Research, AgentMode::Plan, AgentMode::Agent]
    }
    /// Describes the shape of this tool's output for context-aware truncation.
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    /// Whether this tool must be invoked asynchronously (via `arun`). When
    /// true, `run` returns a structured error without attempting the call.
    fn async_only(&self) -> bool {
        false
    }
    /// Synchronous entry point. Default delegates nowhere; async-only tools
    /// rely on this default to refuse synchronous invocation.
    fn run(&self, call: &ToolCall) -> ToolResult {
        ToolResult::err(
            self.name(),
            format!("tool '{}' is async-only; call arun() instead", self.name()),
        )
        .with_meta(serde_json::json!({ "call_id": call.id }))
    }
    /// Asynchronous entry point. Every tool implements this.
    async fn arun(&self, call: &ToolCall) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::policy::ApprovalPolicy;

    #[test]
    fn output_category_default_is_generic() {
        assert_eq!(OutputCategory::default(), OutputCategory::Generic);
    }

    #[test]
    fn output_category_variants_are_distinct() {
        assert_ne!(OutputCategory::HeadTail, OutputCategory::MatchList);
        assert_ne!(OutputCategory::HeadTail, OutputCategory::FileContent);
        assert_ne!(OutputCategory::MatchList, OutputCategory::Generic);
    }

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Auto
        }
        async fn arun(&self, call: &ToolCall) -> ToolResult {
            ToolResult::ok("minimal", "ok").with_meta(json!({"call_id": call.id}))
        }
    }

    #[test]
    fn tool_default_output_category_is_generic() {
        assert_eq!(MinimalTool.output_category(), OutputCategory::Generic);
    }

    #[test]
    fn default_sync_run_refuses_with_structured_error() {
        let call = ToolCall { id: "1".into(), name: "minimal".into(), args: json!({}) };
        let out = MinimalTool.run(&call);
        assert!(!out.success);
        assert!(out.error.unwrap().contains("async-only"));
    }

    #[tokio::test]
    async fn arun_executes_successfully() {
        let call = ToolCall { id: "1".into(), name: "minimal".into(), args: json!({}) };
        let out = MinimalTool.arun(&call).await;
        assert!(out.success);
    }
}
