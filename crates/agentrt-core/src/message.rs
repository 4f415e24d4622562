// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The conversation-level data model: [`AgentConfig`], [`Message`] and
//! [`ToolCall`].
//!
//! These are distinct from [`agentrt_model::Message`], which is the
//! provider-wire shape sent to and received from a `ModelProvider`. The
//! agent loop owns a `Vec<Message>` (this module's type) as the durable
//! accumulation record for a turn and maps it onto the wire shape for each
//! completion request — see `agent::to_wire_message`.

use agentrt_tools::ToolCapabilities;
use serde_json::Value;

/// Per-conversation initialization config (spec data model §3), distinct
/// from [`agentrt_config::RuntimeConfig`] (ambient tuning loaded from the
/// config file).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub conversation_id: String,
    pub workspace_root: std::path::PathBuf,
    pub model: String,
    pub deep_thinking_default: bool,
    pub mcp_servers: Vec<ToolCapabilities>,
    pub max_iterations: u32,
}

impl AgentConfig {
    pub fn new(conversation_id: impl Into<String>, workspace_root: std::path::PathBuf, model: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            workspace_root,
            model: model.into(),
            deep_thinking_default: false,
            mcp_servers: Vec::new(),
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// Hard ceiling on agent-loop iterations per `handle_message` call (§4.1).
pub const MAX_ITERATIONS: u32 = 20;

/// A reference to an image attached to a human turn.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub url: String,
}

/// A tool call accumulated from provider stream chunks.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Position in the parallel tool-call array for this turn.
    pub index: u32,
    pub id: String,
    pub name: String,
    /// Raw JSON text accumulated across streamed chunks.
    pub args_str: String,
    /// Parsed arguments, once the stream for this call is complete.
    pub args: Value,
}

impl ToolCall {
    /// A ghost placeholder filling an index gap in the parallel tool-call
    /// array. Ghost calls are dropped before execution (§4.1 step 3).
    pub fn ghost(index: u32) -> Self {
        Self {
            index,
            id: String::new(),
            name: String::new(),
            args_str: String::new(),
            args: Value::Null,
        }
    }

    pub fn is_ghost(&self) -> bool {
        self.name.is_empty()
    }
}

/// One entry in the conversation history.
#[derive(Debug, Clone)]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
        images: Vec<ImageRef>,
    },
    Assistant {
        content: String,
        thinking: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        result: agentrt_tools::ToolResult,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human { content: content.into(), images: Vec::new() }
    }

    pub fn human_with_images(content: impl Into<String>, images: Vec<ImageRef>) -> Self {
        Message::Human { content: content.into(), images }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant { content: content.into(), thinking: None, tool_calls: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_tool_call_has_empty_name() {
        let tc = ToolCall::ghost(2);
        assert!(tc.is_ghost());
        assert_eq!(tc.index, 2);
    }

    #[test]
    fn non_ghost_tool_call_is_detected_by_name() {
        let tc = ToolCall {
            index: 0,
            id: "a".into(),
            name: "shell".into(),
            args_str: "{}".into(),
            args: Value::Null,
        };
        assert!(!tc.is_ghost());
    }

    #[test]
    fn agent_config_defaults_max_iterations() {
        let cfg = AgentConfig::new("c1", std::path::PathBuf::from("/workspace"), "gpt-4o");
        assert_eq!(cfg.max_iterations, 20);
    }
}
