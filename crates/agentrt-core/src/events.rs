// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`StreamEvent`]: the wire shape the agent loop yields for one
//! `handle_message` call, and the supporting payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentrt_tools::ToolResult;

/// One entry of a question tool's questionnaire (§6 outbound `question`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub multiple: bool,
    pub required: bool,
}

/// Token accounting attached to a `complete` event.
///
/// When the underlying provider does not report real usage, both fields
/// are `0` (§9 Open Question 2) rather than an estimated figure.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

/// One block of a final turn's interleaved text/tool-call content, in the
/// exact order the blocks were observed during the turn. Replayed by a
/// consumer that wants to reconstruct the assistant's message structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnBlock {
    Text { content: String },
    ToolCall { id: String, name: String, input: Value },
}

/// Events emitted by the agent loop during one `handle_message` call.
///
/// Consumers (the stdio reference binary, or any other session-glue layer)
/// subscribe to these to drive their own output. Serializes with a `type`
/// discriminator matching the control-channel wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text chunk streamed from the model.
    AssistantDelta { delta: String },
    /// A thinking/reasoning chunk streamed from the model. Never persisted
    /// to history.
    ThinkingDelta { delta: String },
    /// The model has requested a tool call.
    ToolCall { tool_call_id: String, tool_name: String, tool_input: Value },
    /// A tool call finished. `result` has `llm_content` stripped — that
    /// field is internal to history replay and must never reach a
    /// consumer.
    ToolResult { tool_call_id: String, result: ToolResult, is_error: bool },
    /// The agent is presenting a questionnaire and suspending until a
    /// matching `answer` control message resolves it.
    Question {
        questionnaire_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        questions: Vec<QuestionSpec>,
    },
    /// The current turn finished with no further tool calls pending.
    Complete {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<TurnBlock>>,
        token_usage: TokenUsage,
    },
    /// A terminal condition for the turn. See §7 for the fixed code
    /// taxonomy: `agent_error`, `cancelled`, `not_initialized`,
    /// `max_iterations`.
    Error { code: String, message: String },
}

impl StreamEvent {
    pub fn assistant_delta(delta: impl Into<String>) -> Self {
        StreamEvent::AssistantDelta { delta: delta.into() }
    }

    pub fn thinking_delta(delta: impl Into<String>) -> Self {
        StreamEvent::ThinkingDelta { delta: delta.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Error { code: code.into(), message: message.into() }
    }

    /// A `tool_result` event with `llm_content` stripped from the envelope
    /// before it leaves the agent loop (§3, §4.1 step 7).
    pub fn tool_result(tool_call_id: impl Into<String>, mut result: ToolResult) -> Self {
        result.llm_content = None;
        let is_error = !result.success;
        StreamEvent::ToolResult { tool_call_id: tool_call_id.into(), result, is_error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_delta_serializes_with_type_tag() {
        let ev = StreamEvent::assistant_delta("hi");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "assistant_delta");
        assert_eq!(v["delta"], "hi");
    }

    #[test]
    fn tool_result_event_strips_llm_content() {
        let result = ToolResult::ok("read", "hello")
            .with_llm_content(vec![agentrt_tools::ContentBlock::Text { text: "hello".into() }]);
        let ev = StreamEvent::tool_result("tc1", result);
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v["result"].get("llm_content").is_none());
        assert_eq!(v["is_error"], false);
    }

    #[test]
    fn error_event_carries_fixed_code_taxonomy() {
        let ev = StreamEvent::error("max_iterations", "too many iterations");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], "max_iterations");
    }

    #[test]
    fn complete_event_omits_null_tool_calls() {
        let ev = StreamEvent::Complete {
            content: "done".into(),
            tool_calls: None,
            token_usage: TokenUsage::default(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("tool_calls").is_none());
        assert_eq!(v["token_usage"]["prompt"], json!(0));
    }

    #[test]
    fn turn_block_variants_tag_correctly() {
        let text = TurnBlock::Text { content: "hi".into() };
        let call = TurnBlock::ToolCall { id: "1".into(), name: "shell".into(), input: json!({}) };
        assert_eq!(serde_json::to_value(&text).unwrap()["type"], "text");
        assert_eq!(serde_json::to_value(&call).unwrap()["type"], "tool_call");
    }
}
