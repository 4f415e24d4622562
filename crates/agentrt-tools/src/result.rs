// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentrt_model::ToolContentPart;

/// A single content block exposed to the model when a tool's result is
/// multimodal (e.g. an image read, a generated chart).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { image_url: String },
}

impl From<ContentBlock> for ToolContentPart {
    fn from(b: ContentBlock) -> Self {
        match b {
            ContentBlock::Text { text } => ToolContentPart::Text { text },
            ContentBlock::Image { image_url } => ToolContentPart::Image { image_url },
        }
    }
}

/// The uniform result envelope every tool invocation produces.
///
/// `success` and `error` never disagree: `success == error.is_none()`.
/// `text` is the plain-text representation shown to the model by default;
/// `data` carries the tool's structured payload (e.g. `{exit_code, stdout,
/// stderr}` for `shell`); `meta` carries out-of-band bookkeeping such as
/// `truncated` or `timed_out`; `llm_content` is populated only for
/// multimodal results and otherwise omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub kind: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_content: Option<Vec<ContentBlock>>,
}

impl ToolResult {
    /// A successful, plain-text result.
    pub fn ok(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            success: true,
            error: None,
            text: Some(text.into()),
            data: None,
            meta: Value::Null,
            llm_content: None,
        }
    }

    /// A successful result carrying structured `data` alongside its text.
    pub fn ok_with_data(kind: impl Into<String>, text: impl Into<String>, data: Value) -> Self {
        Self { data: Some(data), ..Self::ok(kind, text) }
    }

    /// A failed result. `text` mirrors `error` so callers that only read
    /// `text` still see the failure message.
    pub fn err(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let msg = message.into();
        Self {
            kind: kind.into(),
            success: false,
            error: Some(msg.clone()),
            text: Some(msg),
            data: None,
            meta: Value::Null,
            llm_content: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_llm_content(mut self, content: Vec<ContentBlock>) -> Self {
        self.llm_content = Some(content);
        self
    }

    pub fn is_truncated(&self) -> bool {
        self.meta.get("truncated").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_sets_success_and_clears_error() {
        let r = ToolResult::ok("read", "hello");
        assert!(r.success);
        assert!(r.error.is_none());
        assert_eq!(r.text.as_deref(), Some("hello"));
    }

    #[test]
    fn err_sets_failure_and_mirrors_text() {
        let r = ToolResult::err("shell", "boom");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert_eq!(r.text.as_deref(), Some("boom"));
    }

    #[test]
    fn success_and_error_never_disagree() {
        let ok = ToolResult::ok("x", "y");
        let err = ToolResult::err("x", "y");
        assert_eq!(ok.success, ok.error.is_none());
        assert_eq!(err.success, err.error.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let r = ToolResult::ok_with_data("shell", "done", serde_json::json!({"exit_code": 0}))
            .with_meta(serde_json::json!({"truncated": true}));
        let json = serde_json::to_string(&r).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "shell");
        assert!(back.is_truncated());
        assert_eq!(back.data.unwrap()["exit_code"], 0);
    }

    #[test]
    fn meta_omitted_when_null() {
        let r = ToolResult::ok("x", "y");
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("\"meta\""));
    }
}
