// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};

/// A single structured question with multiple-choice options.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Question {
    pub id: String,
    pub header: Option<String>,
    pub prompt: String,
    pub options: Vec<String>,
    pub placeholder: Option<String>,
    pub allow_multiple: bool,
    pub required: bool,
}

/// Parse the `title`/`questions` arguments shared by the schema and the
/// `question` StreamEvent the agent loop emits before awaiting this tool.
/// Pulled out so the agent loop can build the event payload from the same
/// validated data the tool itself will suspend on.
pub fn parse_questions(args: &Value) -> Result<(Option<String>, Vec<Question>), String> {
    let title = args.get("title").and_then(|v| v.as_str()).map(str::to_string);
    let questions_json = match args.get("questions").and_then(|v| v.as_array()) {
        Some(arr) => arr,
        None => return Err("missing required parameter 'questions'".into()),
    };

    let mut questions = Vec::new();
    for (i, q_val) in questions_json.iter().enumerate() {
        let q_obj = q_val.as_object().ok_or_else(|| format!("question {} is not an object", i + 1))?;
        let prompt = q_obj
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("question {} missing 'prompt'", i + 1))?
            .to_string();
        let options: Vec<String> = match q_obj.get("options").and_then(|v| v.as_array()) {
            Some(opts) => opts.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            None => return Err(format!("question {} missing 'options'", i + 1)),
        };
        if options.len() < 2 {
            return Err(format!("question {} needs at least 2 options", i + 1));
        }
        let id = q_obj.get("id").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(|| (i + 1).to_string());
        let header = q_obj.get("header").and_then(|v| v.as_str()).map(str::to_string);
        let placeholder = q_obj.get("placeholder").and_then(|v| v.as_str()).map(str::to_string);
        let allow_multiple = q_obj.get("allow_multiple").and_then(|v| v.as_bool()).unwrap_or(false);
        let required = q_obj.get("required").and_then(|v| v.as_bool()).unwrap_or(true);
        questions.push(Question { id, header, prompt, options, placeholder, allow_multiple, required });
    }
    if questions.is_empty() {
        return Err("questions array must not be empty".into());
    }
    if questions.len() > 3 {
        return Err("at most 3 questions may be asked at a time".into());
    }
    Ok((title, questions))
}

/// Registry of in-flight questionnaires awaiting an external `answer`
/// control message. Keyed by a server-generated questionnaire id so that
/// multiple conversations (or multiple outstanding questionnaires within
/// one conversation, e.g. nested subagents) never collide on a single
/// oneshot slot.
#[derive(Default)]
pub struct QuestionRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<Vec<String>>>>,
}

impl QuestionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new questionnaire and return the receiving half of its
    /// answer channel.
    fn register(&self, id: String) -> oneshot::Receiver<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        rx
    }

    /// Resolve a pending questionnaire with the caller-supplied answers.
    /// Returns `false` if no questionnaire with that id is outstanding
    /// (already answered, or never registered).
    pub fn answer(&self, id: &str, answers: Vec<String>) -> bool {
        match self.pending.lock().unwrap().remove(id) {
            Some(tx) => tx.send(answers).is_ok(),
            None => false,
        }
    }

    /// Drop a pending questionnaire without resolving it, e.g. when the
    /// owning conversation is cancelled.
    pub fn cancel(&self, id: &str) {
        self.pending.lock().unwrap().remove(id);
    }

    /// Ids currently awaiting an answer. Used by the control-channel layer
    /// to validate incoming `answer` messages and by tests.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }
}

/// Presents structured multiple-choice questions to the user and suspends
/// the agent loop until a matching `answer` control message arrives.
/// Async-only: the agent loop must never call `run()` on this tool.
pub struct QuestionTool {
    registry: std::sync::Arc<QuestionRegistry>,
}

impl QuestionTool {
    pub fn new(registry: std::sync::Arc<QuestionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for QuestionTool {
    fn name(&self) -> &str {
        "question"
    }

    fn description(&self) -> &str {
        "Present one or more structured multiple-choice questions to the user and suspend \
         until they are answered. Each question: prompt, options (>=2), allow_multiple \
         (default false), an optional header, an optional placeholder (for free-text \
         clarification), and required (default true). Do not include 'Other' in options; it \
         is implicit. Use for decisions that need an explicit choice."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Optional heading for the questionnaire" },
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "Stable id; defaults to the question's 1-based position" },
                            "header": { "type": "string" },
                            "prompt": { "type": "string" },
                            "options": {
                                "type": "array",
                                "items": { "type": "string" },
                                "minItems": 2
                            },
                            "placeholder": { "type": "string" },
                            "allow_multiple": { "type": "boolean", "default": false },
                            "required": { "type": "boolean", "default": true }
                        },
                        "required": ["prompt", "options"],
                        "additionalProperties": false
                    },
                    "minItems": 1,
                    "maxItems": 3
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn async_only(&self) -> bool {
        true
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let (title, questions) = match parse_questions(&call.args) {
            Ok(v) => v,
            Err(e) => return ToolResult::err("question", e),
        };

        // The agent loop pre-generates the id so it can emit the `question`
        // StreamEvent (carrying the same id) before awaiting this call.
        let questionnaire_id = call
            .args
            .get("questionnaire_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(id = %questionnaire_id, count = questions.len(), "question tool suspending");

        let rx = self.registry.register(questionnaire_id.clone());

        match rx.await {
            Ok(answers) => {
                let text = questions
                    .iter()
                    .zip(answers.iter())
                    .map(|(q, a)| format!("Q: {}\nA: {a}", q.prompt))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                ToolResult::ok_with_data(
                    "question",
                    text,
                    json!({ "questionnaire_id": questionnaire_id, "title": title }),
                )
            }
            Err(_) => ToolResult::err("question", "questionnaire was cancelled before it was answered")
                .with_meta(json!({ "questionnaire_id": questionnaire_id })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "q1".into(), name: "question".into(), args }
    }

    #[test]
    fn schema_requires_questions() {
        let t = QuestionTool::new(Arc::new(QuestionRegistry::new()));
        let schema = t.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("questions")));
    }

    #[test]
    fn is_declared_async_only() {
        let t = QuestionTool::new(Arc::new(QuestionRegistry::new()));
        assert!(t.async_only());
    }

    #[tokio::test]
    async fn missing_questions_is_error() {
        let t = QuestionTool::new(Arc::new(QuestionRegistry::new()));
        let out = t.arun(&call(json!({}))).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn too_many_questions_is_error() {
        let t = QuestionTool::new(Arc::new(QuestionRegistry::new()));
        let q = json!({"prompt": "p", "options": ["a", "b"]});
        let out = t.arun(&call(json!({"questions": [q, q, q, q]}))).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("at most 3"));
    }

    #[tokio::test]
    async fn answering_registered_questionnaire_resolves_the_call() {
        let registry = Arc::new(QuestionRegistry::new());
        let t = QuestionTool::new(registry.clone());

        let handle = tokio::spawn(async move {
            t.arun(&call(json!({
                "questions": [{ "prompt": "Continue?", "options": ["Yes", "No"] }]
            })))
            .await
        });

        let id = loop {
            let ids = registry.pending_ids();
            if let Some(id) = ids.into_iter().next() {
                break id;
            }
            tokio::task::yield_now().await;
        };

        assert!(registry.answer(&id, vec!["Yes".into()]));
        let out = handle.await.unwrap();
        assert!(out.success);
        assert!(out.text.unwrap().contains("Yes"));
    }

    #[tokio::test]
    async fn cancel_on_unknown_id_is_a_noop() {
        let registry = QuestionRegistry::new();
        assert!(!registry.answer("does-not-exist", vec!["x".into()]));
        registry.cancel("does-not-exist");
    }
}
