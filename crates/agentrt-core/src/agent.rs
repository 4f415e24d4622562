// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agent loop: [`Agent::handle_message`] drives one user turn through
//! model completion, tool execution, and history bookkeeping, streaming
//! [`StreamEvent`]s as it goes.
//!
//! Tool calls within a turn execute strictly sequentially — one full
//! `tool_call` → execute → `tool_result` cycle completes before the next
//! begins. This is a deliberate departure from the parallel `tokio::spawn`
//! dispatch this loop used to have: the data model has no notion of
//! concurrent side effects, and sequential execution makes the event stream
//! a faithful, replayable record of what happened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use agentrt_config::{AgentMode, RuntimeConfig};
use agentrt_model::{
    CompletionRequest, ContentPart, FunctionCall, Message as WireMessage, MessageContent,
    ModelProvider, ResponseEvent, Role, ToolContentPart, ToolSchema as WireToolSchema,
};
use agentrt_tools::{parse_questions, ToolCall as WireToolCall, ToolRegistry};

use crate::compact::{compact_session_with_strategy, emergency_compact, smart_truncate};
use crate::events::{QuestionSpec, StreamEvent, TokenUsage, TurnBlock};
use crate::message::{AgentConfig, ImageRef, Message, ToolCall};
use crate::prompts::{system_prompt, PromptContext};
use crate::runtime_context::AgentRuntimeContext;
use crate::session::Session;

/// Accumulates one tool call's streamed chunks, keyed by its index in the
/// provider's parallel tool-call array.
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    fn finish(self, index: u32) -> ToolCall {
        let args = attempt_json_repair(&self.args_buf).unwrap_or(Value::Object(Default::default()));
        ToolCall { index, id: self.id, name: self.name, args_str: self.args_buf, args }
    }
}

/// Best-effort repair of truncated or malformed tool-call argument JSON.
/// Falls back to `{}` when nothing salvageable remains.
fn attempt_json_repair(json_str: &str) -> anyhow::Result<Value> {
    let trimmed = json_str.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }
    let fixed = fix_invalid_json_escapes(trimmed);
    if let Ok(v) = serde_json::from_str(&fixed) {
        return Ok(v);
    }
    let mut repaired = fixed.clone();
    let opens = repaired.matches('{').count();
    let closes = repaired.matches('}').count();
    if opens > closes {
        repaired.push_str(&"}".repeat(opens - closes));
    }
    serde_json::from_str(&repaired).context("unrepairable tool-call arguments")
}

/// Walk the string escaping any backslash that doesn't start a valid JSON
/// escape sequence, so a model that emits e.g. a bare Windows path in a
/// string literal doesn't break the whole argument payload.
fn fix_invalid_json_escapes(json_str: &str) -> String {
    let mut out = String::with_capacity(json_str.len());
    let mut chars = json_str.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if c == '"' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if in_string && c == '\\' {
            match chars.peek() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                    out.push(c);
                }
                _ => out.push_str("\\\\"),
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Outcome of one provider round-trip within a turn.
enum TurnOutcome {
    Cancelled,
    Turn { text: String, tool_calls: Vec<ToolCall>, blocks: Vec<TurnBlock>, usage: TokenUsage },
}

/// Drives one conversation: owns the [`Session`] history, the model, and the
/// tool registry, and streams [`StreamEvent`]s for a `handle_message` call.
pub struct Agent {
    session: Session,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    config: AgentConfig,
    runtime_config: Arc<RuntimeConfig>,
    runtime: AgentRuntimeContext,
    cancel: Arc<AtomicBool>,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
        runtime_config: Arc<RuntimeConfig>,
        runtime: AgentRuntimeContext,
        max_context_tokens: usize,
    ) -> Self {
        Self {
            session: Session::new(max_context_tokens),
            tools,
            model,
            config,
            runtime_config,
            runtime,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone of the flag that an external control channel flips to cancel
    /// the turn currently in flight.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.config.workspace_root
    }

    /// Drive one user turn to completion, streaming events on `tx`.
    ///
    /// `deep_thinking`/`thinking_budget` are accepted per the data model but
    /// are not yet wired into a concrete `CompletionRequest` field — doing so
    /// requires per-provider request shaping (see
    /// `agentrt_model::provider_contract`) that belongs in the concrete
    /// driver files, not in this loop.
    pub async fn handle_message(
        &mut self,
        content: &str,
        images: Vec<ImageRef>,
        _deep_thinking: Option<bool>,
        _thinking_budget: Option<u32>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> anyhow::Result<()> {
        self.cancel.store(false, Ordering::SeqCst);

        if self.session.messages.is_empty() {
            let sys = self.system_message();
            self.session.push(sys);
        }

        self.ensure_fits_budget(&tx).await?;
        self.push_core_message(Message::human_with_images(content, images));

        let mut iterations: u32 = 0;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                let _ = tx
                    .send(StreamEvent::error("max_iterations", "maximum iteration count reached"))
                    .await;
                return Ok(());
            }

            let outcome = self.stream_one_turn(&tx, true).await?;
            let (text, tool_calls, blocks, usage) = match outcome {
                TurnOutcome::Cancelled => return Ok(()),
                TurnOutcome::Turn { text, tool_calls, blocks, usage } => (text, tool_calls, blocks, usage),
            };

            let real_calls: Vec<ToolCall> = tool_calls.into_iter().filter(|tc| !tc.is_ghost()).collect();

            if real_calls.is_empty() {
                if !text.is_empty() {
                    self.push_core_message(Message::assistant(text.clone()));
                }
                let turn_blocks = if blocks.is_empty() { None } else { Some(blocks) };
                let _ = tx
                    .send(StreamEvent::Complete { content: text, tool_calls: turn_blocks, token_usage: usage })
                    .await;
                return Ok(());
            }

            self.push_core_message(Message::Assistant {
                content: text,
                thinking: None,
                tool_calls: real_calls.clone(),
            });

            for tc in real_calls {
                if self.cancel.load(Ordering::SeqCst) {
                    return Ok(());
                }

                let mut args = tc.args.clone();
                if tc.name == "question" {
                    if let Ok((title, questions)) = parse_questions(&args) {
                        let questionnaire_id = Uuid::new_v4().to_string();
                        if let Value::Object(map) = &mut args {
                            map.insert("questionnaire_id".into(), Value::String(questionnaire_id.clone()));
                        }
                        let specs = questions
                            .into_iter()
                            .map(|q| QuestionSpec {
                                id: q.id,
                                header: q.header,
                                question: q.prompt,
                                options: q.options,
                                placeholder: q.placeholder,
                                multiple: q.allow_multiple,
                                required: q.required,
                            })
                            .collect();
                        let _ = tx.send(StreamEvent::Question { questionnaire_id, title, questions: specs }).await;
                    }
                }

                let _ = tx
                    .send(StreamEvent::ToolCall {
                        tool_call_id: tc.id.clone(),
                        tool_name: tc.name.clone(),
                        tool_input: args.clone(),
                    })
                    .await;

                let call = WireToolCall { id: tc.id.clone(), name: tc.name.clone(), args };
                let result = self.tools.execute(&call).await;

                let _ = tx.send(StreamEvent::tool_result(tc.id.clone(), result.clone())).await;
                self.push_core_message(Message::Tool { tool_call_id: tc.id, result });
            }

            self.ensure_fits_budget(&tx).await?;
        }
    }

    /// Stream one completion round-trip, accumulating tool-call chunks by
    /// index into a dense vector with ghost placeholders filling any gaps.
    async fn stream_one_turn(
        &mut self,
        tx: &mpsc::Sender<StreamEvent>,
        with_tools: bool,
    ) -> anyhow::Result<TurnOutcome> {
        let tools: Vec<WireToolSchema> = if with_tools {
            self.tools
                .schemas_for_mode(AgentMode::Agent)
                .into_iter()
                .map(|s| WireToolSchema { name: s.name, description: s.description, parameters: s.parameters })
                .collect()
        } else {
            Vec::new()
        };

        let modalities = self.model.input_modalities();
        let messages =
            agentrt_model::sanitize::strip_images_if_unsupported(self.session.messages.clone(), &modalities);

        let req = CompletionRequest {
            messages,
            tools,
            stream: true,
            system_dynamic_suffix: self.dynamic_context(),
        };

        let mut stream = self.model.complete(req).await.context("model completion request failed")?;

        let mut full_text = String::new();
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
        let mut usage = TokenUsage::default();
        let mut blocks: Vec<TurnBlock> = Vec::new();
        let mut block_positions: HashMap<u32, usize> = HashMap::new();

        while let Some(event) = stream.next().await {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(TurnOutcome::Cancelled);
            }

            match event.context("model stream yielded an error")? {
                ResponseEvent::TextDelta(delta) => {
                    if !delta.is_empty() {
                        full_text.push_str(&delta);
                        let _ = tx.send(StreamEvent::assistant_delta(delta.clone())).await;
                        match blocks.last_mut() {
                            Some(TurnBlock::Text { content }) => content.push_str(&delta),
                            _ => blocks.push(TurnBlock::Text { content: delta }),
                        }
                    }
                }
                ResponseEvent::ThinkingDelta(delta) => {
                    if !delta.is_empty() {
                        let _ = tx.send(StreamEvent::thinking_delta(delta)).await;
                    }
                }
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let ptc = pending.entry(index).or_default();
                    if !id.is_empty() {
                        ptc.id = id;
                    }
                    if !name.is_empty() {
                        ptc.name = name;
                    }
                    ptc.args_buf.push_str(&arguments);
                    block_positions.entry(index).or_insert_with(|| {
                        blocks.push(TurnBlock::ToolCall {
                            id: String::new(),
                            name: String::new(),
                            input: Value::Null,
                        });
                        blocks.len() - 1
                    });
                }
                ResponseEvent::Usage { input_tokens, output_tokens, .. } => {
                    usage = TokenUsage { prompt: input_tokens, completion: output_tokens };
                }
                ResponseEvent::Error(message) => {
                    warn!(%message, "model stream reported a recoverable error");
                }
                ResponseEvent::Done => break,
            }
        }

        let tool_calls = flush_pending_tool_calls(pending);
        for tc in &tool_calls {
            if tc.is_ghost() {
                continue;
            }
            if let Some(&pos) = block_positions.get(&tc.index) {
                blocks[pos] = TurnBlock::ToolCall { id: tc.id.clone(), name: tc.name.clone(), input: tc.args.clone() };
            }
        }

        Ok(TurnOutcome::Turn { text: full_text, tool_calls, blocks, usage })
    }

    /// A tool-free completion used to generate a compaction summary.
    async fn run_compaction_turn(&mut self, tx: mpsc::Sender<StreamEvent>) -> anyhow::Result<String> {
        match self.stream_one_turn(&tx, false).await? {
            TurnOutcome::Cancelled => Ok(String::new()),
            TurnOutcome::Turn { text, .. } => Ok(text),
        }
    }

    /// Compact the session when it is near its context budget. Prefers an
    /// LLM-driven summary, falling back to deterministic emergency
    /// compaction on any failure or when there is nothing left to summarize.
    async fn ensure_fits_budget(&mut self, tx: &mpsc::Sender<StreamEvent>) -> anyhow::Result<()> {
        if self.session.max_tokens == 0 {
            return Ok(());
        }
        let threshold = (self.runtime_config.compaction_threshold - self.runtime_config.compaction_overhead_reserve)
            .max(0.1);
        if !self.session.is_near_limit(threshold) {
            return Ok(());
        }

        let sys = self.system_message();
        let keep_n = self.runtime_config.compaction_keep_recent;

        let non_system: Vec<WireMessage> =
            self.session.messages.iter().filter(|m| m.role != Role::System).cloned().collect();

        let mut summarize_count = non_system.len().saturating_sub(keep_n);
        while summarize_count > 0 && summarize_count < non_system.len() {
            match &non_system[summarize_count].content {
                MessageContent::ToolResult { .. } | MessageContent::ToolCall { .. } => summarize_count -= 1,
                _ => break,
            }
        }

        if summarize_count == 0 {
            emergency_compact(&mut self.session.messages, Some(sys), keep_n);
            self.session.recalculate_tokens();
            return Ok(());
        }

        let recent: Vec<WireMessage> = non_system[summarize_count..].to_vec();
        let mut to_compact: Vec<WireMessage> = non_system[..summarize_count].to_vec();
        let original = self.session.messages.clone();

        compact_session_with_strategy(&mut to_compact, Some(sys.clone()), &self.runtime_config.compaction_strategy);
        self.session.replace_messages(to_compact);

        match self.run_compaction_turn(tx.clone()).await {
            Ok(summary) if !summary.is_empty() => {
                let mut rebuilt = vec![sys, WireMessage::assistant(summary)];
                rebuilt.extend(recent);
                self.session.replace_messages(rebuilt);
            }
            outcome => {
                if let Err(e) = outcome {
                    warn!(error = %e, "compaction summary call failed, falling back to emergency compact");
                }
                self.session.replace_messages(original);
                emergency_compact(&mut self.session.messages, Some(self.system_message()), keep_n);
                self.session.recalculate_tokens();
            }
        }
        Ok(())
    }

    fn system_message(&self) -> WireMessage {
        let tool_names = self.tools.names_for_mode(AgentMode::Agent);
        let ctx = PromptContext {
            workspace_root: Some(self.config.workspace_root.as_path()),
            tool_names: &tool_names,
            project_context_file: self.runtime.project_context_file.as_deref(),
            append: self.runtime.append_system_prompt.as_deref(),
        };
        let custom = self
            .runtime
            .system_prompt_override
            .as_deref()
            .or(self.runtime_config.system_prompt.as_deref());
        WireMessage::system(system_prompt(custom, ctx))
    }

    /// Volatile context (git/CI) carried as `system_dynamic_suffix` so it
    /// never perturbs the cached stable prefix. Suppressed entirely when a
    /// system prompt override is active, since that override owns the whole
    /// prompt.
    fn dynamic_context(&self) -> Option<String> {
        if self.runtime.system_prompt_override.is_some() {
            return None;
        }
        let mut blocks = Vec::new();
        if let Some(git) = &self.runtime.git_context_note {
            blocks.push(git.clone());
        }
        if let Some(ci) = &self.runtime.ci_context_note {
            blocks.push(ci.clone());
        }
        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n\n"))
        }
    }

    /// Translate one core [`Message`] into the wire [`Session`] history,
    /// content-capping tool results on the way in.
    fn push_core_message(&mut self, msg: Message) {
        for wire in to_wire_messages(msg, &self.tools, self.runtime_config.tool_result_token_cap) {
            self.session.push(wire);
        }
    }
}

/// Build the dense, index-ordered tool-call vector for one turn, filling any
/// gap (or any entry whose name never arrived) with a ghost placeholder.
fn flush_pending_tool_calls(mut pending: HashMap<u32, PendingToolCall>) -> Vec<ToolCall> {
    let max_index = match pending.keys().copied().max() {
        Some(m) => m,
        None => return Vec::new(),
    };
    (0..=max_index)
        .map(|i| match pending.remove(&i) {
            Some(ptc) if !ptc.name.is_empty() => ptc.finish(i),
            _ => ToolCall::ghost(i),
        })
        .collect()
}

/// Map a core [`Message`] onto one or more wire [`agentrt_model::Message`]s.
///
/// An `Assistant` message with N tool calls expands to one text message (if
/// non-empty) followed by N `ToolCall` messages, mirroring how a provider
/// reports a multi-tool-call turn. `thinking` is never persisted — it is
/// streamed to the consumer and otherwise discarded.
fn to_wire_messages(msg: Message, tools: &ToolRegistry, token_cap: usize) -> Vec<WireMessage> {
    match msg {
        Message::System { content } => vec![WireMessage::system(content)],
        Message::Human { content, images } => {
            if images.is_empty() {
                vec![WireMessage::user(content)]
            } else {
                let mut parts = vec![ContentPart::text(content)];
                parts.extend(images.into_iter().map(|img| ContentPart::image(img.url)));
                vec![WireMessage::user_with_parts(parts)]
            }
        }
        Message::Assistant { content, tool_calls, .. } => {
            let mut out = Vec::with_capacity(tool_calls.len() + 1);
            if !content.is_empty() {
                out.push(WireMessage::assistant(content));
            }
            for tc in tool_calls {
                out.push(WireMessage {
                    role: Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: tc.id,
                        function: FunctionCall { name: tc.name, arguments: tc.args_str },
                    },
                });
            }
            out
        }
        Message::Tool { tool_call_id, result } => {
            let category = tools.get(&result.kind).map(|t| t.output_category()).unwrap_or_default();
            let wire = if let Some(blocks) = result.llm_content.clone() {
                let parts: Vec<ToolContentPart> = blocks
                    .into_iter()
                    .map(|b| match b {
                        agentrt_tools::ContentBlock::Text { text } => {
                            ToolContentPart::Text { text: smart_truncate(&text, category, token_cap) }
                        }
                        agentrt_tools::ContentBlock::Image { image_url } => ToolContentPart::Image { image_url },
                    })
                    .collect();
                WireMessage::tool_result_with_parts(tool_call_id, parts)
            } else {
                let text = result.text.clone().unwrap_or_default();
                WireMessage::tool_result(tool_call_id, smart_truncate(&text, category, token_cap))
            };
            vec![wire]
        }
    }
}
