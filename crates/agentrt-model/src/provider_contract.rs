// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A thin, provider-agnostic layer on top of the concrete [`ModelProvider`]
//! drivers: budget/thinking request kwargs, reasoning-block extraction, and
//! history normalization quirks that differ per vendor but don't warrant a
//! distinct trait impl per driver.

use serde_json::{json, Map, Value};

use crate::ModelProvider;

/// The provider family a concrete driver belongs to, used to pick the right
/// request shape. Unrecognised/custom gateway presets fall back to
/// [`Provider::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Unknown,
}

impl Provider {
    /// Classify a driver by its `ModelProvider::name()`.
    pub fn from_driver_name(name: &str) -> Self {
        match name {
            "openai" => Provider::OpenAi,
            "anthropic" => Provider::Anthropic,
            "google" => Provider::Google,
            "mistral" => Provider::Mistral,
            _ => Provider::Unknown,
        }
    }

    pub fn from_provider(provider: &dyn ModelProvider) -> Self {
        Self::from_driver_name(provider.name())
    }
}

/// Static capability record for a provider family.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// Request parameter name used to cap output tokens.
    pub token_limit_param: &'static str,
    /// Whether the provider accepts a `reasoning` request parameter.
    pub supports_reasoning: bool,
    /// Whether the provider has a native extended-thinking parameter.
    pub supports_native_thinking: bool,
    /// Whether the provider honours explicit prompt-cache hints.
    pub supports_cache_hints: bool,
}

/// Look up the capability record for a provider family. Unknown providers
/// get a generic record: `max_tokens`, no reasoning, no native thinking, no
/// cache hints.
pub fn capabilities_for(provider: Provider) -> ProviderCapabilities {
    match provider {
        Provider::OpenAi => ProviderCapabilities {
            token_limit_param: "max_completion_tokens",
            supports_reasoning: true,
            supports_native_thinking: false,
            supports_cache_hints: false,
        },
        Provider::Anthropic => ProviderCapabilities {
            token_limit_param: "max_tokens",
            supports_reasoning: false,
            supports_native_thinking: true,
            supports_cache_hints: true,
        },
        Provider::Google => ProviderCapabilities {
            token_limit_param: "max_output_tokens",
            supports_reasoning: false,
            supports_native_thinking: true,
            supports_cache_hints: false,
        },
        Provider::Mistral | Provider::Unknown => ProviderCapabilities {
            token_limit_param: "max_tokens",
            supports_reasoning: false,
            supports_native_thinking: false,
            supports_cache_hints: false,
        },
    }
}

/// `{<token_limit_param>: budget}`.
pub fn build_budget_kwargs(provider: Provider, max_tokens: u32) -> Map<String, Value> {
    let caps = capabilities_for(provider);
    let mut map = Map::new();
    map.insert(caps.token_limit_param.to_string(), json!(max_tokens));
    map
}

/// Extends [`build_budget_kwargs`] with provider-specific reasoning/thinking
/// parameters, added only when the provider's capability record allows it.
pub fn build_thinking_kwargs(
    provider: Provider,
    capabilities: ProviderCapabilities,
    thinking_budget: u32,
) -> Map<String, Value> {
    let mut map = build_budget_kwargs(provider, thinking_budget);
    match provider {
        Provider::OpenAi if capabilities.supports_reasoning => {
            map.insert(
                "reasoning".to_string(),
                json!({ "effort": "high", "summary": "auto" }),
            );
        }
        Provider::Anthropic if capabilities.supports_native_thinking => {
            map.insert(
                "thinking".to_string(),
                json!({
                    "type": "enabled",
                    "budget_tokens": thinking_budget.saturating_sub(1),
                }),
            );
        }
        Provider::Google if capabilities.supports_native_thinking => {
            map.insert("thinking_budget".to_string(), json!(thinking_budget.saturating_sub(1)));
        }
        _ => {}
    }
    map
}

/// Extract zero or more thinking-delta strings from one raw provider stream
/// chunk (a JSON object with at least a `type` field).
///
/// Default: `block.thinking` when `type == "thinking"`. OpenAI additionally
/// understands `{type: "reasoning"}` blocks: each `summary[].text` entry,
/// then `block.reasoning` if present.
pub fn extract_thinking_deltas(provider: Provider, block: &Value) -> Vec<String> {
    let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
    let mut out = Vec::new();
    if block_type == "thinking" {
        if let Some(t) = block.get("thinking").and_then(Value::as_str) {
            if !t.is_empty() {
                out.push(t.to_string());
            }
        }
        return out;
    }
    if provider == Provider::OpenAi && block_type == "reasoning" {
        if let Some(summary) = block.get("summary").and_then(Value::as_array) {
            for part in summary {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    if !t.is_empty() {
                        out.push(t.to_string());
                    }
                }
            }
        }
        if let Some(t) = block.get("reasoning").and_then(Value::as_str) {
            if !t.is_empty() {
                out.push(t.to_string());
            }
        }
    }
    out
}

/// `block.text` for `type == "text"` blocks, else `""`.
pub fn extract_text_delta(block: &Value) -> String {
    if block.get("type").and_then(Value::as_str) == Some("text") {
        block.get("text").and_then(Value::as_str).unwrap_or("").to_string()
    } else {
        String::new()
    }
}

const STALE_ID_PREFIXES: &[&str] = &["rs_", "resp_", "msg_", "item_"];
const STALE_ID_KEYS: &[&str] = &["id", "item_id", "response_id"];

/// Normalize historical content before resubmission to a provider.
///
/// Empty `text`/`thinking` blocks are dropped from list content for every
/// provider. OpenAI's Responses API additionally rejects stale `{id,
/// item_id, response_id}` bookkeeping keys carried over from a prior turn,
/// so those are stripped only when `provider == OpenAi`.
pub fn normalize_history_content(provider: Provider, content: &mut Value) {
    remove_empty_text_or_thinking(content);
    if provider == Provider::OpenAi {
        strip_stale_ids(content);
    }
}

fn remove_empty_text_or_thinking(value: &mut Value) {
    match value {
        Value::Array(items) => {
            items.retain(|item| !is_empty_text_or_thinking(item));
            for item in items.iter_mut() {
                remove_empty_text_or_thinking(item);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                remove_empty_text_or_thinking(v);
            }
        }
        _ => {}
    }
}

fn strip_stale_ids(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_stale_ids(item);
            }
        }
        Value::Object(map) => {
            let stale_keys: Vec<String> = map
                .iter()
                .filter(|(k, v)| {
                    STALE_ID_KEYS.contains(&k.as_str())
                        && v.as_str().is_some_and(|s| STALE_ID_PREFIXES.iter().any(|p| s.starts_with(p)))
                })
                .map(|(k, _)| k.clone())
                .collect();
            for k in stale_keys {
                map.remove(&k);
            }
            for v in map.values_mut() {
                strip_stale_ids(v);
            }
        }
        _ => {}
    }
}

/// Mirrors `history_normalizer.py`'s use of `.strip()`: whitespace-only text
/// counts as empty, not just the zero-length string.
fn is_empty_text_or_thinking(item: &Value) -> bool {
    let ty = item.get("type").and_then(Value::as_str);
    match ty {
        Some("text") => item.get("text").and_then(Value::as_str).is_some_and(|s| s.trim().is_empty()),
        Some("thinking") => item.get("thinking").and_then(Value::as_str).is_some_and(|s| s.trim().is_empty()),
        _ => false,
    }
}
