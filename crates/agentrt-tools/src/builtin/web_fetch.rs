// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};

const DEFAULT_MAX_LENGTH: usize = 50_000;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetches a URL and converts it to readable text. HTML is converted to markdown-like \
         plain text; JSON is pretty-printed. Read-only, no authentication support, capped at \
         50,000 characters by default."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)" },
                "max_length": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 50000)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let url = match call.args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolResult::err("web_fetch", "missing required parameter 'url'"),
        };
        let max_length = call
            .args
            .get("max_length")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_LENGTH as u64) as usize;

        debug!(url = %url, "web_fetch tool");

        match fetch_url(&url, max_length).await {
            Ok((content, truncated)) => {
                let mut result = ToolResult::ok("web_fetch", content);
                if truncated {
                    result = result.with_meta(json!({ "truncated": true }));
                }
                result
            }
            Err(e) => ToolResult::err("web_fetch", format!("fetch error: {e}")),
        }
    }
}

async fn fetch_url(url: &str, max_length: usize) -> anyhow::Result<(String, bool)> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("agentrt/0.1")
        .build()?;

    let response = client.get(url).send().await?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.chars().count() > max_length {
        let truncated: String = content.chars().take(max_length).collect();
        Ok((format!("{truncated}...[truncated at {max_length} chars]"), true))
    } else {
        Ok((content, false))
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn schema_requires_url() {
        let t = WebFetchTool;
        let schema = t.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("url")));
    }

    #[tokio::test]
    async fn missing_url_is_error() {
        let t = WebFetchTool;
        let out = t.arun(&ToolCall { id: "1".into(), name: "web_fetch".into(), args: json!({}) }).await;
        assert!(!out.success);
    }
}
