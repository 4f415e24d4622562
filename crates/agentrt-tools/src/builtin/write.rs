// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agentrt_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};
use crate::workspace::confine;

pub struct WriteTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Writes a file to the local filesystem, overwriting it if it already exists. \
         ALWAYS prefer editing existing files with `edit`. NEVER write new files unless \
         explicitly required. NEVER proactively create documentation or README files unless \
         explicitly requested. Creates parent directories automatically."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let file_path = match call.args.get("file_path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::err("write", "missing required parameter 'file_path'"),
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolResult::err("write", "missing required parameter 'content'"),
        };

        let resolved = match confine(&self.workspace_root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("write", e.to_string()),
        };

        debug!(path = %resolved.display(), "write tool");

        if let Some(parent) = resolved.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::err("write", format!("failed to create parent dirs: {e}"));
                }
            }
        }

        match tokio::fs::write(&resolved, &content).await {
            Ok(_) => ToolResult::ok_with_data(
                "write",
                format!("wrote {} chars to {}", content.chars().count(), file_path),
                json!({ "chars_written": content.chars().count() }),
            ),
            Err(e) => ToolResult::err("write", format!("write error: {e}")),
        }
    }
}
