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

pub struct EditTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replaces an exact occurrence of `old_string` with `new_string` in a file. \
         Fails if `old_string` is not found, or if it occurs more than once and \
         `replace_all` is not set."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the file to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring exactly one (default false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"],
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
            None => return ToolResult::err("edit", "missing required parameter 'file_path'"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("edit", "missing required parameter 'old_string'"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("edit", "missing required parameter 'new_string'"),
        };
        let replace_all = call.args.get("replace_all").and_then(|v| v.as_bool()).unwrap_or(false);

        if old_string.is_empty() {
            return ToolResult::err("edit", "'old_string' must not be empty");
        }

        let resolved = match confine(&self.workspace_root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("edit", e.to_string()),
        };

        debug!(path = %resolved.display(), replace_all, "edit tool");

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::err("edit", format!("failed to read file: {e}")),
        };

        let count = content.matches(old_string).count();
        if count == 0 {
            return ToolResult::err("edit", format!("'old_string' not found in {file_path}"));
        }
        if count > 1 && !replace_all {
            return ToolResult::err(
                "edit",
                format!(
                    "'old_string' matches {count} locations in {file_path}; \
                     pass replace_all=true or narrow old_string to a unique match"
                ),
            );
        }

        let replacements = if replace_all { count } else { 1 };
        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        match tokio::fs::write(&resolved, new_content).await {
            Ok(_) => ToolResult::ok_with_data(
                "edit",
                format!("made {replacements} replacement(s) in {file_path}"),
                json!({ "replacements": replacements }),
            ),
            Err(e) => ToolResult::err("edit", format!("failed to write file: {e}")),
        }
    }
}
