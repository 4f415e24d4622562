// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use agentrt_config::AgentMode;

use crate::media::{classify, read_image_content, sandbox_url, MediaClass};
use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{OutputCategory, Tool, ToolCall};
use crate::workspace::confine;

const DEFAULT_OFFSET: u64 = 0;
const DEFAULT_LIMIT: u64 = 2000;

pub struct ReadTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a file from the workspace and returns its contents with line numbers, \
         cat -n style. Supports offset (0-based lines to skip, default 0) and limit \
         (max lines to return, default 2000) for paging through large files. Image \
         files are inlined as base64 so they can be viewed directly; other binary \
         media is surfaced as a sandbox:// reference."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "Number of lines to skip from the start of the file (default 0)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let file_path = match call.args.get("file_path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::err("read", "missing required parameter 'file_path'"),
        };

        let resolved = match confine(&self.workspace_root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("read", e.to_string()),
        };

        debug!(path = %resolved.display(), "read tool");

        let meta = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) => return ToolResult::err("read", format!("failed to read file: {e}")),
        };
        if !meta.is_file() {
            return ToolResult::err("read", format!("{file_path} is not a regular file"));
        }

        let relative = PathBuf::from(file_path);

        match classify(&resolved) {
            MediaClass::Image => match read_image_content(&resolved, &relative) {
                Ok(Some(blocks)) => ToolResult::ok_with_data(
                    "read",
                    format!("read image {file_path}"),
                    json!({ "bytes": meta.len() }),
                )
                .with_llm_content(blocks),
                Ok(None) => ToolResult::ok_with_data(
                    "read",
                    format!(
                        "image {file_path} exceeds the inline size limit; reference: {}",
                        sandbox_url(&relative)
                    ),
                    json!({ "bytes": meta.len() }),
                )
                .with_meta(json!({ "truncated": true })),
                Err(e) => ToolResult::err("read", format!("failed to read image: {e}")),
            },
            MediaClass::Video | MediaClass::Audio => ToolResult::ok_with_data(
                "read",
                format!("binary media file, reference: {}", sandbox_url(&relative)),
                json!({ "bytes": meta.len() }),
            ),
            MediaClass::Other => {
                let offset = call.args.get("offset").and_then(Value::as_u64).unwrap_or(DEFAULT_OFFSET);
                let limit = call.args.get("limit").and_then(Value::as_u64).unwrap_or(DEFAULT_LIMIT);

                let bytes = match tokio::fs::read(&resolved).await {
                    Ok(b) => b,
                    Err(e) => return ToolResult::err("read", format!("failed to read file: {e}")),
                };
                let text = match String::from_utf8(bytes) {
                    Ok(t) => t,
                    Err(_) => {
                        return ToolResult::ok_with_data(
                            "read",
                            format!("binary file, reference: {}", sandbox_url(&relative)),
                            json!({ "bytes": meta.len() }),
                        )
                    }
                };

                let (rendered, lines_returned) = number_lines(&text, offset, limit);
                ToolResult::ok_with_data(
                    "read",
                    rendered,
                    json!({
                        "file_path": file_path,
                        "offset": offset,
                        "limit": limit,
                        "lines_returned": lines_returned,
                    }),
                )
            }
        }
    }
}

/// Renders `cat -n`-style numbered output for lines `offset+1..=offset+limit`
/// (1-based line numbers, `offset` lines skipped from the start). Returns
/// `"(empty file)"` when no lines fall in that window.
fn number_lines(text: &str, offset: u64, limit: u64) -> (String, usize) {
    if limit == 0 {
        return ("(empty file)".to_string(), 0);
    }
    let mut numbered = String::new();
    let mut lines_returned = 0usize;
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx as u64 + 1;
        if line_no <= offset {
            continue;
        }
        if lines_returned as u64 >= limit {
            break;
        }
        numbered.push_str(&format!("{line_no:>6}\t{line}\n"));
        lines_returned += 1;
    }
    if numbered.is_empty() {
        ("(empty file)".to_string(), 0)
    } else {
        (numbered, lines_returned)
    }
}
