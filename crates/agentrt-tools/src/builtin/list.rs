// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};
use crate::workspace::confine;

const MAX_ENTRIES: usize = 2000;

pub struct ListTool {
    pub workspace_root: PathBuf,
}

#[derive(Serialize)]
struct Entry {
    path: String,
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    depth: usize,
}

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "Lists files and directories under a path, breadth-first. Excludes .git/ and target/ \
         automatically. Capped at 2000 entries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace (default '.')"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum recursion depth (default: unlimited)"
                }
            },
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let max_depth = call.args.get("max_depth").and_then(|v| v.as_u64()).map(|d| d as usize);

        let resolved = match confine(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("list", e.to_string()),
        };

        debug!(path = %resolved.display(), "list tool");

        if !resolved.is_dir() {
            return ToolResult::err("list", format!("{path} is not a directory"));
        }

        let mut entries = Vec::new();
        let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
        queue.push_back((resolved.clone(), 0));
        let mut truncated = false;

        while let Some((dir, depth)) = queue.pop_front() {
            if let Some(max) = max_depth {
                if depth > max {
                    continue;
                }
            }
            let Ok(read_dir) = std::fs::read_dir(&dir) else { continue };
            let mut children: Vec<_> = read_dir.filter_map(|e| e.ok()).collect();
            children.sort_by_key(|e| e.file_name());

            for child in children {
                let name = child.file_name().to_string_lossy().to_string();
                if name == ".git" || name == "target" {
                    continue;
                }
                if entries.len() >= MAX_ENTRIES {
                    truncated = true;
                    break;
                }
                let child_path = child.path();
                let rel = child_path.strip_prefix(&resolved).unwrap_or(&child_path);
                let Ok(meta) = child.metadata() else { continue };
                let kind = if meta.is_dir() { "dir" } else { "file" };
                entries.push(Entry {
                    path: rel.to_string_lossy().to_string(),
                    name,
                    kind,
                    size: meta.len(),
                    depth,
                });
                if meta.is_dir() {
                    queue.push_back((child_path, depth + 1));
                }
            }
            if truncated {
                break;
            }
        }

        let text = entries
            .iter()
            .map(|e| format!("{} [{}]{}", e.path, e.kind, if e.kind == "file" { format!(" {}b", e.size) } else { String::new() }))
            .collect::<Vec<_>>()
            .join("\n");
        let text = if text.is_empty() { "(empty directory)".to_string() } else { text };

        let data = json!({ "entries": entries.iter().map(|e| json!({
            "path": e.path, "name": e.name, "type": e.kind, "size": e.size, "depth": e.depth
        })).collect::<Vec<_>>() });

        let mut result = ToolResult::ok_with_data("list", text, data);
        if truncated {
            result = result.with_meta(json!({ "truncated": true }));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(root: &std::path::Path) -> ListTool {
        ListTool { workspace_root: root.to_path_buf() }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "l1".into(), name: "list".into(), args }
    }

    #[tokio::test]
    async fn lists_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({}))).await;
        assert!(out.success);
        let text = out.text.unwrap();
        assert!(text.contains("a.txt"));
        assert!(text.contains("sub"));
    }

    #[tokio::test]
    async fn recurses_breadth_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/deep.txt"), "").unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({}))).await;
        assert!(out.text.unwrap().contains("deep.txt"));
    }

    #[tokio::test]
    async fn excludes_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "").unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({}))).await;
        assert!(!out.text.unwrap().contains("HEAD"));
    }

    #[tokio::test]
    async fn empty_dir_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({}))).await;
        assert_eq!(out.text.unwrap(), "(empty directory)");
    }

    #[tokio::test]
    async fn non_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "x").unwrap();
        let t = tool(dir.path());
        let out = t.arun(&call(json!({"path": "f.txt"}))).await;
        assert!(!out.success);
    }
}
