// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use agentrt_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{Tool, ToolCall};
use crate::workspace::confine;

const DEFAULT_MAX_RESULTS: usize = 1000;

pub struct GlobTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern, sorted by modification time (newest first). \
         Supports `*`, `**`, and brace alternation (`{a,b}`). Excludes .git/ and target/ \
         automatically. Capped at 1000 results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. '*.rs', '**/*.rs', 'src/**/*.{ts,tsx}'"
                },
                "root": {
                    "type": "string",
                    "description": "Directory to search from, relative to the workspace (default '.')"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 1000)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolResult::err("glob", "missing required parameter 'pattern'"),
        };
        let root = call.args.get("root").and_then(|v| v.as_str()).unwrap_or(".");
        let max_results = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        debug!(pattern = %pattern, root, "glob tool");

        let resolved_root = match confine(&self.workspace_root, root) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("glob", e.to_string()),
        };

        let regexes: Vec<Regex> = match expand_braces(&pattern)
            .iter()
            .map(|alt| glob_to_regex(alt))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(r) => r,
            Err(e) => return ToolResult::err("glob", format!("invalid pattern: {e}")),
        };

        let mut matches: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&resolved_root)
            .into_iter()
            .filter_entry(|e| !is_excluded(e.path()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&resolved_root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if regexes.iter().any(|re| re.is_match(&rel_str)) {
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry.path().to_path_buf(), mtime));
            }
        }

        matches.sort_by(|a, b| b.1.cmp(&a.1));
        let total = matches.len();
        let truncated = total > max_results;
        matches.truncate(max_results);

        if matches.is_empty() {
            return ToolResult::ok("glob", "(no matches)");
        }

        let paths: Vec<String> = matches
            .iter()
            .map(|(p, _)| p.to_string_lossy().to_string())
            .collect();
        let text = paths.join("\n");
        let mut result = ToolResult::ok_with_data("glob", text, json!({ "count": paths.len(), "total": total }));
        if truncated {
            result = result.with_meta(json!({ "truncated": true }));
        }
        result
    }
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        let s = c.as_os_str();
        s == ".git" || s == "target"
    })
}

/// Expand one level of `{a,b,c}` brace alternation into separate patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(open) = pattern.find('{') {
        if let Some(close) = pattern[open..].find('}').map(|i| i + open) {
            let prefix = &pattern[..open];
            let suffix = &pattern[close + 1..];
            let alts = &pattern[open + 1..close];
            return alts
                .split(',')
                .map(|a| format!("{prefix}{a}{suffix}"))
                .collect();
        }
    }
    vec![pattern.to_string()]
}

/// Translate a glob pattern (with `*`, `**`, `?`) into an anchored regex
/// matching a `/`-separated relative path.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let pattern = pattern.strip_prefix("**/").unwrap_or(pattern);
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    // Also allow the pattern to match anywhere in a deeper path unless it
    // already starts anchored at a directory boundary.
    let anchored = format!("(^|.*/){}", &out[1..]);
    Regex::new(&anchored)
}
