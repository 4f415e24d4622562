// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use agentrt_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{OutputCategory, Tool, ToolCall};
use crate::workspace::confine;

const DEFAULT_LIMIT: usize = 100;
const OUTPUT_LIMIT_CHARS: usize = 50_000;
const PROBE_BYTES: usize = 8192;

pub struct GrepTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents by regular expression. `output_mode`: content (default, shows \
         file:line:text), files_with_matches, or count. Binary files are skipped. Results capped \
         at `limit` matches (default 100) and 50,000 total characters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in, relative to the workspace (default '.')"
                },
                "include": { "type": "string", "description": "Glob filter on file names, e.g. '*.rs'" },
                "case_sensitive": { "type": "boolean", "description": "Case-sensitive search (default true)" },
                "limit": { "type": "integer", "description": "Maximum number of matches (default 100)" },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output format (default content)"
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Lines of context before and after each match (default 0)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolResult::err("grep", "missing required parameter 'pattern'"),
        };
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let include = call.args.get("include").and_then(|v| v.as_str());
        let case_sensitive = call.args.get("case_sensitive").and_then(|v| v.as_bool()).unwrap_or(true);
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_LIMIT as u64) as usize;
        let output_mode = call.args.get("output_mode").and_then(|v| v.as_str()).unwrap_or("content");
        let context_lines = call.args.get("context_lines").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

        debug!(pattern = %pattern, path, output_mode, "grep tool");

        let regex = match RegexBuilder::new(&pattern).case_insensitive(!case_sensitive).build() {
            Ok(r) => r,
            Err(e) => return ToolResult::err("grep", format!("invalid pattern: {e}")),
        };
        let include_regex = match include.map(include_glob_to_regex) {
            Some(Ok(r)) => Some(r),
            Some(Err(e)) => return ToolResult::err("grep", format!("invalid include pattern: {e}")),
            None => None,
        };

        let resolved = match confine(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("grep", e.to_string()),
        };

        let files: Vec<PathBuf> = if resolved.is_file() {
            vec![resolved.clone()]
        } else {
            WalkDir::new(&resolved)
                .into_iter()
                .filter_entry(|e| !is_excluded(e.path()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect()
        };

        let mut lines_out: Vec<String> = Vec::new();
        let mut files_matched: Vec<String> = Vec::new();
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut total_matches = 0usize;

        'files: for file in &files {
            if let Some(ref inc) = include_regex {
                let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                if !inc.is_match(&name) {
                    continue;
                }
            }
            let Ok(bytes) = std::fs::read(file) else { continue };
            if bytes[..bytes.len().min(PROBE_BYTES)].contains(&0u8) {
                continue; // binary file
            }
            let Ok(text) = String::from_utf8(bytes) else { continue };
            let file_lines: Vec<&str> = text.lines().collect();
            let mut file_match_count = 0usize;

            for (i, line) in file_lines.iter().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                file_match_count += 1;
                total_matches += 1;
                match output_mode {
                    "files_with_matches" => {
                        files_matched.push(file.display().to_string());
                        continue 'files;
                    }
                    "count" => continue,
                    _ => {
                        if context_lines > 0 {
                            let start = i.saturating_sub(context_lines);
                            let end = (i + context_lines + 1).min(file_lines.len());
                            for j in start..end {
                                lines_out.push(format!("{}:{}:{}", file.display(), j + 1, file_lines[j]));
                            }
                        } else {
                            lines_out.push(format!("{}:{}:{}", file.display(), i + 1, line));
                        }
                    }
                }
                if lines_out.len() >= limit {
                    break 'files;
                }
            }
            if file_match_count > 0 && output_mode == "count" {
                counts.push((file.display().to_string(), file_match_count));
            }
        }

        let text = match output_mode {
            "files_with_matches" => files_matched.join("\n"),
            "count" => counts.iter().map(|(f, c)| format!("{f}:{c}")).collect::<Vec<_>>().join("\n"),
            _ => lines_out.join("\n"),
        };

        if text.is_empty() {
            return ToolResult::ok("grep", "(no matches)");
        }

        let (capped, truncated_chars) = cap_chars(&text, OUTPUT_LIMIT_CHARS);
        let truncated_by_limit = output_mode == "content" && total_matches > limit;
        let mut result = ToolResult::ok_with_data(
            "grep",
            capped,
            json!({ "matches": total_matches }),
        );
        if truncated_chars || truncated_by_limit {
            result = result.with_meta(json!({ "truncated": true }));
        }
        result
    }
}

/// Translate a simple file-name glob (`*`, `?`, `{a,b}`) into a regex matched
/// against a bare file name (not a full path).
fn include_glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let alts: Vec<String> = if let Some(open) = pattern.find('{') {
        if let Some(close) = pattern[open..].find('}').map(|i| i + open) {
            pattern[open + 1..close]
                .split(',')
                .map(|a| format!("{}{a}{}", &pattern[..open], &pattern[close + 1..]))
                .collect()
        } else {
            vec![pattern.to_string()]
        }
    } else {
        vec![pattern.to_string()]
    };

    let mut out = String::from("^(");
    for (i, alt) in alts.iter().enumerate() {
        if i > 0 {
            out.push('|');
        }
        for c in alt.chars() {
            match c {
                '*' => out.push_str(".*"),
                '?' => out.push('.'),
                '.' | '+' | '(' | ')' | '|' | '^' | '$' | '[' | ']' | '\\' => {
                    out.push('\\');
                    out.push(c);
                }
                other => out.push(other),
            }
        }
    }
    out.push_str(")$");
    Regex::new(&out)
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        let s = c.as_os_str();
        s == ".git" || s == "target" || s == "node_modules"
    })
}

fn cap_chars(s: &str, max: usize) -> (String, bool) {
    if s.chars().count() <= max {
        (s.to_string(), false)
    } else {
        let capped: String = s.chars().take(max).collect();
        (capped, true)
    }
}
