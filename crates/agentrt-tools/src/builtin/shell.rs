// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{OutputCategory, Tool, ToolCall};

/// Combined stdout+stderr cap, in characters.
const OUTPUT_LIMIT_CHARS: usize = 50_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { timeout_secs: DEFAULT_TIMEOUT_SECS }
    }
}

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Executes a shell command via `bash -c` and returns its exit code, stdout, and stderr. \
         The command runs with stdin closed and detached from any controlling terminal. \
         Combined output is capped at 50,000 characters (head and tail preserved). \
         `success` is true iff the command exits with status 0."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute via bash -c"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn arun(&self, call: &ToolCall) -> ToolResult {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolResult::err("shell", "missing required parameter 'command'"),
        };
        let timeout = call
            .args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, timeout, "executing shell tool");

        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let run = tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output());
        match run.await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);
                let success = exit_code == 0;

                let mut combined = stdout.clone();
                if !stderr.is_empty() {
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str("[stderr]\n");
                    combined.push_str(&stderr);
                }
                let (text, truncated) = head_tail_truncate(&combined);

                let data = json!({ "exit_code": exit_code, "stdout": stdout, "stderr": stderr });
                let mut result = if success {
                    ToolResult::ok_with_data("shell", text, data)
                } else {
                    let mut r = ToolResult::err("shell", format!("[exit {exit_code}]\n{text}"));
                    r.data = Some(data);
                    r
                };
                if truncated {
                    result = result.with_meta(json!({ "truncated": true }));
                }
                result
            }
            Ok(Err(e)) => ToolResult::err("shell", format!("failed to spawn command: {e}")),
            Err(_) => ToolResult::err("shell", format!("command timed out after {timeout}s"))
                .with_meta(json!({ "timed_out": true })),
        }
    }
}

/// Keep `s` unchanged if within the cap; otherwise keep the first
/// `HEAD_LINES` and last `TAIL_LINES` lines with an omission marker between
/// them. Returns `(text, was_truncated)`.
fn head_tail_truncate(s: &str) -> (String, bool) {
    if s.len() <= OUTPUT_LIMIT_CHARS {
        return (s.to_string(), false);
    }
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        let head = &s[..OUTPUT_LIMIT_CHARS];
        return (
            format!("{head}\n...[output truncated at {OUTPUT_LIMIT_CHARS} chars]..."),
            true,
        );
    }
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    let omitted_lines = lines.len() - HEAD_LINES - TAIL_LINES;
    (
        format!("{head}\n...[{omitted_lines} lines omitted]...\n{tail}"),
        true,
    )
}
