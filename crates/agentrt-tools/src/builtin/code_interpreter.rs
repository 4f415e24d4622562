// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::media::sandbox_url;
use crate::policy::ApprovalPolicy;
use crate::result::ToolResult;
use crate::tool::{OutputCategory, Tool, ToolCall};

const OUTPUT_LIMIT_CHARS: usize = 50_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Executes short code snippets in a subprocess and reports stdout, stderr,
/// and any files the snippet wrote under the workspace as `sandbox:///` URLs.
pub struct CodeInterpreterTool {
    pub workspace_root: PathBuf,
    pub timeout_secs: u64,
}

impl CodeInterpreterTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root, timeout_secs: DEFAULT_TIMEOUT_SECS }
    }
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn name(&self) -> &str {
        "code_interpreter"
    }

    fn description(&self) -> &str {
        "Executes a code snippet in a subprocess (default language: python). Captures stdout, \
         stderr, and the exit code; runs with a bounded timeout and no stdin."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Source code to execute" },
                "language": {
                    "type": "string",
                    "description": "Interpreter to use (default 'python')",
                    "enum": ["python"]
                }
            },
            "required": ["code"],
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
        let code = match call.args.get("code").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolResult::err("code_interpreter", "missing required parameter 'code'"),
        };
        let language = call.args.get("language").and_then(|v| v.as_str()).unwrap_or("python");
        if language != "python" {
            return ToolResult::err("code_interpreter", format!("unsupported language '{language}'"));
        }

        debug!(chars = code.len(), "code_interpreter tool");

        let before: std::collections::HashSet<PathBuf> = snapshot_files(&self.workspace_root);

        let mut cmd = tokio::process::Command::new("python3");
        cmd.arg("-c").arg(&code);
        cmd.current_dir(&self.workspace_root);
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

        let run = tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), cmd.output());
        let output = match run.await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return ToolResult::err("code_interpreter", format!("failed to spawn python3: {e}")),
            Err(_) => {
                return ToolResult::err(
                    "code_interpreter",
                    format!("execution timed out after {}s", self.timeout_secs),
                )
                .with_meta(json!({ "timed_out": true }))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        let success = exit_code == 0;

        let after = snapshot_files(&self.workspace_root);
        let artifacts: Vec<String> = after
            .difference(&before)
            .filter_map(|p| p.strip_prefix(&self.workspace_root).ok())
            .map(sandbox_url)
            .collect();

        let (text, truncated) = cap_chars(&format!("{stdout}{}", if stderr.is_empty() { String::new() } else { format!("\n[stderr]\n{stderr}") }), OUTPUT_LIMIT_CHARS);

        let data = json!({ "exit_code": exit_code, "stdout": stdout, "stderr": stderr, "artifacts": artifacts });
        let mut result = if success {
            ToolResult::ok_with_data("code_interpreter", text, data)
        } else {
            let mut r = ToolResult::err("code_interpreter", format!("[exit {exit_code}]\n{text}"));
            r.data = Some(data);
            r
        };
        if truncated {
            result = result.with_meta(json!({ "truncated": true }));
        }
        result
    }
}

fn snapshot_files(root: &std::path::Path) -> std::collections::HashSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect()
}

fn cap_chars(s: &str, max: usize) -> (String, bool) {
    if s.chars().count() <= max {
        (s.to_string(), false)
    } else {
        (s.chars().take(max).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: "code_interpreter".into(), args }
    }

    #[tokio::test]
    async fn executes_python_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let t = CodeInterpreterTool::new(dir.path().to_path_buf());
        let out = t.arun(&call(json!({"code": "print('hi')"}))).await;
        assert!(out.success, "{:?}", out.error);
        assert_eq!(out.data.unwrap()["stdout"], "hi\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = CodeInterpreterTool::new(dir.path().to_path_buf());
        let out = t.arun(&call(json!({"code": "import sys; sys.exit(3)"}))).await;
        assert!(!out.success);
        assert_eq!(out.data.unwrap()["exit_code"], 3);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let t = CodeInterpreterTool::new(dir.path().to_path_buf());
        let out = t.arun(&call(json!({"code": "1", "language": "ruby"}))).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn missing_code_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = CodeInterpreterTool::new(dir.path().to_path_buf());
        let out = t.arun(&call(json!({}))).await;
        assert!(!out.success);
    }

    #[test]
    fn cap_chars_passes_short_text_unchanged() {
        let (text, truncated) = cap_chars("short", 100);
        assert_eq!(text, "short");
        assert!(!truncated);
    }
}
