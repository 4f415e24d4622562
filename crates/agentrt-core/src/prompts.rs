// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

/// Contextual inputs for assembling the stable (cacheable) system prompt.
///
/// Volatile context (git branch/commit, CI environment) is assembled
/// separately by [`crate::runtime_context::AgentRuntimeContext`] and carried
/// as `CompletionRequest.system_dynamic_suffix` instead of living here, so
/// that adding it to a request never perturbs the cached prefix.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    pub workspace_root: Option<&'a Path>,
    /// Stable names of the tools registered for this conversation, used to
    /// generate tool-usage guidance without hard-coding a fixed tool list.
    pub tool_names: &'a [String],
    /// Project instructions file content (`AGENTS.md`, `.agentrt/context.md`).
    pub project_context_file: Option<&'a str>,
    /// Text appended verbatim after the Guidelines section.
    pub append: Option<&'a str>,
}

mod guidelines {
    pub fn general() -> &'static str {
        "- Be concise and precise. Use tools instead of guessing.\n\
         - Batch independent tool calls in parallel to increase efficiency."
    }

    pub fn tool_usage(tool_names: &[String]) -> String {
        let has = |name: &str| tool_names.iter().any(|t| t == name);
        let mut lines = Vec::new();
        if has("read") && has("shell") {
            lines.push(
                "- NEVER use `shell` for file I/O — use `read`/`write`/`edit`/`grep`/`glob` instead.",
            );
        }
        if has("edit") && has("write") {
            lines.push("- Prefer `edit` over `write` for modifying existing files (preserves surrounding context).");
        }
        if has("glob") && has("grep") && has("read") {
            lines.push("- Discovery workflow: `glob` to find files, `grep` to narrow, `read` with an offset/limit for context.");
        }
        if has("task") {
            lines.push("- Delegate broad, read-only exploration to the `task` tool rather than reading many files directly.");
        }
        if lines.is_empty() {
            lines.push("- Use the registered tools instead of asking the user to run commands manually.");
        }
        lines.join("\n")
    }

    pub fn code_quality() -> &'static str {
        "- Make sure all the code you generate is production quality and follows good separation \
         of concerns and clean code principles.\n\
         - NEVER create new files proactively unless explicitly requested.\n\
         - Write tests when adding new functionality.\n\
         - Preserve existing code structure and coding style patterns."
    }

    pub fn error_handling() -> &'static str {
        "- When a tool fails, try a different approach before asking the user.\n\
         - Prefer the `question` tool over a free-form text question when a decision needs an \
           explicit choice from the user."
    }
}

fn build_guidelines_section(tool_names: &[String]) -> String {
    format!(
        "## Guidelines\n\n\
         ### General Principles\n\
         {}\n\n\
         ### Tool Usage Patterns\n\
         {}\n\n\
         ### Code Quality\n\
         {}\n\n\
         ### Error Handling\n\
         {}",
        guidelines::general(),
        guidelines::tool_usage(tool_names),
        guidelines::code_quality(),
        guidelines::error_handling(),
    )
}

/// Assemble the stable system prompt. `custom` overrides everything below the
/// identity line except `ctx.append`, which is always honoured.
pub fn system_prompt(custom: Option<&str>, ctx: PromptContext<'_>) -> String {
    if let Some(custom) = custom {
        if let Some(extra) = ctx.append {
            return format!("{}\n\n{}", custom.trim_end(), extra);
        }
        return custom.to_string();
    }

    let identity = "You are a capable coding agent. You can read and write files, run shell \
                     commands, and search the codebase. Work systematically, verify your \
                     changes, and report your progress clearly.";

    let workspace_section = if let Some(root) = ctx.workspace_root {
        format!(
            "\n\n## Workspace\n\
             Workspace root: `{}`\n\
             - Use this absolute path for all file read/write operations.\n\
             - Prefer absolute paths over relative paths in every tool call.\n\
             - Tool-referenced media uses `sandbox:///<relpath>` URLs rooted here.",
            root.display()
        )
    } else {
        String::new()
    };

    let context_file_section = if let Some(content) = ctx.project_context_file {
        format!("\n\n## Project Instructions\n\n{content}")
    } else {
        String::new()
    };

    let guidelines_section = build_guidelines_section(ctx.tool_names);

    let append_section = if let Some(extra) = ctx.append {
        format!("\n\n{extra}")
    } else {
        String::new()
    };

    format!(
        "{identity}{workspace_section}{context_file_section}\n\n{guidelines_section}{append_section}"
    )
}
