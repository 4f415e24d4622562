// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod capabilities;
pub mod media;
pub mod policy;
pub mod registry;
pub mod result;
pub mod tool;
pub mod workspace;

pub use capabilities::{McpOverrides, ToolCapabilities, ToolSource, BUILTIN_READ_ONLY};
pub use media::{classify, mime_type, sandbox_url, MediaClass};
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use result::{ContentBlock, ToolResult};
pub use tool::{OutputCategory, Tool, ToolCall};
pub use workspace::{confine, PathError};

pub use builtin::code_interpreter::CodeInterpreterTool;
pub use builtin::edit::EditTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::image_generation::ImageGenerationTool;
pub use builtin::list::ListTool;
pub use builtin::question::{parse_questions, Question, QuestionRegistry, QuestionTool};
pub use builtin::read::ReadTool;
pub use builtin::shell::ShellTool;
pub use builtin::task::{SubagentRunner, TaskTool};
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write::WriteTool;
