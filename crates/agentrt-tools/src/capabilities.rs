// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool capability annotation: whether a given tool is read-only, and which
//! MCP server (if any) it belongs to.

use std::collections::HashMap;

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    Mcp { server: String },
}

#[derive(Debug, Clone)]
pub struct ToolCapabilities {
    pub source: ToolSource,
    pub read_only: bool,
}

/// Built-in tools that are read-only by default.
pub const BUILTIN_READ_ONLY: &[&str] =
    &["read", "list", "glob", "grep", "web_fetch", "web_search"];

/// Per-server (or globally-unique) capability override, as configured on
/// `AgentConfig.mcp_servers`.
#[derive(Debug, Clone, Default)]
pub struct McpOverrides {
    /// `server_name -> tool_name -> read_only`
    per_server: HashMap<String, HashMap<String, bool>>,
    /// `tool_name -> read_only`, applied when the tool name is unique across
    /// every configured server.
    global: HashMap<String, bool>,
}

impl McpOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_server_override(&mut self, server: &str, tool: &str, read_only: bool) {
        self.per_server
            .entry(server.to_string())
            .or_default()
            .insert(tool.to_string(), read_only);
    }

    pub fn set_global_override(&mut self, tool: &str, read_only: bool) {
        self.global.insert(tool.to_string(), read_only);
    }

    /// Resolution order: explicit per-server override → globally-unique key
    /// across servers → `declared_read_only` (the tool's own metadata flag)
    /// → `false`.
    pub fn resolve(
        &self,
        server: &str,
        tool: &str,
        declared_read_only: Option<bool>,
    ) -> bool {
        if let Some(map) = self.per_server.get(server) {
            if let Some(v) = map.get(tool) {
                return *v;
            }
        }
        if let Some(v) = self.global.get(tool) {
            return *v;
        }
        declared_read_only.unwrap_or(false)
    }
}

/// Extract the server name a namespaced MCP tool belongs to.
///
/// Tries the declared metadata first; falls back to a name-prefix heuristic
/// using the separators `.`, `__`, `:`, `/` in that priority order.
pub fn server_name_for(tool_name: &str, declared_server: Option<&str>) -> Option<String> {
    if let Some(s) = declared_server {
        return Some(s.to_string());
    }
    for sep in ['.', ':', '/'] {
        if let Some((prefix, _)) = tool_name.split_once(sep) {
            return Some(prefix.to_string());
        }
    }
    if let Some((prefix, _)) = tool_name.split_once("__") {
        return Some(prefix.to_string());
    }
    None
}

/// Annotate the built-in tool set with default capabilities.
pub fn annotate_builtin(tool_names: &[String]) -> HashMap<String, ToolCapabilities> {
    tool_names
        .iter()
        .map(|name| {
            let read_only = BUILTIN_READ_ONLY.contains(&name.as_str());
            (
                name.clone(),
                ToolCapabilities { source: ToolSource::Builtin, read_only },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_read_tool_is_read_only() {
        let caps = annotate_builtin(&["read".into(), "write".into()]);
        assert!(caps["read"].read_only);
        assert!(!caps["write"].read_only);
    }

    #[test]
    fn server_name_prefers_declared_metadata() {
        assert_eq!(
            server_name_for("foo.bar", Some("explicit")),
            Some("explicit".to_string())
        );
    }

    #[test]
    fn server_name_falls_back_to_dot_prefix() {
        assert_eq!(server_name_for("github.create_issue", None), Some("github".into()));
    }

    #[test]
    fn server_name_falls_back_to_double_underscore() {
        assert_eq!(server_name_for("github__create_issue", None), Some("github".into()));
    }

    #[test]
    fn server_name_falls_back_to_colon() {
        assert_eq!(server_name_for("github:create_issue", None), Some("github".into()));
    }

    #[test]
    fn server_name_none_when_no_separator() {
        assert_eq!(server_name_for("create_issue", None), None);
    }

    #[test]
    fn per_server_override_wins_over_global() {
        let mut o = McpOverrides::new();
        o.set_global_override("create_issue", true);
        o.set_server_override("github", "create_issue", false);
        assert!(!o.resolve("github", "create_issue", Some(true)));
    }

    #[test]
    fn global_override_wins_over_declared_metadata() {
        let mut o = McpOverrides::new();
        o.set_global_override("create_issue", false);
        assert!(!o.resolve("github", "create_issue", Some(true)));
    }

    #[test]
    fn declared_metadata_used_when_no_overrides() {
        let o = McpOverrides::new();
        assert!(o.resolve("github", "create_issue", Some(true)));
    }

    #[test]
    fn default_is_false_when_nothing_declared() {
        let o = McpOverrides::new();
        assert!(!o.resolve("github", "create_issue", None));
    }
}
