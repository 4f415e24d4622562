// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Workspace path confinement.
//!
//! Every tool that accepts a path argument must resolve it through
//! [`confine`] before touching the filesystem. Confinement is a
//! component-wise descendant check against the canonical workspace root,
//! never a string-prefix check — `/workspace-evil` must not be treated as
//! inside `/workspace`.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path {0:?} is outside the workspace")]
    OutsideWorkspace(PathBuf),
    #[error("workspace root {0:?} does not exist")]
    RootNotFound(PathBuf),
    #[error("failed to resolve path: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve `input` against `workspace_root`, rejecting any path that escapes
/// the workspace once symlinks and `..` components are accounted for.
///
/// Steps:
/// 1. Canonicalize `workspace_root`.
/// 2. If `input` is relative, join it onto the canonical root; otherwise
///    use it as given.
/// 3. Normalize `..`/`.` components (a best-effort lexical pass for paths
///    that may not exist yet, e.g. a `write` target) then canonicalize the
///    deepest existing ancestor to resolve symlinks.
/// 4. Reject the result if it is not a path-component descendant of the
///    canonical root.
pub fn confine(workspace_root: &Path, input: &str) -> Result<PathBuf, PathError> {
    let root = workspace_root
        .canonicalize()
        .map_err(|_| PathError::RootNotFound(workspace_root.to_path_buf()))?;

    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let normalized = lexical_normalize(&joined);
    let resolved = resolve_existing_prefix(&normalized)?;

    if is_descendant(&root, &resolved) {
        Ok(resolved)
    } else {
        Err(PathError::OutsideWorkspace(resolved))
    }
}

/// Lexically collapse `.` and `..` components without touching the
/// filesystem (the path may not exist yet).
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path`, then re-append the
/// remaining (not-yet-existing) components. This resolves symlinks in the
/// existing portion while still allowing confinement checks on paths that
/// will be created (e.g. a new file from `write`).
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf, PathError> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if existing.exists() {
            let canon = existing.canonicalize()?;
            let mut result = canon;
            for comp in tail.iter().rev() {
                result.push(comp);
            }
            return Ok(result);
        }
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => {
                // Nothing exists at all (unlikely, root is canonicalized).
                return Ok(path.to_path_buf());
            }
        }
    }
}

fn is_descendant(root: &Path, candidate: &Path) -> bool {
    let mut root_components = root.components();
    let mut cand_components = candidate.components();
    loop {
        match root_components.next() {
            None => return true,
            Some(rc) => match cand_components.next() {
                Some(cc) if cc == rc => continue,
                _ => return false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn relative_path_resolves_inside_root() {
        let root = tmp_root();
        std::fs::write(root.path().join("a.txt"), "x").unwrap();
        let resolved = confine(root.path(), "a.txt").unwrap();
        assert_eq!(resolved, root.path().canonicalize().unwrap().join("a.txt"));
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let root = tmp_root();
        let err = confine(root.path(), "../etc/passwd").unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace(_)));
    }

    #[test]
    fn new_file_under_root_is_allowed() {
        let root = tmp_root();
        let resolved = confine(root.path(), "new/nested/file.txt").unwrap();
        assert!(resolved.starts_with(root.path().canonicalize().unwrap()));
    }

    #[test]
    fn shared_string_prefix_sibling_is_rejected() {
        let root = tmp_root();
        let sibling_name = format!(
            "{}-evil",
            root.path().file_name().unwrap().to_str().unwrap()
        );
        let sibling = root.path().parent().unwrap().join(sibling_name);
        let abs = sibling.to_str().unwrap().to_string();
        let err = confine(root.path(), &abs);
        assert!(err.is_err());
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let root = tmp_root();
        let abs = root.path().canonicalize().unwrap().join("file.txt");
        let resolved = confine(root.path(), abs.to_str().unwrap()).unwrap();
        assert_eq!(resolved, abs);
    }

    #[test]
    fn error_message_names_outside_the_workspace() {
        let root = tmp_root();
        let err = confine(root.path(), "/etc/passwd").unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
    }
}
