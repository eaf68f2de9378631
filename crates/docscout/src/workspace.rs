//! Path handling relative to the workspace root.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Directories that never hold documents worth indexing.
pub(crate) const IGNORED_DIRS: &[&str] = &["__pycache__", "node_modules", "target"];

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PathError {
    #[error("Path is outside the workspace: {0}")]
    OutsideWorkspace(String),
}

/// Resolves a path given by the model against the workspace root.
///
/// Relative paths are joined to `root`, absolute paths are taken as is.
/// `.` and `..` are resolved lexically, then symlinks are resolved for
/// paths that exist. The result must stay under `root`.
pub(crate) fn resolve_path_under(
    root: &Path,
    path_param: &str,
) -> Result<PathBuf, PathError> {
    let path_param = path_param.trim();
    let path_param = if path_param.is_empty() {
        "."
    } else {
        path_param
    };
    let outside = || PathError::OutsideWorkspace(path_param.to_owned());

    let normalized = normalize_path(&root.join(path_param));
    if !normalized.starts_with(root) {
        return Err(outside());
    }

    match normalized.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(canonical),
        Ok(_) => Err(outside()),
        // Missing paths are reported by the caller.
        Err(_) => Ok(normalized),
    }
}

/// Renders `path` relative to `root` with forward slashes, `.` for the
/// root itself.
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        ".".to_owned()
    } else {
        parts.join("/")
    }
}

/// Returns whether a file name has a markdown extension.
pub(crate) fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Returns whether a directory entry is skipped by the indexer.
pub(crate) fn is_skipped_entry(name: &str) -> bool {
    name.starts_with('.') || IGNORED_DIRS.contains(&name)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
