use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docscout_core::tool::{Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::workspace::{is_markdown, relative_path, resolve_path_under};

#[derive(Deserialize, JsonSchema)]
pub struct ListDirectoryFilesParameters {
    #[schemars(
        description = "Directory to list, relative to the workspace root or absolute."
    )]
    path: String,
}

/// A tool for listing markdown documents under a directory, recursively.
pub struct ListDirectoryFilesTool {
    root: Arc<PathBuf>,
    parameter_schema: Value,
}

impl ListDirectoryFilesTool {
    /// Creates a new tool listing documents under `root`.
    #[inline]
    pub fn new(root: Arc<PathBuf>) -> Self {
        ListDirectoryFilesTool {
            root,
            parameter_schema: schema_for!(ListDirectoryFilesParameters)
                .to_value(),
        }
    }
}

impl Tool for ListDirectoryFilesTool {
    type Input = ListDirectoryFilesParameters;

    fn name(&self) -> &str {
        "list_directory_files"
    }

    fn description(&self) -> &str {
        r#"
Lists all markdown (.md) files under a directory, including subdirectories.
Paths in the result are relative to the workspace root and sorted, like ["a/b/c.md", "a/e/f/d.md"]."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ListDirectoryFilesParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let root = Arc::clone(&self.root);
        async move {
            spawn_blocking(move || list_markdown_files(&root, &input.path))
                .await
                .map_err(super::join_error)
        }
    }
}

fn list_markdown_files(root: &Path, path_param: &str) -> Value {
    let error = |reason: String| json!({ "error": reason, "files": [] });

    let target = match resolve_path_under(root, path_param) {
        Ok(target) => target,
        Err(err) => return error(err.to_string()),
    };
    if !target.exists() {
        return error(format!("Path does not exist: {path_param}"));
    }
    if !target.is_dir() {
        return error(format!("Path is not a directory: {path_param}"));
    }

    let mut files = vec![];
    let mut errors = vec![];
    for entry in WalkDir::new(&target).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let reason = walk_error_reason(&err);
                return error(format!("{reason}: {path_param}"));
            }
            Err(err) => {
                // Unreadable subdirectories are reported, the rest is kept.
                warn!("skipping unreadable entry: {err}");
                errors.push(json!({
                    "path": err.path().map(|path| relative_path(root, path)),
                    "error": walk_error_reason(&err),
                }));
                continue;
            }
        };
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            files.push(relative_path(root, entry.path()));
        }
    }
    files.sort();

    let mut result = json!({
        "path": relative_path(root, &target),
        "file_count": files.len(),
        "files": files,
    });
    if !errors.is_empty() {
        result["errors"] = json!(errors);
    }
    result
}

fn walk_error_reason(err: &walkdir::Error) -> String {
    let permission_denied = err
        .io_error()
        .is_some_and(|err| err.kind() == ErrorKind::PermissionDenied);
    if permission_denied {
        "Permission denied".to_owned()
    } else {
        format!("Failed to walk the directory ({err})")
    }
}
