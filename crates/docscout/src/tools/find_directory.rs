use std::path::{Path, PathBuf};
use std::sync::Arc;

use docscout_core::tool::{Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::workspace::relative_path;

#[derive(Deserialize, JsonSchema)]
pub struct FindDirectoryParameters {
    #[schemars(
        description = "Keyword to look for in directory names, case-insensitive."
    )]
    keyword: String,
}

/// A tool for finding directories whose name contains a keyword.
pub struct FindDirectoryTool {
    root: Arc<PathBuf>,
    parameter_schema: Value,
}

impl FindDirectoryTool {
    /// Creates a new tool searching under `root`.
    #[inline]
    pub fn new(root: Arc<PathBuf>) -> Self {
        FindDirectoryTool {
            root,
            parameter_schema: schema_for!(FindDirectoryParameters).to_value(),
        }
    }
}

impl Tool for FindDirectoryTool {
    type Input = FindDirectoryParameters;

    fn name(&self) -> &str {
        "find_directory"
    }

    fn description(&self) -> &str {
        r#"
Finds directories in the workspace whose name contains the keyword (case-insensitive).
Returns the matching paths relative to the workspace root."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: FindDirectoryParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let root = Arc::clone(&self.root);
        async move {
            spawn_blocking(move || find_directories(&root, &input.keyword))
                .await
                .map_err(super::join_error)
        }
    }
}

fn find_directories(root: &Path, keyword: &str) -> Value {
    let needle = keyword.to_lowercase();
    let mut matching_dirs = vec![];
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping an unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.to_lowercase().contains(&needle) {
            matching_dirs.push(relative_path(root, entry.path()));
        }
    }
    matching_dirs.sort();

    json!({
        "count": matching_dirs.len(),
        "matching_directories": matching_dirs,
        "keyword": keyword,
        "workspace_path": root.to_string_lossy(),
    })
}
