use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docscout_core::tool::{Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use crate::workspace::{relative_path, resolve_path_under};

#[derive(Deserialize, JsonSchema)]
pub struct ReadFileParameters {
    #[schemars(
        description = "File to read, relative to the workspace root or absolute."
    )]
    path: String,
}

/// A tool for reading the leading part of a text file.
pub struct ReadFileTool {
    root: Arc<PathBuf>,
    max_chars: usize,
    parameter_schema: Value,
}

impl ReadFileTool {
    /// Creates a new tool reading files under `root`, returning at most
    /// `max_chars` characters.
    #[inline]
    pub fn new(root: Arc<PathBuf>, max_chars: usize) -> Self {
        ReadFileTool {
            root,
            max_chars,
            parameter_schema: schema_for!(ReadFileParameters).to_value(),
        }
    }
}

impl Tool for ReadFileTool {
    type Input = ReadFileParameters;

    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        r#"
Reads a text file in the workspace. Long files are truncated.
Returns the content with the file size in bytes and the number of returned lines."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ReadFileParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let root = Arc::clone(&self.root);
        let max_chars = self.max_chars;
        async move {
            spawn_blocking(move || read_document(&root, &input.path, max_chars))
                .await
                .map_err(super::join_error)
        }
    }
}

fn read_document(root: &Path, path_param: &str, max_chars: usize) -> Value {
    let error = |reason: String| json!({ "error": reason, "content": null });

    let target = match resolve_path_under(root, path_param) {
        Ok(target) => target,
        Err(err) => return error(err.to_string()),
    };
    if !target.exists() {
        return error(format!("File does not exist: {path_param}"));
    }
    if !target.is_file() {
        return error(format!("Path is not a file: {path_param}"));
    }

    let (bytes, size) = match read_prefix(&target, max_chars) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            return error(format!("Permission denied: {path_param}"));
        }
        Err(err) => return error(format!("Failed to read the file: {err}")),
    };
    let path = relative_path(root, &target);
    if bytes.contains(&0) {
        return json!({
            "error": format!("Cannot read a binary file: {path_param}"),
            "content": null,
            "path": path,
        });
    }

    let truncated = (bytes.len() as u64) < size;
    let content: String = decode_text(bytes, truncated)
        .chars()
        .take(max_chars)
        .collect();
    json!({
        "path": path,
        "lines": content.lines().count(),
        "content": content,
        "size": size,
    })
}

/// Reads at most the bytes `max_chars` characters can take, returning them
/// with the file size.
fn read_prefix(path: &Path, max_chars: usize) -> io::Result<(Vec<u8>, u64)> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let limit = (max_chars as u64).saturating_mul(4);
    let mut bytes = Vec::with_capacity(limit.min(size) as usize);
    file.take(limit).read_to_end(&mut bytes)?;
    Ok((bytes, size))
}

/// Decodes UTF-8, falling back to Latin-1 which accepts any byte.
///
/// A `truncated` prefix may end in the middle of a UTF-8 sequence, which
/// is dropped instead of switching to Latin-1.
fn decode_text(bytes: Vec<u8>, truncated: bool) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) if truncated && err.utf8_error().error_len().is_none() => {
            let valid_up_to = err.utf8_error().valid_up_to();
            let mut bytes = err.into_bytes();
            bytes.truncate(valid_up_to);
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn workspace() -> (tempfile::TempDir, Arc<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes/todo.md"), "# Todo\n\n- write docs\n").unwrap();
        (dir, Arc::new(root))
    }

    async fn read(tool: &ReadFileTool, path: &str) -> Value {
        tool.execute(ReadFileParameters {
            path: path.to_owned(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_text_file() {
        let (_dir, root) = workspace();
        let tool = ReadFileTool::new(Arc::clone(&root), 1000);

        let result = read(&tool, "notes/todo.md").await;
        assert_eq!(result["path"], "notes/todo.md");
        assert_eq!(result["content"], "# Todo\n\n- write docs\n");
        assert_eq!(result["size"], 21);
        assert_eq!(result["lines"], 3);

        let abs = root.join("notes/todo.md").to_string_lossy().into_owned();
        assert_eq!(read(&tool, &abs).await["path"], "notes/todo.md");
    }

    #[tokio::test]
    async fn test_truncation_counts_chars() {
        let (_dir, root) = workspace();
        fs::write(root.join("long.md"), "文".repeat(1500)).unwrap();
        let tool = ReadFileTool::new(root, 1000);

        let result = read(&tool, "long.md").await;
        let content = result["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), 1000);
        assert_eq!(result["size"], 4500);
        assert_eq!(result["lines"], 1);
    }

    #[tokio::test]
    async fn test_reads_bounded_prefix() {
        let (_dir, root) = workspace();
        // 20 bytes are read, which ends in the middle of the seventh char.
        fs::write(root.join("wide.md"), "文".repeat(100)).unwrap();
        let tool = ReadFileTool::new(root, 5);

        let result = read(&tool, "wide.md").await;
        assert_eq!(result["content"], "文".repeat(5));
        assert_eq!(result["size"], 300);
    }

    #[test]
    fn test_read_prefix_limit() {
        let (_dir, root) = workspace();
        fs::write(root.join("big.log"), vec![b'x'; 10_000]).unwrap();

        let (bytes, size) = read_prefix(&root.join("big.log"), 100).unwrap();
        assert_eq!(bytes.len(), 400);
        assert_eq!(size, 10_000);
    }

    #[tokio::test]
    async fn test_latin1_fallback() {
        let (_dir, root) = workspace();
        fs::write(root.join("legacy.md"), b"caf\xe9").unwrap();
        let tool = ReadFileTool::new(root, 1000);

        assert_eq!(read(&tool, "legacy.md").await["content"], "café");
    }

    #[tokio::test]
    async fn test_error_payloads() {
        let (_dir, root) = workspace();
        fs::write(root.join("image.png"), b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();
        let tool = ReadFileTool::new(root, 1000);

        for path in ["missing.md", "notes", "image.png", "../secret.md"] {
            let result = read(&tool, path).await;
            assert!(result["error"].is_string(), "{path}: {result}");
            assert!(result["content"].is_null());
        }
        assert_eq!(read(&tool, "image.png").await["path"], "image.png");
    }
}
