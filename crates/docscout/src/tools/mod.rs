//! The read-only tools the model uses to explore the workspace.
//!
//! Every tool answers with a JSON object. Expected failures, like a missing
//! file or a path outside the workspace, are reported with an `error` field
//! instead of failing the call, so the model can correct itself.

mod find_directory;
mod list_directory_files;
mod read_file;
mod search;

pub use find_directory::FindDirectoryTool;
pub use list_directory_files::ListDirectoryFilesTool;
pub use read_file::ReadFileTool;
pub use search::{SearchBackend, SearchError, SearchTool, TavilySearch};

use docscout_core::tool::Error as ToolError;
use tokio::task::JoinError;

fn join_error(err: JoinError) -> ToolError {
    error!("blocking task failed: {err}");
    ToolError::execution_error().with_reason("The tool stopped unexpectedly")
}
