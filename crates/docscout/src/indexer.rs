//! The workspace indexer, which summarizes the workspace for the model
//! before the first question is answered.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use docscout_core::ModelClient;
use docscout_model::ModelRequest;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;

use crate::config::IndexerOptions;
use crate::workspace::{is_markdown, is_skipped_entry, relative_path};

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a professional document analysis assistant. Your task is to analyze \
the directory structure and document contents of a workspace and provide a \
thorough, structured analysis. Make sure the analysis is comprehensive, \
accurate and well organized.";

/// A node of the workspace directory tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    /// A directory.
    Directory {
        /// The directory name.
        name: String,
        /// The path relative to the workspace root.
        path: String,
        /// Subdirectories first, then files, each sorted by name.
        #[serde(default)]
        children: Vec<TreeNode>,
        /// Set when the depth limit stopped the walk here.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        truncated: bool,
        /// Set when the directory could not be read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A markdown document.
    File {
        /// The file name.
        name: String,
        /// The path relative to the workspace root.
        path: String,
        /// The size in bytes.
        size: u64,
    },
}

/// The leading part of a document, shown to the model during analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPreview {
    /// The path relative to the workspace root.
    pub path: String,
    /// The leading characters of the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    /// The size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Set when the document could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The summary of a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingResult {
    /// Set when the workspace could not be indexed at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The absolute workspace root.
    pub workspace_path: String,
    /// Every indexed directory except the root, sorted.
    pub directory_structure_paths: Vec<String>,
    /// The number of markdown documents.
    pub document_count: usize,
    /// The number of indexed directories, including the root.
    pub directory_count: usize,
    /// The analysis written by the model.
    pub analysis_report: String,
    /// The directory tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_structure: Option<TreeNode>,
    /// Every markdown document, in tree order.
    #[serde(default)]
    pub document_files: Vec<String>,
}

impl IndexingResult {
    fn missing_root(root: &Path) -> Self {
        let workspace_path = root.to_string_lossy().into_owned();
        Self {
            error: Some(format!("Workspace path does not exist: {workspace_path}")),
            workspace_path,
            directory_structure_paths: vec![],
            document_count: 0,
            directory_count: 0,
            analysis_report: String::new(),
            directory_structure: None,
            document_files: vec![],
        }
    }

    /// Renders the result as pretty JSON, which is what the conversation
    /// receives.
    pub fn to_json(&self) -> String {
        match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(err) => {
                error!("failed to serialize the indexing result: {err}");
                format!(r#"{{"error": "failed to serialize the indexing result: {err}"}}"#)
            }
        }
    }
}

/// Everything collected from the filesystem in one pass.
#[derive(Debug)]
struct Scan {
    tree: TreeNode,
    directory_paths: Vec<String>,
    documents: Vec<String>,
    previews: Vec<DocumentPreview>,
}

/// Indexes a workspace and asks the model to analyze it.
#[derive(Clone)]
pub struct WorkspaceIndexer {
    root: PathBuf,
    options: IndexerOptions,
    model_client: ModelClient,
}

impl WorkspaceIndexer {
    /// Creates an indexer for `root`.
    pub fn new(
        root: PathBuf,
        options: IndexerOptions,
        model_client: ModelClient,
    ) -> Self {
        Self {
            root,
            options,
            model_client,
        }
    }

    /// Indexes the workspace.
    ///
    /// This never fails: a missing root yields a result with an `error`
    /// field and no model call, a failed model call yields a placeholder
    /// report.
    pub async fn index(&self) -> IndexingResult {
        let root = self.root.clone();
        let options = self.options;
        let scan = spawn_blocking(move || {
            if !root.is_dir() {
                return None;
            }
            Some(scan_workspace(&root, &options))
        })
        .await;
        let scan = match scan {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                warn!("workspace root does not exist: {:?}", self.root);
                return IndexingResult::missing_root(&self.root);
            }
            Err(err) => {
                error!("indexing task failed: {err}");
                let mut result = IndexingResult::missing_root(&self.root);
                result.error = Some(format!("Failed to index the workspace: {err}"));
                return result;
            }
        };

        let directory_count = count_directories(&scan.tree);
        debug!(
            "indexed {} documents in {directory_count} directories",
            scan.documents.len()
        );

        let prompt = self.analysis_prompt(&scan);
        let req = ModelRequest::completion(ANALYSIS_SYSTEM_PROMPT, prompt);
        let analysis_report = match self.model_client.send_request(req, |_| {}).await {
            Ok(resp) => resp.transcript,
            Err(err) => {
                warn!("workspace analysis failed: {err}");
                format!("Model analysis failed: {err}")
            }
        };

        let mut directory_paths = scan.directory_paths;
        directory_paths.sort();
        IndexingResult {
            error: None,
            workspace_path: self.root.to_string_lossy().into_owned(),
            directory_structure_paths: directory_paths,
            document_count: scan.documents.len(),
            directory_count,
            analysis_report,
            directory_structure: Some(scan.tree),
            document_files: scan.documents,
        }
    }

    fn analysis_prompt(&self, scan: &Scan) -> String {
        let tree = serde_json::to_string_pretty(&scan.tree).unwrap_or_default();
        let previews =
            serde_json::to_string_pretty(&scan.previews).unwrap_or_default();
        format!(
            "\
Please analyze the directory structure and document contents of the following workspace in depth.

Workspace path: {workspace}

## Directory structure
{tree}

## Document previews ({total} markdown documents, the first {previewed} are shown)
{previews}

## What to analyze

1. **Directory structure**: how the workspace is organized, the main directory categories and what they are for, and how the levels relate to each other.
2. **Document contents**: the topics and domains of the documents, how documents relate to each other, and the main concepts they cover.
3. **Summary**: the main content areas of the workspace, how the knowledge is organized, and the key pieces of information.

Answer in detail with a clear structure.",
            workspace = self.root.display(),
            total = scan.documents.len(),
            previewed = scan.previews.len(),
        )
    }
}

fn scan_workspace(root: &Path, options: &IndexerOptions) -> Scan {
    let mut directory_paths = vec![];
    let mut documents = vec![];
    let tree = build_tree(
        root,
        root,
        0,
        options.max_depth,
        &mut directory_paths,
        &mut documents,
    );
    let previews = documents
        .iter()
        .take(options.max_documents)
        .map(|path| preview_document(root, path, options.preview_chars))
        .collect();
    Scan {
        tree,
        directory_paths,
        documents,
        previews,
    }
}

fn build_tree(
    root: &Path,
    dir: &Path,
    depth: usize,
    max_depth: usize,
    directory_paths: &mut Vec<String>,
    documents: &mut Vec<String>,
) -> TreeNode {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = relative_path(root, dir);

    if depth >= max_depth {
        return TreeNode::Directory {
            name,
            path,
            children: vec![],
            truncated: true,
            error: None,
        };
    }
    if depth > 0 {
        directory_paths.push(path.clone());
    }

    let mut subdirs = vec![];
    let mut files = vec![];
    let mut error = None;
    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        error = Some(err.to_string());
                        continue;
                    }
                };
                let entry_name = entry.file_name().to_string_lossy().into_owned();
                // `file_type` does not follow symlinks, so links are neither.
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() && !is_skipped_entry(&entry_name) {
                    subdirs.push((entry_name, entry.path()));
                } else if file_type.is_file()
                    && !entry_name.starts_with('.')
                    && is_markdown(&entry.path())
                {
                    files.push((entry_name, entry.path()));
                }
            }
        }
        Err(err) => error = Some(err.to_string()),
    }
    subdirs.sort();
    files.sort();

    let mut children = Vec::with_capacity(subdirs.len() + files.len());
    for (_, subdir) in subdirs {
        children.push(build_tree(
            root,
            &subdir,
            depth + 1,
            max_depth,
            directory_paths,
            documents,
        ));
    }
    for (file_name, file_path) in files {
        let rel = relative_path(root, &file_path);
        documents.push(rel.clone());
        let size = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        children.push(TreeNode::File {
            name: file_name,
            path: rel,
            size,
        });
    }

    TreeNode::Directory {
        name,
        path,
        children,
        truncated: false,
        error,
    }
}

fn count_directories(node: &TreeNode) -> usize {
    match node {
        TreeNode::Directory {
            truncated: false,
            children,
            ..
        } => 1 + children.iter().map(count_directories).sum::<usize>(),
        _ => 0,
    }
}

fn preview_document(root: &Path, rel: &str, preview_chars: usize) -> DocumentPreview {
    let path = root.join(rel);
    let read_preview = || -> std::io::Result<(String, u64)> {
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        // A character takes at most four bytes in UTF-8.
        let mut bytes = vec![];
        let limit = (preview_chars as u64).saturating_mul(4);
        file.take(limit).read_to_end(&mut bytes)?;
        let preview = String::from_utf8_lossy(&bytes)
            .chars()
            .take(preview_chars)
            .collect();
        Ok((preview, size))
    };
    match read_preview() {
        Ok((preview, size)) => DocumentPreview {
            path: rel.to_owned(),
            content_preview: Some(preview),
            size: Some(size),
            error: None,
        },
        Err(err) => DocumentPreview {
            path: rel.to_owned(),
            content_preview: None,
            size: None,
            error: Some(format!("Failed to read the document: {err}")),
        },
    }
}
