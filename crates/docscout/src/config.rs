use std::path::{Path, PathBuf};

use docscout_core::{DEFAULT_RECURSION_LIMIT, DEFAULT_SYSTEM_PROMPT};
use thiserror::Error;

/// Errors raised while building a [`WorkspaceContext`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The workspace root cannot be turned into an absolute path.
    #[error("invalid workspace root {path:?}: {source}")]
    InvalidRoot {
        /// The path as given.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A numeric option is out of range.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// The option name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Options of the workspace indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexerOptions {
    /// Directories at this depth or deeper are not expanded.
    pub max_depth: usize,
    /// How many documents are previewed for the analysis.
    pub max_documents: usize,
    /// How many characters of each document are previewed.
    pub preview_chars: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_documents: 20,
            preview_chars: 2000,
        }
    }
}

/// Everything a session needs to know about the workspace it works on.
#[derive(Clone, Debug)]
pub struct WorkspaceContext {
    root: PathBuf,
    model: String,
    system_prompt: String,
    max_search_results: usize,
    recursion_limit: usize,
    indexer: IndexerOptions,
    read_max_chars: usize,
}

impl WorkspaceContext {
    /// The absolute workspace root. Canonical when the root exists.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The model identifier.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The system prompt template.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The maximum number of web search results.
    #[inline]
    pub fn max_search_results(&self) -> usize {
        self.max_search_results
    }

    /// The maximum number of turns per user message.
    #[inline]
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// The indexer options.
    #[inline]
    pub fn indexer(&self) -> &IndexerOptions {
        &self.indexer
    }

    /// How many characters `read_file` returns at most.
    #[inline]
    pub fn read_max_chars(&self) -> usize {
        self.read_max_chars
    }
}

/// Builder for [`WorkspaceContext`].
#[derive(Clone, Debug)]
pub struct WorkspaceContextBuilder {
    root: PathBuf,
    model: Option<String>,
    system_prompt: Option<String>,
    max_search_results: usize,
    recursion_limit: usize,
    indexer: IndexerOptions,
    read_max_chars: usize,
}

impl WorkspaceContextBuilder {
    /// Creates a builder for the given workspace root.
    #[inline]
    pub fn with_workspace_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            model: None,
            system_prompt: None,
            max_search_results: 10,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            indexer: IndexerOptions::default(),
            read_max_chars: 1000,
        }
    }

    /// Sets the model identifier.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the system prompt template. `{system_time}` is replaced with the
    /// current time.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the maximum number of web search results.
    #[inline]
    pub fn with_max_search_results(mut self, count: usize) -> Self {
        self.max_search_results = count;
        self
    }

    /// Sets the maximum number of turns per user message.
    #[inline]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets the indexer options.
    #[inline]
    pub fn with_indexer_options(mut self, options: IndexerOptions) -> Self {
        self.indexer = options;
        self
    }

    /// Sets how many characters `read_file` returns at most.
    #[inline]
    pub fn with_read_max_chars(mut self, max_chars: usize) -> Self {
        self.read_max_chars = max_chars;
        self
    }

    /// Builds the context.
    ///
    /// A missing workspace root is not an error here, the indexer reports
    /// it to the model instead.
    pub fn build(self) -> Result<WorkspaceContext, ConfigError> {
        if self.recursion_limit < 2 {
            return Err(ConfigError::InvalidValue {
                name: "recursion_limit",
                reason: "must be at least 2".to_owned(),
            });
        }
        if self.max_search_results == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_search_results",
                reason: "must be positive".to_owned(),
            });
        }

        let root = match self.root.canonicalize() {
            Ok(root) => root,
            Err(err) => {
                warn!("cannot canonicalize {:?}: {err}", self.root);
                std::path::absolute(&self.root).map_err(|source| {
                    ConfigError::InvalidRoot {
                        path: self.root.clone(),
                        source,
                    }
                })?
            }
        };

        Ok(WorkspaceContext {
            root,
            model: self
                .model
                .unwrap_or_else(|| docscout_openai_model::DEFAULT_MODEL.to_owned()),
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            max_search_results: self.max_search_results,
            recursion_limit: self.recursion_limit,
            indexer: self.indexer,
            read_max_chars: self.read_max_chars,
        })
    }
}
