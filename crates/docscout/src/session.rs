use std::path::PathBuf;
use std::sync::Arc;

use docscout_core::conversation::{Conversation, Item};
use docscout_core::{Agent, AgentBuilder, ModelClient, TranscriptSource};
use docscout_model::{AssistantMessage, ModelProvider};
use tracing::Instrument;

use crate::config::WorkspaceContext;
use crate::indexer::WorkspaceIndexer;
use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    context: WorkspaceContext,
    model_client: ModelClient,
    agent_builder: AgentBuilder,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn new<P: ModelProvider + 'static>(
        context: WorkspaceContext,
        provider: P,
    ) -> Self {
        Self::with_model_client(context, ModelClient::new(provider))
    }

    /// Creates a session builder with an existing model client, which is
    /// shared by the agent and the indexer.
    pub fn with_model_client(
        context: WorkspaceContext,
        model_client: ModelClient,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_client(model_client.clone())
            .with_system_prompt(context.system_prompt())
            .with_recursion_limit(context.recursion_limit());
        Self {
            context,
            model_client,
            agent_builder,
        }
    }

    /// Enables the `search` tool with the given backend.
    #[inline]
    pub fn with_search_backend<B: SearchBackend>(mut self, backend: B) -> Self {
        let tool = SearchTool::new(backend, self.context.max_search_results());
        self.agent_builder = self.agent_builder.with_tool(tool);
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Attaches a callback to be invoked for every streamed text delta.
    ///
    /// Text of a model request that fails midway and is retried is sent
    /// again.
    #[inline]
    pub fn on_message_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_message_delta(on_delta);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let Self {
            context,
            model_client,
            agent_builder,
        } = self;

        let root = Arc::new(context.root().to_owned());
        let agent = agent_builder
            .with_tool(FindDirectoryTool::new(Arc::clone(&root)))
            .with_tool(ListDirectoryFilesTool::new(Arc::clone(&root)))
            .with_tool(ReadFileTool::new(
                Arc::clone(&root),
                context.read_max_chars(),
            ))
            .build();
        let indexer = WorkspaceIndexer::new(
            PathBuf::clone(&root),
            *context.indexer(),
            model_client,
        );

        Session {
            context,
            agent,
            indexer,
            conversation: Conversation::default(),
            indexed: false,
        }
    }
}

/// A chat session over one workspace.
///
/// The first message triggers an indexing pass, whose result is added to
/// the conversation as an assistant message so the model starts with an
/// overview of the workspace. Later messages reuse the whole history.
pub struct Session {
    context: WorkspaceContext,
    agent: Agent,
    indexer: WorkspaceIndexer,
    conversation: Conversation,
    indexed: bool,
}

impl Session {
    /// Sends a message and waits for the answer.
    pub async fn send_message(&mut self, message: &str) -> String {
        let span = info_span!("session message", indexed = self.indexed);
        self.handle_message(message).instrument(span).await
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the workspace context.
    #[inline]
    pub fn context(&self) -> &WorkspaceContext {
        &self.context
    }

    async fn handle_message(&mut self, message: &str) -> String {
        self.conversation.begin_invocation();
        self.agent
            .push_item(&mut self.conversation, Item::user(message));

        if !self.indexed {
            let result = self.indexer.index().await;
            info!(
                "indexed workspace: {} documents, {} directories",
                result.document_count, result.directory_count
            );
            self.conversation.push(Item::assistant(AssistantMessage {
                content: result.to_json(),
                tool_calls: vec![],
            }));
            self.conversation.advance_step();
            self.indexed = true;
        }

        self.agent.run(&mut self.conversation).await;
        self.conversation
            .last_answer()
            .unwrap_or_default()
            .to_owned()
    }
}
