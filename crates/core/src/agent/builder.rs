use std::sync::Arc;

use docscout_model::ModelProvider;

use super::{
    Agent, DEFAULT_RECURSION_LIMIT, DEFAULT_SYSTEM_PROMPT, TranscriptSource,
};
use crate::model_client::ModelClient;
use crate::tool::{AnyTool, Executor as ToolExecutor, Tool, ToolObject};

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    system_prompt: String,
    recursion_limit: usize,
    tools: Vec<Box<dyn ToolObject>>,
    on_transcript: Option<super::TranscriptFn>,
    on_delta: Option<super::DeltaFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder with an existing model client.
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            tools: vec![],
            on_transcript: None,
            on_delta: None,
        }
    }

    /// Sets the system prompt template. `{system_time}` is replaced with
    /// the current time on every model turn.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum number of turns per invocation.
    ///
    /// Values below 2 leave no room for a tool turn and are raised to 2.
    #[inline]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        if limit < 2 {
            warn!("recursion limit {limit} is too small, using 2");
        }
        self.recursion_limit = limit.max(2);
        self
    }

    /// Attaches a callback to be invoked for every appended item.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked for every streamed text delta.
    ///
    /// A model request retried after a partial stream sends its text
    /// again from the start, see [`ModelClient::send_request`].
    #[inline]
    pub fn on_message_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Arc::new(on_delta));
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        let tool = Box::new(AnyTool(tool));
        self.tools.push(tool);
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            system_prompt,
            recursion_limit,
            tools,
            on_transcript,
            on_delta,
        } = self;
        Agent {
            model_client,
            tool_executor: ToolExecutor::with_tools(tools),
            system_prompt,
            recursion_limit,
            on_transcript,
            on_delta,
        }
    }
}
