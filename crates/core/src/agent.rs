mod builder;
mod state;

use std::sync::Arc;

use docscout_model::{AssistantMessage, ModelMessage, ModelRequest};
use futures_util::future::join_all;
use tracing::Instrument;

use crate::conversation::{Conversation, Item};
use crate::model_client::ModelClient;
use crate::tool::{Executor as ToolExecutor, render_result};
pub use builder::AgentBuilder;
pub use state::{AgentStage, format_system_prompt, route_model_output};

/// The answer appended when the model still wants to call tools on the
/// last allowed step.
pub const STEP_LIMIT_MESSAGE: &str = "Sorry, I could not find an answer to your question in the specified number of steps.";

/// The default number of turns one invocation may execute.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// The default system prompt template.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant.\n\nSystem time: {system_time}";

/// Where a transcript came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The user.
    User,
    /// The assistant.
    Assistant,
    /// A tool.
    Tool,
}

pub(crate) type TranscriptFn =
    Arc<dyn Fn(&str, TranscriptSource) + Send + Sync + 'static>;
pub(crate) type DeltaFn = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// An agent that drives a conversation until the model produces a final
/// answer.
///
/// The agent is a finite-state loop over [`AgentStage`]: a model turn
/// either ends the loop or hands the requested tool calls to a tool turn,
/// and a tool turn always goes back to the model. Every turn counts
/// against the recursion limit.
pub struct Agent {
    model_client: ModelClient,
    tool_executor: ToolExecutor,
    system_prompt: String,
    recursion_limit: usize,
    on_transcript: Option<TranscriptFn>,
    on_delta: Option<DeltaFn>,
}

impl Agent {
    /// Runs the loop until it reaches [`AgentStage::End`].
    ///
    /// The step counter of the conversation is not reset here, call
    /// [`Conversation::begin_invocation`] before appending a new user
    /// message.
    pub async fn run(&self, conversation: &mut Conversation) {
        self.run_loop(conversation)
            .instrument(debug_span!("agent run"))
            .await
    }

    /// Returns the model client.
    #[inline]
    pub fn model_client(&self) -> &ModelClient {
        &self.model_client
    }

    /// Returns the recursion limit.
    #[inline]
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Appends an item and reports its transcript.
    pub fn push_item(&self, conversation: &mut Conversation, item: Item) {
        if let Some(on_transcript) = &self.on_transcript {
            on_transcript(item.transcript(), item.role().into());
        }
        conversation.push(item);
    }

    async fn run_loop(&self, conversation: &mut Conversation) {
        let mut stage = AgentStage::ModelTurn;
        loop {
            trace!("step {}: {stage:?}", conversation.step);
            stage = match stage {
                AgentStage::ModelTurn => self.model_turn(conversation).await,
                AgentStage::ToolTurn => self.tool_turn(conversation).await,
                AgentStage::End => break,
            };
            conversation.step += 1;
        }
        debug!("agent loop ended after {} steps", conversation.step);
    }

    async fn model_turn(&self, conversation: &mut Conversation) -> AgentStage {
        conversation.is_last_step =
            conversation.step + 2 >= self.recursion_limit;

        let system_prompt =
            format_system_prompt(&self.system_prompt, chrono::Utc::now());
        let request = ModelRequest {
            messages: std::iter::once(ModelMessage::System(system_prompt))
                .chain(conversation.messages().cloned())
                .collect(),
            tools: self.tool_executor.definitions(),
        };

        let on_delta = self.on_delta.clone();
        let resp_or_err = self
            .model_client
            .send_request(request, move |delta| {
                if let Some(on_delta) = &on_delta {
                    on_delta(&delta);
                }
            })
            .await;
        let mut msg = match resp_or_err {
            Ok(resp) => resp.into_message(),
            Err(err) => {
                error!("model request failed: {err}");
                AssistantMessage {
                    content: format!("Model request failed: {err}"),
                    tool_calls: vec![],
                }
            }
        };

        if conversation.is_last_step && !msg.tool_calls.is_empty() {
            info!(
                "discarding {} tool calls on the last step",
                msg.tool_calls.len()
            );
            msg = AssistantMessage {
                content: STEP_LIMIT_MESSAGE.to_owned(),
                tool_calls: vec![],
            };
        }

        let next_stage = route_model_output(&msg);
        self.push_item(conversation, Item::assistant(msg));
        next_stage
    }

    async fn tool_turn(&self, conversation: &mut Conversation) -> AgentStage {
        let requests = conversation
            .items
            .last()
            .map(|item| item.tool_calls().to_vec())
            .unwrap_or_default();

        let mut pending = Vec::with_capacity(requests.len());
        self.tool_executor
            .handle_requests(requests, |id, name, fut| {
                pending.push(async move {
                    let result = fut.await;
                    (id, name, result)
                });
            });

        // Results come back in request order, no matter which tool
        // finishes first.
        for (id, name, result) in join_all(pending).await {
            let content = render_result(&result);
            self.push_item(conversation, Item::tool_result(id, &name, content));
        }
        AgentStage::ModelTurn
    }
}
