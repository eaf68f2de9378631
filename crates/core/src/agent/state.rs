use chrono::{DateTime, SecondsFormat, Utc};
use docscout_model::{AssistantMessage, Role};

use super::TranscriptSource;

/// The stage of the agent loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgentStage {
    /// Asking the model for the next message.
    #[default]
    ModelTurn,
    /// Executing the tool calls of the last message.
    ToolTurn,
    /// The loop is done.
    End,
}

/// Decides the stage that follows a model turn.
#[inline]
pub fn route_model_output(msg: &AssistantMessage) -> AgentStage {
    if msg.tool_calls.is_empty() {
        AgentStage::End
    } else {
        AgentStage::ToolTurn
    }
}

/// Replaces every `{system_time}` placeholder with `now` in RFC 3339.
pub fn format_system_prompt(template: &str, now: DateTime<Utc>) -> String {
    let system_time = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    template.replace("{system_time}", &system_time)
}

impl From<Role> for TranscriptSource {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TranscriptSource::User,
            Role::Tool => TranscriptSource::Tool,
            // System prompts never enter the conversation.
            Role::Assistant | Role::System => TranscriptSource::Assistant,
        }
    }
}
