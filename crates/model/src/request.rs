use serde_json::Value;

use crate::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

impl ModelRequest {
    /// Creates a tool-less request from a system instruction and a single
    /// user prompt.
    #[inline]
    pub fn completion<S1: Into<String>, S2: Into<String>>(
        system: S1,
        prompt: S2,
    ) -> Self {
        Self {
            messages: vec![
                ModelMessage::System(system.into()),
                ModelMessage::User(prompt.into()),
            ],
            tools: vec![],
        }
    }
}

/// The role a message plays in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Instructions for the model.
    System,
    /// Input from the user.
    User,
    /// Output from the model.
    Assistant,
    /// The result of a tool invocation.
    Tool,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant message, possibly requesting tool calls.
    ///
    /// Providers must be able to replay this message in later requests,
    /// including its tool calls, so that the following tool results can
    /// be matched to them.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn assistant_text<S: Into<String>>(content: S) -> Self {
        Self::Assistant(AssistantMessage {
            content: content.into(),
            tool_calls: vec![],
        })
    }

    /// Returns the role of this message.
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the tool calls requested by this message, which is empty
    /// for every message that is not from the assistant.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            ModelMessage::Assistant(msg) => &msg.tool_calls,
            _ => &[],
        }
    }
}

/// A message generated by the model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssistantMessage {
    /// The text content.
    pub content: String,
    /// Tool calls requested in this message.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_roles() {
        let tool_result = ModelMessage::Tool(ToolCallResult {
            id: "call_0".to_owned(),
            content: "{}".to_owned(),
        });

        assert_eq!(ModelMessage::System("x".into()).role(), Role::System);
        assert_eq!(ModelMessage::User("x".into()).role(), Role::User);
        assert_eq!(ModelMessage::assistant_text("x").role(), Role::Assistant);
        assert_eq!(tool_result.role(), Role::Tool);
    }

    #[test]
    fn test_tool_calls() {
        let msg = ModelMessage::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_0".to_owned(),
                name: "read_file".to_owned(),
                arguments: json!({ "path": "notes.md" }),
            }],
        });
        assert_eq!(msg.tool_calls().len(), 1);
        assert!(ModelMessage::User("hi".to_owned()).tool_calls().is_empty());
        assert!(ModelMessage::assistant_text("done").tool_calls().is_empty());
    }

    #[test]
    fn test_completion_request() {
        let req = ModelRequest::completion("be brief", "summarize");
        assert!(req.tools.is_empty());
        assert_eq!(
            req.messages,
            vec![
                ModelMessage::System("be brief".to_owned()),
                ModelMessage::User("summarize".to_owned()),
            ]
        );
    }
}
