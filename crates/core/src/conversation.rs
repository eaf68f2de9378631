//! Conversation-related types.

use docscout_model::{
    AssistantMessage, ModelMessage, Role, ToolCallRequest, ToolCallResult,
};

/// Represents a conversation.
///
/// Items are only ever appended. Besides the messages, the conversation
/// tracks how many turns the current invocation has executed, which is
/// what the agent checks its step budget against.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) items: Vec<Item>,
    pub(crate) step: usize,
    pub(crate) is_last_step: bool,
}

impl Conversation {
    /// Returns all items in order.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Appends an item.
    #[inline]
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Returns the number of turns executed in the current invocation.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Records that a turn outside of the agent loop (like indexing the
    /// workspace) has been executed.
    #[inline]
    pub fn advance_step(&mut self) {
        self.step += 1;
    }

    /// Returns whether the last model turn ran on the final allowed step.
    #[inline]
    pub fn is_last_step(&self) -> bool {
        self.is_last_step
    }

    /// Starts a new invocation, which resets the step budget. History is
    /// kept.
    pub fn begin_invocation(&mut self) {
        self.step = 0;
        self.is_last_step = false;
    }

    /// Returns the transcript of the last assistant item, which is the
    /// answer shown to the user.
    pub fn last_answer(&self) -> Option<&str> {
        self.items
            .iter()
            .rev()
            .find(|item| item.role() == Role::Assistant)
            .map(Item::transcript)
    }

    pub(crate) fn messages(&self) -> impl Iterator<Item = &ModelMessage> {
        self.items.iter().map(|item| &item.msg)
    }
}

/// An item in the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) transcript: String,
}

impl Item {
    /// Creates a user input item.
    pub fn user<S: Into<String>>(input: S) -> Self {
        let input = input.into();
        Self {
            msg: ModelMessage::User(input.clone()),
            transcript: input,
        }
    }

    /// Creates an assistant item.
    pub fn assistant(msg: AssistantMessage) -> Self {
        let transcript = msg.content.clone();
        Self {
            msg: ModelMessage::Assistant(msg),
            transcript,
        }
    }

    /// Creates a tool result item. The transcript is prefixed with the
    /// tool name, the message content is sent to the model as is.
    pub fn tool_result<I: Into<String>, C: Into<String>>(
        id: I,
        name: &str,
        content: C,
    ) -> Self {
        let content = content.into();
        let transcript = format!("{name}: {content}");
        Self {
            msg: ModelMessage::Tool(ToolCallResult {
                id: id.into(),
                content,
            }),
            transcript,
        }
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is a string representation of the message item,
    /// which can be exported later. But transcript alone is not enough
    /// to reconstruct the message item.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Returns the role of this item.
    #[inline]
    pub fn role(&self) -> Role {
        self.msg.role()
    }

    /// Returns the tool calls this item requested.
    #[inline]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        self.msg.tool_calls()
    }

    /// Returns the underlying message.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }
}
