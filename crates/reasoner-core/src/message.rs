//! Conversation Messages
//!
//! Role-tagged messages and the append-only conversation history used by a
//! reasoning session.
//!
//! A [`Conversation`] holds exemplar turns (few-shot chains retrieved for the
//! task) followed by the session's own turns. The exemplar prefix length is
//! recorded, so the trimmed history shown to users and written to logs is a
//! slice rather than a second list kept in lockstep.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (correlated to an assistant tool call)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque identifier, echoed back by the matching tool message
    pub id: String,

    /// Name of the tool to invoke
    pub function_name: String,

    /// Raw argument text, expected (but not guaranteed) to be a JSON object
    #[serde(default)]
    pub arguments: Option<String>,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        function_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            arguments: Some(arguments.into()),
        }
    }
}

/// One part of a multi-part user turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference (URL or data URI)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// User turn content: plain text or text plus images
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl UserContent {
    /// Text portion of the content, parts joined by newlines
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single message in a conversation, one variant per role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a text-only user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    /// Create a user message carrying descriptive text and an image reference
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// Create an assistant message with optional text and tool calls
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content,
            tool_calls,
        }
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub const fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Text content, if any (user image parts are skipped)
    pub fn text(&self) -> Option<String> {
        match self {
            Self::System { content } | Self::Tool { content, .. } => Some(content.clone()),
            Self::User { content } => Some(content.text()),
            Self::Assistant { content, .. } => content.clone(),
        }
    }

    /// Tool calls requested by an assistant message
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Append-only conversation history with an exemplar prefix
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConversationParts")]
pub struct Conversation {
    messages: Vec<Message>,

    /// Number of leading messages that are few-shot exemplar turns
    exemplar_len: usize,
}

/// Unchecked wire form; deserialization replays it through [`Conversation::push`]
#[derive(Deserialize)]
struct ConversationParts {
    messages: Vec<Message>,
    #[serde(default)]
    exemplar_len: usize,
}

impl TryFrom<ConversationParts> for Conversation {
    type Error = EngineError;

    fn try_from(parts: ConversationParts) -> Result<Self> {
        if parts.exemplar_len > parts.messages.len() {
            return Err(EngineError::Other(format!(
                "exemplar prefix of {} exceeds {} messages",
                parts.exemplar_len,
                parts.messages.len()
            )));
        }

        let mut conv = Self::new();
        for message in parts.messages {
            conv.push(message)?;
        }
        conv.exemplar_len = parts.exemplar_len;
        Ok(conv)
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation whose first turns are exemplars.
    ///
    /// Exemplars go through the same correlation checks as live turns.
    pub fn with_exemplars(exemplars: impl IntoIterator<Item = Message>) -> Result<Self> {
        let mut conv = Self::new();
        for message in exemplars {
            conv.push(message)?;
        }
        conv.exemplar_len = conv.messages.len();
        Ok(conv)
    }

    /// Append a message, enforcing tool-call correlation.
    ///
    /// Rejects an assistant message whose tool-call ids repeat, and a tool
    /// message that does not answer an outstanding request of the most
    /// recent assistant message.
    pub fn push(&mut self, message: Message) -> Result<()> {
        match &message {
            Message::Assistant { tool_calls, .. } => {
                let mut seen = HashSet::new();
                for call in tool_calls {
                    if !seen.insert(call.id.as_str()) {
                        return Err(EngineError::ToolCallCorrelation(format!(
                            "assistant reply repeats tool call id '{}'",
                            call.id
                        )));
                    }
                }
            }
            Message::Tool { tool_call_id, .. } => self.check_tool_result(tool_call_id)?,
            Message::System { .. } | Message::User { .. } => {}
        }
        self.messages.push(message);
        Ok(())
    }

    fn check_tool_result(&self, tool_call_id: &str) -> Result<()> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role() == Role::Assistant)
        else {
            return Err(EngineError::ToolCallCorrelation(format!(
                "tool result '{tool_call_id}' has no preceding assistant message"
            )));
        };

        let requested = self.messages[pos]
            .tool_calls()
            .iter()
            .any(|c| c.id == tool_call_id);
        if !requested {
            return Err(EngineError::ToolCallCorrelation(format!(
                "tool result '{tool_call_id}' does not match any request of the latest assistant message"
            )));
        }

        let answered = self.messages[pos + 1..].iter().any(|m| {
            matches!(m, Message::Tool { tool_call_id: id, .. } if id == tool_call_id)
        });
        if answered {
            return Err(EngineError::ToolCallCorrelation(format!(
                "tool call '{tool_call_id}' already has a result"
            )));
        }

        Ok(())
    }

    /// Get all messages, exemplars included (model context)
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages after the exemplar prefix (display and logging)
    pub fn trimmed(&self) -> &[Message] {
        &self.messages[self.exemplar_len..]
    }

    pub const fn exemplar_len(&self) -> usize {
        self.exemplar_len
    }

    /// Text of the most recent assistant message that has text
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant {
                content: Some(text),
                ..
            } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
