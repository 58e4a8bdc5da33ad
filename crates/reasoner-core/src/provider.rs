//! Completion Provider Strategy Pattern
//!
//! The Message Adapter seam: the engine hands a provider the full
//! conversation, the tool catalog and generation parameters, and gets back a
//! normalized assistant reply. Transport and envelope details stay behind this
//! trait.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reasoner_core::provider::{CompletionProvider, CompletionRequest, Endpoint};
//!
//! let provider = OpenAiCompatibleClient::new(ClientConfig::default())?;
//! let reply = provider.complete(&endpoint, request).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolSpec;

/// Default completion endpoint
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Generation parameters sent with every completion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "anthropic/claude-3.5-sonnet")
    pub model: String,

    /// Temperature for sampling
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_top_p() -> f32 {
    1.0
}

const fn default_max_tokens() -> u32 {
    3000
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Where to send a completion request and with which credential
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Whether the model may call tools in this request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides
    #[default]
    Auto,
    /// Catalog is advertised but tool calls are disabled
    None,
}

/// One completion request
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
    pub tool_choice: ToolChoice,
    pub options: &'a GenerationOptions,
}

/// Normalized assistant reply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

impl From<AssistantReply> for Message {
    fn from(reply: AssistantReply) -> Self {
        Self::assistant(reply.content, reply.tool_calls)
    }
}

/// Strategy trait for completion endpoints
///
/// Implement this trait to add support for new LLM backends. One provider
/// instance is shared by many sessions; the endpoint and credential travel
/// with each request.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one completion request and normalize the reply.
    ///
    /// Non-success statuses and timeouts are session-fatal errors; this layer
    /// does not retry.
    async fn complete(
        &self,
        endpoint: &Endpoint,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantReply>;

    /// Provider name for logs
    fn name(&self) -> &str {
        "completion-provider"
    }
}
