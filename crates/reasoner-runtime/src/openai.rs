//! OpenAI-compatible Completion Provider
//!
//! Implementation of `CompletionProvider` for any endpoint speaking the
//! OpenAI chat-completions wire format (OpenAI, OpenRouter, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use reasoner_core::{
    error::{EngineError, Result},
    message::{Message, ToolCallRequest, UserContent},
    provider::{AssistantReply, CompletionProvider, CompletionRequest, Endpoint, ToolChoice},
    tool::ToolSpec,
};
use serde::{Deserialize, Serialize};

/// HTTP client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("COMPLETION_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(60);

        Self { timeout_secs }
    }
}

/// Chat-completions client over reqwest
#[derive(Clone, Debug)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn map_send_error(&self, e: &reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.config.timeout_secs)
        } else {
            EngineError::transport(e.status().map(|s| s.as_u16()), e.to_string())
        }
    }
}

// Wire types: request

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum WireMessage<'a> {
    System {
        content: &'a str,
    },
    User {
        content: &'a UserContent,
    },
    Assistant {
        content: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<WireToolCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: &'a str,
    },
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        match message {
            Message::System { content } => Self::System { content },
            Message::User { content } => Self::User { content },
            Message::Assistant {
                content,
                tool_calls,
            } => Self::Assistant {
                content: content.as_deref(),
                tool_calls: tool_calls.iter().map(WireToolCall::from).collect(),
            },
            Message::Tool {
                tool_call_id,
                content,
            } => Self::Tool {
                tool_call_id,
                content,
            },
        }
    }
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> From<&'a ToolCallRequest> for WireToolCall<'a> {
    fn from(call: &'a ToolCallRequest) -> Self {
        Self {
            id: &call.id,
            kind: "function",
            function: WireFunctionCall {
                name: &call.function_name,
                arguments: call.arguments.as_deref().unwrap_or_default(),
            },
        }
    }
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

// Wire types: response

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

/// Some gateways return content as an array of parts
#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

impl ResponseContent {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(parts) => {
                let texts: Vec<String> = parts.into_iter().filter_map(|p| p.text).collect();
                (!texts.is_empty()).then(|| texts.concat())
            }
        }
    }
}

/// Build the request body for one completion call
fn build_request<'a>(request: &CompletionRequest<'a>) -> ChatRequest<'a> {
    let tools: Vec<WireTool<'a>> = request
        .tools
        .iter()
        .map(|function| WireTool {
            kind: "function",
            function,
        })
        .collect();
    // tool_choice is only meaningful alongside a catalog
    let tool_choice = (!tools.is_empty()).then_some(request.tool_choice);

    ChatRequest {
        model: &request.options.model,
        messages: request.messages.iter().map(WireMessage::from).collect(),
        tools,
        tool_choice,
        max_tokens: request.options.max_tokens,
        temperature: request.options.temperature,
        top_p: request.options.top_p,
    }
}

/// Normalize a response body into an assistant reply
fn parse_reply(body: &[u8]) -> Result<AssistantReply> {
    let response: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| EngineError::MalformedReply(format!("Invalid response body: {e}")))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::MalformedReply("Response contains no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id,
            function_name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(AssistantReply {
        content: choice.message.content.and_then(ResponseContent::into_text),
        tool_calls,
    })
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn complete(
        &self,
        endpoint: &Endpoint,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantReply> {
        let body = build_request(&request);
        tracing::debug!(
            url = %endpoint.url,
            model = %request.options.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            tool_choice = ?body.tool_choice,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&endpoint.url)
            .bearer_auth(&endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            tracing::warn!(status = status.as_u16(), "Completion request failed");
            return Err(EngineError::transport(Some(status.as_u16()), text));
        }

        let reply = parse_reply(&bytes)?;
        tracing::debug!(tool_calls = reply.tool_calls.len(), "Completion received");
        Ok(reply)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
