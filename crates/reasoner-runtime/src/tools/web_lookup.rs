//! Web Datapoint Lookup
//!
//! Answers one simple factual question by asking a search-capable chat model
//! through the session's own completion endpoint and credential.

use std::sync::Arc;

use async_trait::async_trait;
use reasoner_core::{
    message::Message,
    provider::{CompletionProvider, CompletionRequest, GenerationOptions, ToolChoice},
    tool::{Tool, ToolContext, ToolFailure, ToolGuide, ToolSpec},
};
use serde_json::{Map, Value, json};

/// Search-capable model used when none is configured
pub const DEFAULT_WEB_LOOKUP_MODEL: &str = "perplexity/llama-3.1-sonar-large-128k-online";

const RESEARCHER_PROMPT: &str = "You are a research assistant. Answer the question with the specific \
datapoint requested, as briefly as possible, and cite your sources. \
If the datapoint is not directly available, say so instead of guessing or inferring it.";

/// Looks up a datapoint on the web
pub struct WebLookupTool {
    provider: Arc<dyn CompletionProvider>,
    options: GenerationOptions,
}

impl WebLookupTool {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            options: GenerationOptions {
                model: model.into(),
                temperature: 0.2,
                top_p: 1.0,
                max_tokens: 1000,
            },
        }
    }
}

impl std::fmt::Debug for WebLookupTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebLookupTool")
            .field("provider", &self.provider.name())
            .field("model", &self.options.model)
            .finish()
    }
}

#[async_trait]
impl Tool for WebLookupTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "find_datapoint_on_web",
            "Search the web for a datapoint using Perplexity. Returns findings with citations.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The specific question"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    fn guide(&self) -> ToolGuide {
        ToolGuide {
            summary: "Search the web for information using Perplexity".into(),
            when_to_use: Some(
                "When you need to search the web for information, use the find_datapoint_on_web tool.".into(),
            ),
            guidelines_heading: Some("When searching the web:".into()),
            guidelines: vec![
                "Only ask simple, factual questions that can be directly looked up".into(),
                "Queries must be single, straightforward questions - no compound questions".into(),
                "Do not ask for logical inferences or analysis of the information".into(),
                "If a query is rejected, simplify it to ask for just one basic fact".into(),
                "Keep queries focused on finding specific, verifiable information".into(),
                "If the data isn't directly available or the answer makes logic jumps, break the question down into simpler questions to get just the raw facts and do the analysis yourself".into(),
            ],
        }
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolFailure> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolFailure::Validation("query must be a non-empty string".into()))?;

        let messages = [Message::system(RESEARCHER_PROMPT), Message::user(query)];
        let request = CompletionRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ToolChoice::Auto,
            options: &self.options,
        };

        tracing::debug!(model = %self.options.model, %query, "Looking up datapoint");
        let reply = self
            .provider
            .complete(ctx.endpoint, request)
            .await
            .map_err(|e| ToolFailure::Execution(format!("Web lookup failed: {e}")))?;

        reply
            .content
            .filter(|c| !c.trim().is_empty())
            .map(Value::String)
            .ok_or_else(|| ToolFailure::Execution("Web lookup returned no findings".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasoner_core::error::EngineError;
    use reasoner_core::provider::{AssistantReply, Endpoint};
    use reasoner_core::sandbox::{DEFAULT_SANDBOX_LIFETIME, SandboxHandle};
    use reasoner_core::testing::{RecordingSandboxProvider, ScriptedProvider};
    use reasoner_core::tool::Credentials;

    async fn run(provider: Arc<ScriptedProvider>, query: &str) -> Result<Value, ToolFailure> {
        let sandboxes = RecordingSandboxProvider::default();
        let sandbox = SandboxHandle::acquire(&sandboxes, uuid::Uuid::new_v4(), DEFAULT_SANDBOX_LIFETIME)
            .await
            .unwrap();
        let endpoint = Endpoint::new("https://gateway.test/v1/chat/completions", "sk");
        let credentials = Credentials::new("sk");
        let ctx = ToolContext {
            task: "t",
            model: "m",
            endpoint: &endpoint,
            credentials: &credentials,
            sandbox: &sandbox,
        };

        let tool = WebLookupTool::new(provider, DEFAULT_WEB_LOOKUP_MODEL);
        let args = json!({ "query": query }).as_object().cloned().unwrap();
        tool.execute(args, &ctx).await
    }

    #[tokio::test]
    async fn test_lookup_uses_session_endpoint() {
        let provider = Arc::new(ScriptedProvider::new(vec![AssistantReply::text(
            "Paris has about 2.1 million residents [1].",
        )]));

        let result = run(provider.clone(), "Population of Paris?").await.unwrap();
        assert_eq!(result, json!("Paris has about 2.1 million residents [1]."));

        let request = &provider.requests()[0];
        assert_eq!(request.endpoint_url, "https://gateway.test/v1/chat/completions");
        assert_eq!(request.options.model, DEFAULT_WEB_LOOKUP_MODEL);
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_recoverable() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![]).then_fail(EngineError::transport(Some(502), "bad gateway")),
        );
        let err = run(provider, "Population of Paris?").await.unwrap_err();
        assert!(matches!(err, ToolFailure::Execution(msg) if msg.starts_with("Web lookup failed")));
    }
}
