//! HTTP Handlers

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use reasoner_core::{
    AgentConfig, AgentOutcome, AgentReport, Credentials, EngineError, Ensemble, EnsembleConfig,
    GenerationOptions, Message, TaskRequest, ToolSpec,
};

use crate::config::{
    DEFAULT_COORDINATOR_MAX_STEPS, DEFAULT_MAX_REASONING_STEPS, DEFAULT_MAX_TOKENS,
    DEFAULT_MAX_WORKERS,
};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub task: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub chain_store_api_key: Option<String>,
    pub wolfram_app_id: Option<String>,
    pub max_reasoning_steps: Option<u32>,
    pub image: Option<String>,
    pub log_conversation: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ReasonResponse {
    pub response: Option<String>,
    pub reasoning_chain: Vec<Message>,
    pub thinking_tools: Vec<ToolSpec>,
    pub steps: u32,
    pub budget_exceeded: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnsembleRequest {
    pub task: Option<String>,
    pub agents: Option<Vec<AgentConfig>>,
    pub coordinator: Option<AgentConfig>,
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub return_reasoning: bool,
    pub max_reasoning_steps: Option<u32>,
    pub coordinator_max_steps: Option<u32>,
    pub wolfram_app_id: Option<String>,
    pub chain_store_api_key: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AgentResult {
    pub model: String,
    pub response: Option<String>,
    pub reasoning_chain: Vec<Message>,
    pub thinking_tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AgentReport> for AgentResult {
    fn from(report: AgentReport) -> Self {
        let model = report.config.model;
        match report.outcome {
            AgentOutcome::Succeeded(session) => Self {
                model,
                response: session.answer,
                reasoning_chain: session.conversation.trimmed().to_vec(),
                thinking_tools: session.tools,
                error: None,
            },
            AgentOutcome::Failed(e) => Self {
                model,
                response: None,
                reasoning_chain: Vec::new(),
                thinking_tools: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnsembleResponse {
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_results: Option<Vec<AgentResult>>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error payload with its HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn missing(fields: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: format!("Missing required parameters: {fields}"),
                code: "MISSING_PARAMETERS".into(),
            },
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message,
                code: "INVALID_PARAMETERS".into(),
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Config(_) => StatusCode::BAD_REQUEST,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Transport { .. } | EngineError::MalformedReply(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %e, status = status.as_u16(), "Request failed");
        Self {
            status,
            body: ErrorResponse {
                error: e.user_message(),
                code: e.code().into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Requested step budget, or `default`; the server never runs unbounded sessions
fn step_budget(value: Option<u32>, default: u32, field: &str) -> Result<u32, ApiError> {
    match value {
        Some(0) => Err(ApiError::invalid(format!("{field} must be at least 1"))),
        Some(steps) => Ok(steps),
        None => Ok(default),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.engine.tools().names(),
    })
}

/// Single-model reasoning
pub async fn reason_handler(
    State(state): State<AppState>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<ReasonResponse>, ApiError> {
    let (Some(task), Some(api_key), Some(model), Some(api_url)) = (
        present(payload.task),
        present(payload.api_key),
        present(payload.model),
        present(payload.api_url),
    ) else {
        return Err(ApiError::missing("task, api_key, model, api_url"));
    };

    let max_steps = step_budget(
        payload.max_reasoning_steps,
        DEFAULT_MAX_REASONING_STEPS,
        "max_reasoning_steps",
    )?;

    let credentials = Credentials {
        api_key: Some(api_key),
        wolfram_app_id: payload.wolfram_app_id,
        chain_store_api_key: payload.chain_store_api_key,
    };
    let options = GenerationOptions {
        model,
        temperature: payload.temperature.unwrap_or(0.7),
        top_p: payload.top_p.unwrap_or(1.0),
        max_tokens: payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    };

    let mut request = TaskRequest::new(task, credentials)
        .api_url(api_url)
        .options(options)
        .max_steps(max_steps)
        .log_conversation(
            payload
                .log_conversation
                .unwrap_or(state.config.log_conversations),
        );
    if let Some(image) = present(payload.image) {
        request = request.image(image);
    }

    let outcome = state.engine.run(request).await?;

    Ok(Json(ReasonResponse {
        response: outcome.answer,
        reasoning_chain: outcome.conversation.trimmed().to_vec(),
        thinking_tools: outcome.tools,
        steps: outcome.steps,
        budget_exceeded: outcome.budget_exceeded,
    }))
}

/// Multi-model ensemble
pub async fn ensemble_handler(
    State(state): State<AppState>,
    Json(payload): Json<EnsembleRequest>,
) -> Result<Json<EnsembleResponse>, ApiError> {
    let (Some(task), Some(agents), Some(coordinator)) = (
        present(payload.task),
        payload.agents.filter(|a| !a.is_empty()),
        payload.coordinator,
    ) else {
        return Err(ApiError::missing("task, agents, coordinator"));
    };

    let agent_max_steps = step_budget(
        payload.max_reasoning_steps,
        DEFAULT_MAX_REASONING_STEPS,
        "max_reasoning_steps",
    )?;
    let coordinator_max_steps = step_budget(
        payload.coordinator_max_steps,
        DEFAULT_COORDINATOR_MAX_STEPS,
        "coordinator_max_steps",
    )?;

    let config = EnsembleConfig {
        max_workers: payload.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
        agent_max_steps: Some(agent_max_steps),
        coordinator_max_steps: Some(coordinator_max_steps),
        return_reasoning: payload.return_reasoning,
        defaults: GenerationOptions {
            temperature: payload.temperature.unwrap_or(0.7),
            top_p: payload.top_p.unwrap_or(1.0),
            max_tokens: payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            ..Default::default()
        },
        wolfram_app_id: payload.wolfram_app_id,
        chain_store_api_key: payload.chain_store_api_key,
        log_conversations: state.config.log_conversations,
    };

    let outcome = Ensemble::new(&state.engine)
        .run(&task, agents, coordinator, &config)
        .await?;

    Ok(Json(EnsembleResponse {
        response: outcome.answer,
        agent_results: outcome
            .agents
            .map(|reports| reports.into_iter().map(AgentResult::from).collect()),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use reasoner_core::testing::{EchoTool, FnProvider, RecordingSandboxProvider, ScriptedProvider};
    use reasoner_core::{AssistantReply, CompletionProvider, Engine, EngineError, ToolChoice};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::state::AppState;

    fn state(provider: Arc<dyn CompletionProvider>) -> AppState {
        let engine = Engine::builder()
            .provider(provider)
            .sandboxes(Arc::new(RecordingSandboxProvider::default()))
            .tool(EchoTool::named("python"))
            .build()
            .unwrap();
        AppState {
            engine: Arc::new(engine),
            config: Arc::new(ServerConfig::default()),
        }
    }

    async fn call(state: AppState, method: &str, uri: &str, body: Option<Value>) -> (u16, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = crate::router(state).oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn reason_body() -> Value {
        json!({
            "task": "2+2",
            "api_key": "sk",
            "model": "gpt-4o-mini",
            "api_url": "https://api.test/v1/chat/completions"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(state(Arc::new(ScriptedProvider::default())), "GET", "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tools"], json!(["python"]));
    }

    #[tokio::test]
    async fn test_reason_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            AssistantReply::text("<DONE>"),
            AssistantReply::text("4"),
        ]));

        let (status, body) = call(state(provider.clone()), "POST", "/reason", Some(reason_body())).await;
        assert_eq!(status, 200);
        assert_eq!(body["response"], "4");
        assert_eq!(body["steps"], 1);
        assert_eq!(body["budget_exceeded"], false);
        assert_eq!(body["thinking_tools"][0]["name"], "python");
        assert_eq!(body["reasoning_chain"][0]["role"], "system");

        let requests = provider.requests();
        assert_eq!(requests[0].options.max_tokens, 500);
        assert_eq!(requests[0].endpoint_url, "https://api.test/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_reason_missing_fields() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut body = reason_body();
        body["api_key"] = json!("");

        let (status, body) = call(state(provider.clone()), "POST", "/reason", Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "MISSING_PARAMETERS");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reason_transport_error_maps_to_bad_gateway() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![]).then_fail(EngineError::transport(Some(401), "bad key")),
        );

        let (status, body) = call(state(provider), "POST", "/reason", Some(reason_body())).await;
        assert_eq!(status, 502);
        assert_eq!(body["code"], "TRANSPORT_ERROR");
        assert_eq!(body["error"], "The model endpoint rejected the credentials.");
    }

    #[tokio::test]
    async fn test_reason_timeout_maps_to_gateway_timeout() {
        let provider = Arc::new(ScriptedProvider::new(vec![]).then_fail(EngineError::Timeout(60)));

        let (status, _) = call(state(provider), "POST", "/reason", Some(reason_body())).await;
        assert_eq!(status, 504);
    }

    #[tokio::test]
    async fn test_ensemble_with_agent_results() {
        let provider = Arc::new(FnProvider::new(|req| {
            Ok(match req.tool_choice {
                ToolChoice::Auto => AssistantReply::text("<DONE>"),
                ToolChoice::None => AssistantReply::text(format!("answer from {}", req.options.model)),
            })
        }));
        let body = json!({
            "task": "2+2",
            "agents": [
                {"model": "alpha", "api_key": "sk"},
                {"model": "beta", "api_key": "sk"}
            ],
            "coordinator": {"model": "judge", "api_key": "sk"},
            "return_reasoning": true
        });

        let (status, body) = call(state(provider), "POST", "/ensemble", Some(body)).await;
        assert_eq!(status, 200);
        assert_eq!(body["response"], "answer from judge");
        assert_eq!(body["agent_results"][0]["model"], "alpha");
        assert_eq!(body["agent_results"][1]["response"], "answer from beta");
        assert!(body["agent_results"][0].get("error").is_none());
    }

    #[tokio::test]
    async fn test_ensemble_requires_agents() {
        let body = json!({"task": "2+2", "agents": [], "coordinator": {"model": "judge"}});
        let (status, body) = call(state(Arc::new(ScriptedProvider::default())), "POST", "/ensemble", Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "MISSING_PARAMETERS");
    }

    #[tokio::test]
    async fn test_zero_step_budget_rejected() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut body = reason_body();
        body["max_reasoning_steps"] = json!(0);

        let (status, body) = call(state(provider.clone()), "POST", "/reason", Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "INVALID_PARAMETERS");
        assert_eq!(provider.call_count(), 0);
    }
}
