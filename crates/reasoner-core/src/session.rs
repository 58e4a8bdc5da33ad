//! Task Sessions
//!
//! The top-level entry point. [`Engine::run`] checks credentials, assembles
//! the session's tool catalog, owns the sandbox for the session's lifetime,
//! drives the [`ReasoningLoop`] and finishes with one tool-free final-answer
//! request. Intermediate steps are not meant for the end user; only the final
//! answer is.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::exemplar::{ChainStore, ExemplarChain, render_exemplars};
use crate::logger::{ConversationLogger, LogRecord};
use crate::message::{Conversation, Message};
use crate::prompt::{FINAL_ANSWER_PROMPT, IMAGE_INTRO, system_framing};
use crate::provider::{CompletionProvider, DEFAULT_API_URL, Endpoint, GenerationOptions};
use crate::reasoning::{LoopOutcome, ReasoningLoop};
use crate::sandbox::{DEFAULT_SANDBOX_LIFETIME, SandboxHandle, SandboxProvider};
use crate::termination::TerminationPolicy;
use crate::tool::{Credentials, Tool, ToolContext, ToolRegistry, ToolSpec};

/// Input for one session
#[derive(Clone, Debug)]
pub struct TaskRequest {
    pub task: String,
    pub credentials: Credentials,
    pub api_url: String,
    pub options: GenerationOptions,

    /// Step budget; `None` or zero runs until a completion phrase appears
    pub max_steps: Option<u32>,

    /// Image URL or data URI shown to the model before the first step
    pub image: Option<String>,

    /// Exemplar chains supplied by the caller; skips chain-store retrieval
    pub exemplars: Option<Vec<ExemplarChain>>,

    /// Persist the trimmed conversation when the session succeeds
    pub log_conversation: bool,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            task: task.into(),
            credentials,
            api_url: DEFAULT_API_URL.into(),
            options: GenerationOptions::default(),
            max_steps: None,
            image: None,
            exemplars: None,
            log_conversation: false,
        }
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub const fn max_steps(mut self, max: u32) -> Self {
        self.max_steps = Some(max);
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn exemplars(mut self, chains: Vec<ExemplarChain>) -> Self {
        self.exemplars = Some(chains);
        self
    }

    pub const fn log_conversation(mut self, enabled: bool) -> Self {
        self.log_conversation = enabled;
        self
    }
}

/// Result of a completed session
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,

    /// Content of the final answer; `None` if the model returned no text
    pub answer: Option<String>,

    /// Full conversation, exemplars included
    pub conversation: Conversation,

    /// Catalog advertised during the session
    pub tools: Vec<ToolSpec>,

    /// Step counter when the loop stopped
    pub steps: u32,

    /// Whether the session ended through the step budget
    pub budget_exceeded: bool,
}

/// Runs task sessions against a shared provider, sandbox backend and tool set
pub struct Engine {
    provider: Arc<dyn CompletionProvider>,
    sandboxes: Arc<dyn SandboxProvider>,
    tools: ToolRegistry,
    chain_store: Option<Arc<dyn ChainStore>>,
    logger: Option<ConversationLogger>,
    policy: TerminationPolicy,
    sandbox_lifetime: Duration,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Registered tools, before credential gating
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn policy(&self) -> &TerminationPolicy {
        &self.policy
    }

    /// Run one task to its final answer
    pub async fn run(&self, request: TaskRequest) -> Result<SessionOutcome> {
        let api_key = request
            .credentials
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EngineError::Config("API key not provided.".into()))?;
        let endpoint = Endpoint::new(&request.api_url, api_key);

        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("session", %session_id, model = %request.options.model);
        self.run_session(session_id, &request, &endpoint)
            .instrument(span)
            .await
    }

    async fn run_session(
        &self,
        session_id: Uuid,
        request: &TaskRequest,
        endpoint: &Endpoint,
    ) -> Result<SessionOutcome> {
        tracing::info!(task = %request.task, "Starting task");

        let tools = self.tools.available_for(&request.credentials);
        let exemplars = self.exemplars(request).await?;

        let sandbox =
            SandboxHandle::acquire(self.sandboxes.as_ref(), session_id, self.sandbox_lifetime)
                .await?;
        let result = self
            .drive(request, endpoint, &tools, exemplars, &sandbox)
            .await;
        sandbox.release().await;

        let (conversation, outcome, answer) = result?;
        let outcome = SessionOutcome {
            session_id,
            answer,
            conversation,
            tools: tools.specs(),
            steps: outcome.steps(),
            budget_exceeded: matches!(outcome, LoopOutcome::BudgetExceeded { .. }),
        };

        if request.log_conversation {
            self.log(request, &outcome).await;
        }

        tracing::info!(steps = outcome.steps, budget_exceeded = outcome.budget_exceeded, "Task complete");
        Ok(outcome)
    }

    async fn exemplars(&self, request: &TaskRequest) -> Result<Vec<Message>> {
        if let Some(chains) = &request.exemplars {
            return Ok(render_exemplars(chains));
        }

        let key = request
            .credentials
            .chain_store_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty());
        match (&self.chain_store, key) {
            (Some(store), Some(key)) => {
                let chains = store.similar_chains(&request.task, key).await?;
                tracing::debug!(count = chains.len(), "Retrieved similar chains");
                Ok(render_exemplars(&chains))
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn drive(
        &self,
        request: &TaskRequest,
        endpoint: &Endpoint,
        tools: &ToolRegistry,
        exemplars: Vec<Message>,
        sandbox: &SandboxHandle,
    ) -> Result<(Conversation, LoopOutcome, Option<String>)> {
        let mut conversation = Conversation::with_exemplars(exemplars)?;
        conversation.push(Message::system(system_framing(&request.task, tools)))?;
        if let Some(image) = &request.image {
            conversation.push(Message::user_with_image(IMAGE_INTRO, image))?;
        }

        let ctx = ToolContext {
            task: &request.task,
            model: &request.options.model,
            endpoint,
            credentials: &request.credentials,
            sandbox,
        };
        let reasoning = ReasoningLoop::new(
            self.provider.as_ref(),
            &request.options,
            tools,
            &self.policy,
            request.max_steps,
        );

        let outcome = reasoning.run(&mut conversation, &ctx).await?;
        let answer = match &outcome {
            LoopOutcome::Completed { .. } => {
                tracing::debug!("Requesting final response");
                reasoning
                    .final_answer(&mut conversation, &ctx, FINAL_ANSWER_PROMPT)
                    .await?
            }
            LoopOutcome::BudgetExceeded { answer, .. } => answer.clone(),
        };

        Ok((conversation, outcome, answer))
    }

    async fn log(&self, request: &TaskRequest, outcome: &SessionOutcome) {
        let Some(logger) = &self.logger else {
            tracing::debug!("Conversation logging requested but no logger is configured");
            return;
        };

        let record = LogRecord {
            session_id: outcome.session_id,
            task: request.task.clone(),
            model: request.options.model.clone(),
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            max_tokens: request.options.max_tokens,
            api_url: request.api_url.clone(),
            conversation_history: outcome.conversation.trimmed().to_vec(),
            final_response: outcome.answer.clone(),
            created_at: Utc::now(),
        };

        match logger.write(&record).await {
            Ok(path) => tracing::info!(path = %path.display(), "Conversation logged"),
            Err(e) => tracing::warn!(error = %e, "Failed to log conversation"),
        }
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    provider: Option<Arc<dyn CompletionProvider>>,
    sandboxes: Option<Arc<dyn SandboxProvider>>,
    tools: ToolRegistry,
    chain_store: Option<Arc<dyn ChainStore>>,
    logger: Option<ConversationLogger>,
    policy: TerminationPolicy,
    sandbox_lifetime: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            sandboxes: None,
            tools: ToolRegistry::new(),
            chain_store: None,
            logger: None,
            policy: TerminationPolicy::default(),
            sandbox_lifetime: DEFAULT_SANDBOX_LIFETIME,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn sandboxes(mut self, sandboxes: Arc<dyn SandboxProvider>) -> Self {
        self.sandboxes = Some(sandboxes);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn chain_store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.chain_store = Some(store);
        self
    }

    pub fn logger(mut self, logger: ConversationLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn termination_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn sandbox_lifetime(mut self, lifetime: Duration) -> Self {
        self.sandbox_lifetime = lifetime;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let provider = self
            .provider
            .ok_or_else(|| EngineError::Config("Completion provider is required".into()))?;
        let sandboxes = self
            .sandboxes
            .ok_or_else(|| EngineError::Config("Sandbox provider is required".into()))?;

        Ok(Engine {
            provider,
            sandboxes,
            tools: self.tools,
            chain_store: self.chain_store,
            logger: self.logger,
            policy: self.policy,
            sandbox_lifetime: self.sandbox_lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AssistantReply;
    use crate::testing::{EchoTool, FnProvider, RecordingSandboxProvider, ScriptedProvider};

    #[test]
    fn test_builder_requires_provider() {
        let result = Engine::builder()
            .sandboxes(Arc::new(RecordingSandboxProvider::default()))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let sandboxes = Arc::new(RecordingSandboxProvider::default());
        let engine = Engine::builder()
            .provider(provider.clone())
            .sandboxes(sandboxes.clone())
            .tool(EchoTool::named("python"))
            .build()
            .unwrap();

        let err = engine
            .run(TaskRequest::new("2+2", Credentials::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(sandboxes.created(), 0);
    }

    #[tokio::test]
    async fn test_sandbox_released_on_transport_failure() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![]).then_fail(EngineError::transport(Some(500), "boom")),
        );
        let sandboxes = Arc::new(RecordingSandboxProvider::default());
        let engine = Engine::builder()
            .provider(provider)
            .sandboxes(sandboxes.clone())
            .build()
            .unwrap();

        let err = engine
            .run(TaskRequest::new("2+2", Credentials::new("sk")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport { status: Some(500), .. }));
        assert_eq!(sandboxes.created(), 1);
        assert_eq!(sandboxes.closed(), 1);
    }

    #[tokio::test]
    async fn test_sandbox_released_when_session_is_cancelled() {
        let provider = Arc::new(
            FnProvider::new(|_| Ok(AssistantReply::text("<DONE>")))
                .with_delay(Duration::from_millis(500)),
        );
        let sandboxes = Arc::new(RecordingSandboxProvider::default());
        let engine = Engine::builder()
            .provider(provider)
            .sandboxes(sandboxes.clone())
            .build()
            .unwrap();

        let run = engine.run(TaskRequest::new("2+2", Credentials::new("sk")));
        assert!(tokio::time::timeout(Duration::from_millis(50), run).await.is_err());

        for _ in 0..50 {
            if sandboxes.closed() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sandboxes.created(), 1);
        assert_eq!(sandboxes.closed(), 1);
        assert_eq!(sandboxes.live(), 0);
    }
}
