//! Test Doubles
//!
//! Deterministic providers, sandboxes and tools for exercising the engine
//! without a network or an interpreter. Compiled for this crate's tests and
//! for downstream crates through the `testing` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::{EngineError, Result};
use crate::exemplar::{ChainStore, ExemplarChain};
use crate::message::Message;
use crate::provider::{
    AssistantReply, CompletionProvider, CompletionRequest, Endpoint, GenerationOptions, ToolChoice,
};
use crate::sandbox::{ExecutionOutput, Sandbox, SandboxProvider};
use crate::tool::{Tool, ToolContext, ToolFailure, ToolSpec};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of one completion request
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
    pub options: GenerationOptions,
    pub endpoint_url: String,
}

impl RecordedRequest {
    fn capture(endpoint: &Endpoint, request: &CompletionRequest<'_>) -> Self {
        Self {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
            options: request.options.clone(),
            endpoint_url: endpoint.url.clone(),
        }
    }
}

/// Replays a fixed script of replies, in order
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<AssistantReply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::default(),
        }
    }

    /// Append a failing reply to the script
    pub fn then_fail(self, error: EngineError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        endpoint: &Endpoint,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantReply> {
        lock(&self.requests).push(RecordedRequest::capture(endpoint, &request));
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Other("script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

type Responder = dyn Fn(&RecordedRequest) -> Result<AssistantReply> + Send + Sync;

/// Answers each request through a closure, optionally after a delay.
///
/// Suits concurrent sessions, where a shared script would interleave.
pub struct FnProvider {
    responder: Box<Responder>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FnProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<AssistantReply> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            requests: Mutex::default(),
        }
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Model of each request, in arrival order
    pub fn models(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|r| r.options.model.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for FnProvider {
    async fn complete(
        &self,
        endpoint: &Endpoint,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantReply> {
        let recorded = RecordedRequest::capture(endpoint, &request);
        lock(&self.requests).push(recorded.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&recorded)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

#[derive(Debug, Default)]
struct SandboxCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    renewals: AtomicUsize,
}

/// Sandboxes that echo submitted code and count their lifecycle events
#[derive(Clone, Debug, Default)]
pub struct RecordingSandboxProvider {
    counters: Arc<SandboxCounters>,
}

impl RecordingSandboxProvider {
    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sandboxes currently open
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of sandboxes open at once
    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn renewals(&self) -> usize {
        self.counters.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvider for RecordingSandboxProvider {
    async fn create(&self, _lifetime: Duration) -> Result<Arc<dyn Sandbox>> {
        let n = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Arc::new(RecordingSandbox {
            id: format!("sandbox-{n}"),
            counters: self.counters.clone(),
        }))
    }
}

struct RecordingSandbox {
    id: String,
    counters: Arc<SandboxCounters>,
}

#[async_trait]
impl Sandbox for RecordingSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run_code(&self, code: &str, _timeout: Duration) -> Result<ExecutionOutput> {
        Ok(ExecutionOutput {
            stdout: code.to_string(),
            ..Default::default()
        })
    }

    async fn set_timeout(&self, _lifetime: Duration) -> Result<()> {
        self.counters.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Returns its `text` argument unchanged
#[derive(Clone, Debug)]
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            &self.name,
            "Echo the given text back.",
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo"}
                },
                "required": ["text"]
            }),
        )
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        _ctx: &ToolContext<'_>,
    ) -> std::result::Result<Value, ToolFailure> {
        arguments
            .get("text")
            .and_then(Value::as_str)
            .map(|text| Value::String(text.to_string()))
            .ok_or_else(|| ToolFailure::Validation("text must be a string".into()))
    }
}

/// Always fails with a fixed message
#[derive(Clone, Debug)]
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            &self.name,
            "A tool that always fails.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn execute(
        &self,
        _arguments: Map<String, Value>,
        _ctx: &ToolContext<'_>,
    ) -> std::result::Result<Value, ToolFailure> {
        Err(ToolFailure::Execution(self.message.clone()))
    }
}

/// Returns the same chains for every task
#[derive(Clone, Debug, Default)]
pub struct StaticChainStore {
    chains: Vec<ExemplarChain>,
    lookups: Arc<AtomicUsize>,
}

impl StaticChainStore {
    pub fn new(chains: Vec<ExemplarChain>) -> Self {
        Self {
            chains,
            lookups: Arc::default(),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainStore for StaticChainStore {
    async fn similar_chains(&self, _task: &str, _api_key: &str) -> Result<Vec<ExemplarChain>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.chains.clone())
    }
}
