//! Tool System
//!
//! Capabilities the model can invoke through tool calls. Tools are registered
//! once; each session derives its catalog from the registry and the
//! credentials it was given, so a tool whose credential is missing is neither
//! advertised nor described in the framing text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::provider::Endpoint;
use crate::sandbox::SandboxHandle;

/// Tool definition advertised to the completion endpoint.
///
/// `parameters` is a JSON-Schema object (`type`, `properties`, `required`)
/// and is forwarded verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// JSON Schema of the arguments object
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names listed under the schema's `required` key
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// How a tool is described in the session's framing text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolGuide {
    /// One line for the numbered tool list
    pub summary: String,

    /// "When you need to ..., use the X tool." line
    pub when_to_use: Option<String>,

    /// Heading for the guideline block, e.g. "When writing Python code:"
    pub guidelines_heading: Option<String>,

    /// Bullet points under the heading
    pub guidelines: Vec<String>,
}

/// Credentials that gate optional tools
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    WolframAppId,
}

/// Per-session credentials
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Primary completion endpoint credential
    pub api_key: Option<String>,

    /// Enables the scientific/factual computation tool
    pub wolfram_app_id: Option<String>,

    /// Enables similar-chain exemplar retrieval
    pub chain_store_api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn with_wolfram_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.wolfram_app_id = Some(app_id.into());
        self
    }

    pub fn with_chain_store_api_key(mut self, key: impl Into<String>) -> Self {
        self.chain_store_api_key = Some(key.into());
        self
    }

    /// Value for a gating credential; blank strings count as absent
    pub fn get(&self, kind: CredentialKind) -> Option<&str> {
        let value = match kind {
            CredentialKind::WolframAppId => self.wolfram_app_id.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("wolfram_app_id", &mask(&self.wolfram_app_id))
            .field("chain_store_api_key", &mask(&self.chain_store_api_key))
            .finish()
    }
}

/// Task context forwarded to a tool invocation
#[derive(Clone, Copy, Debug)]
pub struct ToolContext<'a> {
    /// Current task description
    pub task: &'a str,

    /// Model driving the session
    pub model: &'a str,

    /// Completion endpoint and credential of the session
    pub endpoint: &'a Endpoint,

    /// Capability-specific credentials
    pub credentials: &'a Credentials,

    /// The session's sandbox
    pub sandbox: &'a SandboxHandle,
}

/// Recoverable tool failure, reported back to the model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("No arguments provided in tool call")]
    MissingArguments,

    #[error("Invalid JSON in tool arguments: {raw} ({reason})")]
    InvalidJson { raw: String, reason: String },

    #[error("Tool arguments must be a JSON object, got: {raw}")]
    NotAnObject { raw: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("{0}")]
    Execution(String),
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema advertised to the model
    fn spec(&self) -> ToolSpec;

    /// Framing-text description
    fn guide(&self) -> ToolGuide {
        let spec = self.spec();
        ToolGuide {
            summary: spec.description,
            ..Default::default()
        }
    }

    /// Credential the tool needs before it may be catalogued
    fn required_credential(&self) -> Option<CredentialKind> {
        None
    }

    /// Validate arguments before execution (optional)
    fn validate(&self, arguments: &Map<String, Value>) -> Result<(), ToolFailure> {
        let spec = self.spec();
        for name in spec.required_parameters() {
            if !arguments.contains_key(name) {
                return Err(ToolFailure::Validation(format!(
                    "Missing required parameter: {name}"
                )));
            }
        }
        Ok(())
    }

    /// Execute the tool with parsed arguments
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolFailure>;
}

/// Registry for available tools, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool, replacing any tool of the same name in place
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        if let Some(slot) = self.tools.iter_mut().find(|t| t.spec().name == name) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name).cloned()
    }

    /// Subset of tools whose gating credential is present
    pub fn available_for(&self, credentials: &Credentials) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|t| {
                t.required_credential()
                    .is_none_or(|kind| credentials.get(kind).is_some())
            })
            .cloned()
            .collect();
        Self { tools }
    }

    /// Tool catalog, in registration order
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Framing guides, in registration order
    pub fn guides(&self) -> Vec<(String, ToolGuide)> {
        self.tools
            .iter()
            .map(|t| (t.spec().name, t.guide()))
            .collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
