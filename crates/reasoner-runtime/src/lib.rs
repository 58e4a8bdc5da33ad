//! # reasoner-runtime
//!
//! Runtime backends for reasoner-core.
//!
//! ## Backends
//!
//! - **OpenAI-compatible client**: chat completions with function tools over reqwest
//! - **Process sandbox**: scratch directory plus a local interpreter (development only)
//! - **Tools**: `find_datapoint_on_web`, `python`, `wolfram`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reasoner_runtime::{ClientConfig, OpenAiCompatibleClient, ProcessSandboxProvider};
//!
//! let provider = Arc::new(OpenAiCompatibleClient::new(ClientConfig::default())?);
//! let engine = Engine::builder()
//!     .provider(provider.clone())
//!     .sandboxes(Arc::new(ProcessSandboxProvider::new("python3")))
//!     .tools(standard_tools(provider, DEFAULT_WEB_LOOKUP_MODEL, Duration::from_secs(30))?)
//!     .build()?;
//! ```

pub mod openai;
pub mod process_sandbox;
pub mod tools;

pub use openai::{ClientConfig, OpenAiCompatibleClient};
pub use process_sandbox::{ProcessSandbox, ProcessSandboxProvider};
pub use tools::{DEFAULT_WEB_LOOKUP_MODEL, PythonTool, WebLookupTool, WolframTool, standard_tools};

// Re-export core types for convenience
pub use reasoner_core::{
    CompletionProvider, Engine, EngineError, Ensemble, Result, SandboxProvider, TaskRequest, Tool,
    ToolRegistry,
};
