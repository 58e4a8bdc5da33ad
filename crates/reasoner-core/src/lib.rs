//! # reasoner-core
//!
//! Step-wise, tool-augmented reasoning over any OpenAI-compatible chat
//! completion endpoint, plus ensemble coordination across several models.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Engine (session)                         │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────────┐  │
//! │  │  Reasoning   │  │ ToolDispatcher │  │  CompletionProvider  │  │
//! │  │    Loop      │──│  + Registry    │──│     (Strategy)       │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────────┘  │
//! │         │                  │                                      │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────────┐  │
//! │  │ Conversation │  │ SandboxHandle  │  │  ConversationLogger  │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//!          ▲ fan-in                       fan-out ▲
//!          └──────────────── Ensemble ────────────┘
//! ```
//!
//! Transports, sandboxes and concrete tools plug in through the
//! [`CompletionProvider`], [`SandboxProvider`] and [`Tool`] traits.

pub mod dispatcher;
pub mod ensemble;
pub mod error;
pub mod exemplar;
pub mod logger;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod reasoning;
pub mod sandbox;
pub mod session;
pub mod termination;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use ensemble::{AgentConfig, AgentOutcome, AgentReport, Ensemble, EnsembleConfig, EnsembleOutcome};
pub use error::{EngineError, Result};
pub use exemplar::{ChainStore, ExemplarChain};
pub use logger::{ConversationLogger, LogRecord};
pub use message::{Conversation, Message, Role, ToolCallRequest};
pub use provider::{
    AssistantReply, CompletionProvider, CompletionRequest, Endpoint, GenerationOptions, ToolChoice,
};
pub use reasoning::{LoopOutcome, ReasoningLoop};
pub use sandbox::{ExecutionOutput, Sandbox, SandboxHandle, SandboxProvider};
pub use session::{Engine, EngineBuilder, SessionOutcome, TaskRequest};
pub use termination::TerminationPolicy;
pub use tool::{CredentialKind, Credentials, Tool, ToolContext, ToolFailure, ToolGuide, ToolRegistry, ToolSpec};
