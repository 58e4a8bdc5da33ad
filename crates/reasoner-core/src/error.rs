//! Error Types

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Session-fatal engine errors.
///
/// Recoverable tool problems never appear here; the dispatcher turns those
/// into in-band corrective messages (see [`crate::tool::ToolFailure`]).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing credential or invalid parameter, raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion endpoint answered with a non-success status or could not be reached
    #[error("Transport error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    /// Completion request exceeded its timeout
    #[error("Completion request timed out after {0} seconds")]
    Timeout(u64),

    /// Endpoint answered successfully but the reply could not be normalized
    #[error("Malformed completion reply: {0}")]
    MalformedReply(String),

    /// Sandbox could not be created, renewed or used
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Similar-chain retrieval failed
    #[error("Chain store error: {0}")]
    ChainStore(String),

    /// A history append would break the tool-call correlation invariant
    #[error("Tool call correlation error: {0}")]
    ToolCallCorrelation(String),

    /// Every ensemble agent failed, so there is nothing to coordinate
    #[error("All {count} ensemble agents failed: {summary}")]
    AllAgentsFailed { count: usize, summary: String },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Build a transport error from a status code and response body
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Check if a caller wrapping the whole session may retry it
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Io(_) => true,
            Self::Transport { status, .. } => {
                status.is_none_or(|s| s == 429 || (500..600).contains(&s))
            }
            _ => false,
        }
    }

    /// Stable machine-readable code for error payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::MalformedReply(_) => "MALFORMED_REPLY",
            Self::Sandbox(_) => "SANDBOX_ERROR",
            Self::ChainStore(_) => "CHAIN_STORE_ERROR",
            Self::ToolCallCorrelation(_) => "TOOL_CALL_CORRELATION",
            Self::AllAgentsFailed { .. } => "ALL_AGENTS_FAILED",
            Self::Io(_) | Self::Json(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Invalid request: {msg}"),
            Self::Transport { status, .. } => match status {
                Some(429) => "The model endpoint is rate limiting requests. Please wait a moment.".into(),
                Some(401 | 403) => "The model endpoint rejected the credentials.".into(),
                _ => "The model endpoint returned an error.".into(),
            },
            Self::Timeout(_) => "The model endpoint did not respond in time.".into(),
            Self::MalformedReply(_) => "The model endpoint returned an unexpected reply.".into(),
            Self::AllAgentsFailed { summary, .. } => format!("Every ensemble agent failed: {summary}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(EngineError::Timeout(60).is_retryable());
        assert!(EngineError::transport(Some(503), "unavailable").is_retryable());
        assert!(EngineError::transport(Some(429), "slow down").is_retryable());
        assert!(!EngineError::transport(Some(400), "bad request").is_retryable());
        assert!(!EngineError::Config("API key not provided".into()).is_retryable());
    }

    #[test]
    fn test_transport_display_includes_status() {
        let err = EngineError::transport(Some(500), "boom");
        assert_eq!(err.to_string(), "Transport error (status 500): boom");

        let err = EngineError::transport(None, "connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }
}
