//! Server Configuration

use std::path::PathBuf;
use std::time::Duration;

use reasoner_runtime::DEFAULT_WEB_LOOKUP_MODEL;

/// Request-layer defaults, applied when a request omits the field
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_MAX_REASONING_STEPS: u32 = 10;
pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const DEFAULT_COORDINATOR_MAX_STEPS: u32 = 5;

/// Process-level settings, read once at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Directory for conversation log records
    pub log_dir: PathBuf,

    /// Log conversations unless a request says otherwise
    pub log_conversations: bool,

    /// Interpreter used by the process sandbox
    pub python_bin: PathBuf,

    /// Model answering `find_datapoint_on_web` lookups
    pub web_lookup_model: String,

    /// Timeout for tool-side HTTP calls
    pub tool_http_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5050".into(),
            log_dir: PathBuf::from("logs"),
            log_conversations: false,
            python_bin: PathBuf::from("python3"),
            web_lookup_model: DEFAULT_WEB_LOOKUP_MODEL.into(),
            tool_http_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_dir: var("CONVERSATION_LOG_DIR").map_or(defaults.log_dir, PathBuf::from),
            log_conversations: var("LOG_CONVERSATIONS")
                .map_or(defaults.log_conversations, |v| parse_flag(&v)),
            python_bin: var("PYTHON_BIN").map_or(defaults.python_bin, PathBuf::from),
            web_lookup_model: var("WEB_LOOKUP_MODEL").unwrap_or(defaults.web_lookup_model),
            tool_http_timeout: defaults.tool_http_timeout,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5050");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert!(!config.log_conversations);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("nope"));
    }
}
