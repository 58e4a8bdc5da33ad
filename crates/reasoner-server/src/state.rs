//! Application State

use std::sync::Arc;

use reasoner_core::Engine;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Engine shared by every request; sessions never share conversation state
    pub engine: Arc<Engine>,

    /// Process-level settings
    pub config: Arc<ServerConfig>,
}
