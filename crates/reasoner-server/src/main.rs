//! Reasoning Engine HTTP Server
//!
//! Axum-based server exposing single-model reasoning, multi-model ensembles
//! and a health check.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reasoner_core::{ConversationLogger, Engine};
use reasoner_runtime::{ClientConfig, OpenAiCompatibleClient, ProcessSandboxProvider, standard_tools};

use crate::config::ServerConfig;
use crate::handlers::{ensemble_handler, health_check, reason_handler};
use crate::state::AppState;

/// Routes and middleware over shared state
pub(crate) fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/reason", post(reason_handler))
        .route("/ensemble", post(ensemble_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    // Completion transport, shared by sessions and the web lookup tool
    let provider = Arc::new(OpenAiCompatibleClient::new(ClientConfig::from_env())?);

    let tools = standard_tools(
        provider.clone(),
        config.web_lookup_model.clone(),
        config.tool_http_timeout,
    )?;
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let sandboxes = ProcessSandboxProvider::new(&config.python_bin);
    tracing::warn!(
        interpreter = %config.python_bin.display(),
        "Using the local process sandbox; code runs without isolation"
    );

    let engine = Engine::builder()
        .provider(provider)
        .sandboxes(Arc::new(sandboxes))
        .tools(tools)
        .logger(ConversationLogger::new(&config.log_dir))
        .build()?;

    if config.log_conversations {
        tracing::info!(dir = %config.log_dir.display(), "Conversation logging enabled by default");
    }

    let addr = config.bind_addr.clone();
    let state = AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("reasoner-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health    - Health check");
    tracing::info!("  POST /reason    - Single-model reasoning");
    tracing::info!("  POST /ensemble  - Multi-model ensemble");

    axum::serve(listener, app).await?;

    Ok(())
}
