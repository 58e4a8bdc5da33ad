//! Execution Sandbox Handles
//!
//! The code tool runs inside an ephemeral sandbox owned by exactly one
//! session. Execution itself belongs to a [`Sandbox`] backend; the engine
//! owns the handle's lifetime: it is created before the first step, may be
//! renewed, and is released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Default sandbox lifetime (10 minutes)
pub const DEFAULT_SANDBOX_LIFETIME: Duration = Duration::from_secs(60 * 10);

/// Output of one code execution
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Interpreter-level error (exception, timeout), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A live sandbox instance
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend-assigned identifier
    fn id(&self) -> &str;

    /// Run code and capture its output
    async fn run_code(&self, code: &str, timeout: Duration) -> Result<ExecutionOutput>;

    /// Reset the remaining lifetime to `lifetime` from now
    async fn set_timeout(&self, lifetime: Duration) -> Result<()>;

    /// Tear the sandbox down
    async fn close(&self) -> Result<()>;
}

/// Creates sandboxes; one per session
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, lifetime: Duration) -> Result<Arc<dyn Sandbox>>;
}

/// Exclusively-owned sandbox for one session.
///
/// Dropping a handle that was never released (a cancelled session) spawns
/// the close on the current Tokio runtime.
pub struct SandboxHandle {
    session_id: Uuid,
    sandbox: Arc<dyn Sandbox>,
    released: bool,
}

impl SandboxHandle {
    /// Acquire a fresh sandbox from `provider`
    pub async fn acquire(
        provider: &dyn SandboxProvider,
        session_id: Uuid,
        lifetime: Duration,
    ) -> Result<Self> {
        let sandbox = provider.create(lifetime).await?;
        tracing::debug!(%session_id, sandbox = sandbox.id(), ?lifetime, "Sandbox acquired");
        Ok(Self {
            session_id,
            sandbox,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        self.sandbox.id()
    }

    pub async fn run_code(&self, code: &str, timeout: Duration) -> Result<ExecutionOutput> {
        self.sandbox.run_code(code, timeout).await
    }

    /// Extend the sandbox lifetime
    pub async fn renew(&self, lifetime: Duration) -> Result<()> {
        self.sandbox.set_timeout(lifetime).await
    }

    /// Release the sandbox. Failures are logged, never propagated.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.sandbox.close().await {
            tracing::warn!(session_id = %self.session_id, sandbox = self.sandbox.id(), error = %e, "Failed to release sandbox");
        } else {
            tracing::debug!(session_id = %self.session_id, sandbox = self.sandbox.id(), "Sandbox released");
        }
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let sandbox = self.sandbox.clone();
        let session_id = self.session_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(%session_id, sandbox = sandbox.id(), "Sandbox dropped unreleased, closing in background");
                runtime.spawn(async move {
                    if let Err(e) = sandbox.close().await {
                        tracing::warn!(%session_id, sandbox = sandbox.id(), error = %e, "Failed to release dropped sandbox");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%session_id, sandbox = sandbox.id(), "Sandbox dropped outside a runtime; left to its backend");
            }
        }
    }
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("session_id", &self.session_id)
            .field("sandbox", &self.sandbox.id())
            .finish()
    }
}
