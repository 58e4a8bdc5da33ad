//! Local Process Sandbox
//!
//! A development backend for [`SandboxProvider`]: each sandbox is a scratch
//! directory, and each execution is a fresh interpreter process started in
//! it. Files written by earlier executions stay visible to later ones;
//! interpreter state does not.
//!
//! This is not an isolation boundary. Code runs with the server's own
//! privileges.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reasoner_core::{
    error::{EngineError, Result},
    sandbox::{ExecutionOutput, Sandbox, SandboxProvider},
};
use tokio::process::Command;
use tokio::time::Instant;
use uuid::Uuid;

/// Creates [`ProcessSandbox`]es under a root directory
#[derive(Clone, Debug)]
pub struct ProcessSandboxProvider {
    interpreter: PathBuf,
    root: PathBuf,
}

impl ProcessSandboxProvider {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            root: std::env::temp_dir(),
        }
    }

    /// Place scratch directories under `root` instead of the system temp dir
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

#[async_trait]
impl SandboxProvider for ProcessSandboxProvider {
    async fn create(&self, lifetime: Duration) -> Result<Arc<dyn Sandbox>> {
        let id = format!("sbx-{}", Uuid::new_v4().simple());
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::Sandbox(format!("Failed to create {}: {e}", dir.display())))?;

        tracing::debug!(sandbox = %id, dir = %dir.display(), "Created process sandbox");
        Ok(Arc::new(ProcessSandbox {
            id,
            dir,
            interpreter: self.interpreter.clone(),
            deadline: Mutex::new(Instant::now() + lifetime),
            runs: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One scratch directory and its lifetime
#[derive(Debug)]
pub struct ProcessSandbox {
    id: String,
    dir: PathBuf,
    interpreter: PathBuf,
    deadline: Mutex<Instant>,
    runs: AtomicUsize,
    closed: AtomicBool,
}

impl ProcessSandbox {
    fn deadline(&self) -> Instant {
        *self
            .deadline
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Sandbox(format!("Sandbox {} is closed", self.id)));
        }
        if Instant::now() >= self.deadline() {
            return Err(EngineError::Sandbox(format!("Sandbox {} has expired", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run_code(&self, code: &str, timeout: Duration) -> Result<ExecutionOutput> {
        self.ensure_usable()?;

        // never outlive the sandbox itself
        let remaining = self.deadline().saturating_duration_since(Instant::now());
        let timeout = timeout.min(remaining);

        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self.dir.join(format!("cell_{n}.py"));
        tokio::fs::write(&script, code).await?;

        let child = Command::new(&self.interpreter)
            .arg(&script)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Sandbox(format!(
                    "Failed to start {}: {e}",
                    self.interpreter.display()
                ))
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let error = (!output.status.success()).then(|| {
                    stderr
                        .lines()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .map_or_else(|| output.status.to_string(), str::to_string)
                });
                Ok(ExecutionOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr,
                    error,
                })
            }
            Err(_) => {
                tracing::warn!(sandbox = %self.id, ?timeout, "Execution timed out");
                Ok(ExecutionOutput {
                    error: Some(format!(
                        "Execution timed out after {:.1} seconds",
                        timeout.as_secs_f64()
                    )),
                    ..Default::default()
                })
            }
        }
    }

    async fn set_timeout(&self, lifetime: Duration) -> Result<()> {
        self.ensure_usable()?;
        *self
            .deadline
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Instant::now() + lifetime;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Sandbox(format!(
                "Failed to remove {}: {e}",
                self.dir.display()
            ))),
        }
    }
}

impl Drop for ProcessSandbox {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(sandbox = %self.id, dir = %self.dir.display(), error = %e, "Failed to remove unclosed sandbox");
            }
        }
    }
}
