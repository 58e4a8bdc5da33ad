//! Python Code Tool
//!
//! Runs model-written code in the session's sandbox and returns its captured
//! output. Each call renews the sandbox lifetime, so a long session does not
//! lose its sandbox between steps.

use std::time::Duration;

use async_trait::async_trait;
use reasoner_core::{
    sandbox::DEFAULT_SANDBOX_LIFETIME,
    tool::{Tool, ToolContext, ToolFailure, ToolGuide, ToolSpec},
};
use serde_json::{Map, Value, json};

/// Per-call timeout when the model does not pass one
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 5;

/// Upper bound on a model-requested timeout
const MAX_EXECUTION_TIMEOUT_SECS: u64 = 120;

/// Executes Python code in the session sandbox
#[derive(Clone, Debug)]
pub struct PythonTool {
    renew_lifetime: Option<Duration>,
}

impl Default for PythonTool {
    fn default() -> Self {
        Self {
            renew_lifetime: Some(DEFAULT_SANDBOX_LIFETIME),
        }
    }
}

impl PythonTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not touch the sandbox lifetime on each call
    pub const fn without_renewal(mut self) -> Self {
        self.renew_lifetime = None;
        self
    }
}

#[async_trait]
impl Tool for PythonTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "python",
            "Execute Python code and return the output.",
            json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The Python code to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Maximum execution time in seconds",
                        "default": DEFAULT_EXECUTION_TIMEOUT_SECS
                    }
                },
                "required": ["code"]
            }),
        )
    }

    fn guide(&self) -> ToolGuide {
        ToolGuide {
            summary: "For executing Python code".into(),
            when_to_use: Some("When you need to write or test Python code, use the python tool.".into()),
            guidelines_heading: Some("When writing Python code:".into()),
            guidelines: vec![
                "If your code produces an error, add print statements to debug the issue".into(),
                "Use assertions/prints to validate inputs, intermediate results, and outputs".into(),
                "Print the state to see what's happening".into(),
                "When an error occurs, systematically add checks to identify where the problem is".into(),
                "Structure your debugging process step by step".into(),
            ],
        }
    }

    fn validate(&self, arguments: &Map<String, Value>) -> Result<(), ToolFailure> {
        match arguments.get("code") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(ToolFailure::Validation("code must be a string".into())),
            None => return Err(ToolFailure::Validation("Missing required parameter: code".into())),
        }
        match arguments.get("timeout") {
            None | Some(Value::Null) => Ok(()),
            Some(t) if t.as_u64().is_some_and(|secs| secs > 0) => Ok(()),
            Some(_) => Err(ToolFailure::Validation("timeout must be a positive integer".into())),
        }
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolFailure> {
        let code = arguments
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let secs = arguments
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_EXECUTION_TIMEOUT_SECS)
            .min(MAX_EXECUTION_TIMEOUT_SECS);

        if let Some(lifetime) = self.renew_lifetime {
            ctx.sandbox
                .renew(lifetime)
                .await
                .map_err(|e| ToolFailure::Execution(e.to_string()))?;
        }

        tracing::debug!(sandbox = ctx.sandbox.id(), timeout_secs = secs, "Running code");
        let output = ctx
            .sandbox
            .run_code(code, Duration::from_secs(secs))
            .await
            .map_err(|e| ToolFailure::Execution(e.to_string()))?;

        Ok(json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "error": output.error,
        }))
    }
}
