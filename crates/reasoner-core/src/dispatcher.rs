//! Tool Dispatcher
//!
//! Resolves a model's tool-call request to a registered tool, checks and
//! parses its argument text, and runs it. Nothing here returns an error:
//! every failure becomes a [`DispatchOutcome::Failed`] the step loop turns
//! into corrective feedback for the model.

use serde_json::{Map, Value};

use crate::message::{Message, ToolCallRequest};
use crate::tool::{ToolContext, ToolFailure, ToolRegistry};

/// Result of dispatching one tool call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Tool ran; its result rendered as text
    Completed(String),
    /// Tool could not run or reported a failure
    Failed(ToolFailure),
}

impl DispatchOutcome {
    /// Content for the `tool` message answering the call
    pub fn tool_content(&self) -> String {
        match self {
            Self::Completed(text) => text.clone(),
            Self::Failed(failure) => format!("Error: {failure}"),
        }
    }

    /// System message asking the model to correct itself, for failures
    pub fn corrective_message(&self, tool_name: &str) -> Option<Message> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(Message::system(format!(
                "Error using {tool_name} tool: {failure}\nPlease correct your approach and try again."
            ))),
        }
    }
}

/// Dispatches tool calls against a session's catalog
#[derive(Clone, Copy, Debug)]
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolDispatcher<'a> {
    pub const fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Dispatch one call. Never fails outward.
    pub async fn dispatch(&self, call: &ToolCallRequest, ctx: &ToolContext<'_>) -> DispatchOutcome {
        match self.try_dispatch(call, ctx).await {
            Ok(value) => DispatchOutcome::Completed(render_result(&value)),
            Err(failure) => {
                tracing::warn!(
                    tool = %call.function_name,
                    tool_call_id = %call.id,
                    error = %failure,
                    "Tool call failed"
                );
                DispatchOutcome::Failed(failure)
            }
        }
    }

    async fn try_dispatch(
        &self,
        call: &ToolCallRequest,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolFailure> {
        let arguments = parse_arguments(call.arguments.as_deref())?;

        let tool = self
            .registry
            .get(&call.function_name)
            .ok_or_else(|| ToolFailure::UnknownTool(call.function_name.clone()))?;

        tool.validate(&arguments)?;

        tracing::debug!(tool = %call.function_name, tool_call_id = %call.id, "Executing tool");
        tool.execute(arguments, ctx).await
    }
}

/// Parse raw argument text into a JSON object.
///
/// Absent or blank text is reported separately from malformed JSON, and the
/// offending raw text is echoed back so the model can fix it.
pub fn parse_arguments(raw: Option<&str>) -> Result<Map<String, Value>, ToolFailure> {
    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(ToolFailure::MissingArguments),
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ToolFailure::NotAnObject { raw: raw.to_string() }),
        Err(e) => Err(ToolFailure::InvalidJson {
            raw: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Render a tool result as text; strings pass through unquoted
pub fn render_result(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Endpoint;
    use crate::sandbox::{DEFAULT_SANDBOX_LIFETIME, SandboxHandle};
    use crate::testing::{EchoTool, FailingTool, RecordingSandboxProvider};
    use crate::tool::Credentials;
    use serde_json::json;

    #[test]
    fn test_parse_arguments_failures() {
        assert_eq!(parse_arguments(None), Err(ToolFailure::MissingArguments));
        assert_eq!(parse_arguments(Some("")), Err(ToolFailure::MissingArguments));
        assert_eq!(parse_arguments(Some("  \n")), Err(ToolFailure::MissingArguments));

        match parse_arguments(Some("{bad json")) {
            Err(ToolFailure::InvalidJson { raw, .. }) => assert_eq!(raw, "{bad json"),
            other => panic!("expected InvalidJson, got {other:?}"),
        }

        assert!(matches!(
            parse_arguments(Some("[1, 2]")),
            Err(ToolFailure::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_render_result() {
        assert_eq!(render_result(&json!("plain")), "plain");
        assert_eq!(render_result(&json!({"stdout": "4\n"})), r#"{"stdout":"4\n"}"#);
        assert_eq!(render_result(&json!(4)), "4");
    }

    #[test]
    fn test_corrective_message_text() {
        let outcome = DispatchOutcome::Failed(ToolFailure::MissingArguments);
        let msg = outcome.corrective_message("python").unwrap();
        assert_eq!(
            msg,
            Message::system(
                "Error using python tool: No arguments provided in tool call\nPlease correct your approach and try again."
            )
        );
        assert!(DispatchOutcome::Completed("ok".into()).corrective_message("python").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_outcomes() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::named("echo"));
        registry.register(FailingTool::named("broken", "service down"));
        let dispatcher = ToolDispatcher::new(&registry);

        let sandboxes = RecordingSandboxProvider::default();
        let sandbox = SandboxHandle::acquire(&sandboxes, uuid::Uuid::new_v4(), DEFAULT_SANDBOX_LIFETIME)
            .await
            .unwrap();
        let endpoint = Endpoint::new("http://localhost", "sk");
        let credentials = Credentials::new("sk");
        let ctx = ToolContext {
            task: "2+2",
            model: "m",
            endpoint: &endpoint,
            credentials: &credentials,
            sandbox: &sandbox,
        };

        let ok = dispatcher
            .dispatch(&ToolCallRequest::new("1", "echo", r#"{"text": "hi"}"#), &ctx)
            .await;
        assert_eq!(ok, DispatchOutcome::Completed("hi".into()));

        let unknown = dispatcher
            .dispatch(&ToolCallRequest::new("2", "nope", "{}"), &ctx)
            .await;
        assert_eq!(unknown, DispatchOutcome::Failed(ToolFailure::UnknownTool("nope".into())));

        let invalid = dispatcher
            .dispatch(&ToolCallRequest::new("3", "echo", "{}"), &ctx)
            .await;
        assert!(matches!(invalid, DispatchOutcome::Failed(ToolFailure::Validation(_))));

        let failed = dispatcher
            .dispatch(&ToolCallRequest::new("4", "broken", "{}"), &ctx)
            .await;
        assert_eq!(failed.tool_content(), "Error: service down");

        sandbox.release().await;
    }
}
