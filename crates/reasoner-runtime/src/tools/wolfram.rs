//! Wolfram Alpha Tool
//!
//! Precise mathematical, scientific and factual computation through the
//! Wolfram Alpha query API. Only catalogued for sessions that carry a
//! `wolfram_app_id`.

use std::time::Duration;

use async_trait::async_trait;
use reasoner_core::tool::{CredentialKind, Tool, ToolContext, ToolFailure, ToolGuide, ToolSpec};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Wolfram Alpha full-results endpoint
pub const DEFAULT_WOLFRAM_URL: &str = "https://api.wolframalpha.com/v2/query";

const DEFAULT_MAX_WIDTH: u64 = 1000;

#[derive(Deserialize)]
struct QueryResponse {
    queryresult: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    pods: Vec<Pod>,
}

#[derive(Deserialize)]
struct Pod {
    title: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    subpods: Vec<Subpod>,
}

#[derive(Deserialize)]
struct Subpod {
    #[serde(default)]
    plaintext: Option<String>,
}

/// Queries Wolfram Alpha
#[derive(Clone, Debug)]
pub struct WolframTool {
    client: reqwest::Client,
    base_url: String,
}

impl WolframTool {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_WOLFRAM_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn query(
        &self,
        app_id: &str,
        query: &str,
        include_pods: &[String],
        max_width: u64,
    ) -> anyhow::Result<QueryResult> {
        let mut params: Vec<(&str, String)> = vec![
            ("input", query.to_string()),
            ("appid", app_id.to_string()),
            ("output", "json".into()),
            ("format", "plaintext".into()),
            ("width", max_width.to_string()),
        ];
        params.extend(include_pods.iter().map(|pod| ("includepodid", pod.clone())));

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let body: QueryResponse = response.json().await?;
        Ok(body.queryresult)
    }
}

/// Render pods as "Title: text" lines
fn render_pods(result: &QueryResult) -> String {
    result
        .pods
        .iter()
        .filter_map(|pod| {
            let text: Vec<&str> = pod
                .subpods
                .iter()
                .filter_map(|s| s.plaintext.as_deref())
                .filter(|t| !t.trim().is_empty())
                .collect();
            (!text.is_empty()).then(|| format!("{}: {}", pod.title, text.join("\n")))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WolframTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "wolfram",
            "Query Wolfram Alpha for computations, math, science, and knowledge. Great for mathematical analysis, scientific calculations, data analysis, and fact-checking.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The query to send to Wolfram Alpha. Be specific and precise."
                    },
                    "include_pods": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional list of pod names to include (e.g., ['Result', 'Solution', 'Plot']). Leave empty for all pods.",
                        "default": null
                    },
                    "max_width": {
                        "type": "integer",
                        "description": "Maximum width for plots/images",
                        "default": DEFAULT_MAX_WIDTH
                    }
                },
                "required": ["query"]
            }),
        )
    }

    fn guide(&self) -> ToolGuide {
        ToolGuide {
            summary: "Query Wolfram Alpha for precise mathematical, scientific, and factual computations".into(),
            when_to_use: Some(
                "When you need precise mathematical or scientific computations, use the wolfram tool.".into(),
            ),
            guidelines_heading: Some("When using Wolfram Alpha:".into()),
            guidelines: vec![
                "Use for precise mathematical calculations and scientific data".into(),
                "Phrase queries clearly and specifically".into(),
                "Great for unit conversions, equations, and factual data".into(),
            ],
        }
    }

    fn required_credential(&self) -> Option<CredentialKind> {
        Some(CredentialKind::WolframAppId)
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &ToolContext<'_>,
    ) -> Result<Value, ToolFailure> {
        let app_id = ctx
            .credentials
            .get(CredentialKind::WolframAppId)
            .ok_or_else(|| ToolFailure::Execution("Wolfram Alpha app id not provided".into()))?;
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolFailure::Validation("query must be a string".into()))?;
        let include_pods: Vec<String> = arguments
            .get("include_pods")
            .and_then(Value::as_array)
            .map(|pods| pods.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let max_width = arguments
            .get("max_width")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_WIDTH);

        tracing::debug!(%query, pods = include_pods.len(), "Querying Wolfram Alpha");
        let result = self
            .query(app_id, query, &include_pods, max_width)
            .await
            .map_err(|e| ToolFailure::Execution(format!("Wolfram Alpha request failed: {e}")))?;

        if !result.success {
            return Err(ToolFailure::Execution(format!(
                "Wolfram Alpha could not interpret the query: {query}"
            )));
        }

        let text = render_pods(&result);
        if text.is_empty() {
            let pods: Vec<&str> = result.pods.iter().filter_map(|p| p.id.as_deref()).collect();
            return Err(ToolFailure::Execution(format!(
                "Wolfram Alpha returned no text results (pods: {})",
                pods.join(", ")
            )));
        }
        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasoner_core::provider::Endpoint;
    use reasoner_core::sandbox::{DEFAULT_SANDBOX_LIFETIME, SandboxHandle};
    use reasoner_core::testing::RecordingSandboxProvider;
    use reasoner_core::tool::Credentials;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn execute(tool: &WolframTool, credentials: &Credentials, args: Value) -> Result<Value, ToolFailure> {
        let sandboxes = RecordingSandboxProvider::default();
        let sandbox = SandboxHandle::acquire(&sandboxes, uuid::Uuid::new_v4(), DEFAULT_SANDBOX_LIFETIME)
            .await
            .unwrap();
        let endpoint = Endpoint::new("http://localhost", "sk");
        let ctx = ToolContext {
            task: "t",
            model: "m",
            endpoint: &endpoint,
            credentials,
            sandbox: &sandbox,
        };
        tool.execute(args.as_object().cloned().unwrap(), &ctx).await
    }

    #[tokio::test]
    async fn test_query_renders_pods() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("appid", "APPID"))
            .and(query_param("input", "mass of the sun"))
            .and(query_param("includepodid", "Result"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryresult": {
                    "success": true,
                    "pods": [
                        {"title": "Result", "id": "Result", "subpods": [{"plaintext": "1.988×10^30 kg"}]}
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WolframTool::with_base_url(server.uri(), Duration::from_secs(5)).unwrap();
        let credentials = Credentials::new("sk").with_wolfram_app_id("APPID");
        let result = execute(
            &tool,
            &credentials,
            json!({"query": "mass of the sun", "include_pods": ["Result"]}),
        )
        .await
        .unwrap();

        assert_eq!(result, json!("Result: 1.988×10^30 kg"));
    }

    #[tokio::test]
    async fn test_unsuccessful_query_is_tool_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryresult": {"success": false, "pods": []}
            })))
            .mount(&server)
            .await;

        let tool = WolframTool::with_base_url(server.uri(), Duration::from_secs(5)).unwrap();
        let credentials = Credentials::new("sk").with_wolfram_app_id("APPID");
        let err = execute(&tool, &credentials, json!({"query": "asdfgh"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::Execution(msg) if msg.contains("could not interpret")));
    }

    #[test]
    fn test_gated_on_app_id() {
        let tool = WolframTool::new(Duration::from_secs(5)).unwrap();
        assert_eq!(tool.required_credential(), Some(CredentialKind::WolframAppId));
    }
}
