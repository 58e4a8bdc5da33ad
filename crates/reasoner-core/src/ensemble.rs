//! Ensemble Coordination
//!
//! Fans a task out to several independent sessions ("agents") under a worker
//! ceiling, then fans in through one more session ("coordinator") whose task
//! carries every agent's answer. Agents share nothing but the [`Engine`];
//! each gets its own conversation, step counter and sandbox.
//!
//! A failed agent is reported as failed, both to the caller and in the
//! coordinator's task text, never as an empty answer.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{EngineError, Result};
use crate::provider::{DEFAULT_API_URL, GenerationOptions};
use crate::session::{Engine, SessionOutcome, TaskRequest};
use crate::tool::Credentials;

/// One ensemble participant
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

impl AgentConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: Some(api_key.into()),
            api_url: default_api_url(),
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Generation options: per-agent overrides on top of shared defaults
    pub fn options(&self, defaults: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Shared ensemble parameters
#[derive(Clone, Debug)]
pub struct EnsembleConfig {
    /// Maximum number of agent sessions running at once
    pub max_workers: usize,

    /// Step budget for each agent
    pub agent_max_steps: Option<u32>,

    /// Step budget for the coordinator
    pub coordinator_max_steps: Option<u32>,

    /// Include per-agent detail in the outcome
    pub return_reasoning: bool,

    /// Defaults for temperature, top_p and max_tokens; `model` is ignored
    pub defaults: GenerationOptions,

    pub wolfram_app_id: Option<String>,
    pub chain_store_api_key: Option<String>,

    /// Persist each session's conversation
    pub log_conversations: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            agent_max_steps: Some(10),
            coordinator_max_steps: Some(5),
            return_reasoning: false,
            defaults: GenerationOptions::default(),
            wolfram_app_id: None,
            chain_store_api_key: None,
            log_conversations: false,
        }
    }
}

/// How one agent's session ended
#[derive(Debug)]
pub enum AgentOutcome {
    Succeeded(SessionOutcome),
    Failed(EngineError),
}

impl AgentOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// One agent's configuration and result
#[derive(Debug)]
pub struct AgentReport {
    pub config: AgentConfig,
    pub outcome: AgentOutcome,
}

/// Result of an ensemble run
#[derive(Debug)]
pub struct EnsembleOutcome {
    /// Coordinator's final answer
    pub answer: Option<String>,

    /// Coordinator session
    pub coordinator: SessionOutcome,

    /// Per-agent detail, when `return_reasoning` was set
    pub agents: Option<Vec<AgentReport>>,
}

/// Runs ensembles on top of an [`Engine`]
#[derive(Clone, Copy)]
pub struct Ensemble<'a> {
    engine: &'a Engine,
}

impl<'a> Ensemble<'a> {
    pub const fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Run every agent, then the coordinator over their answers
    pub async fn run(
        &self,
        task: &str,
        agents: Vec<AgentConfig>,
        coordinator: AgentConfig,
        config: &EnsembleConfig,
    ) -> Result<EnsembleOutcome> {
        if agents.is_empty() {
            return Err(EngineError::Config("Ensemble needs at least one agent".into()));
        }

        let workers = config.max_workers.max(1);
        tracing::info!(agents = agents.len(), workers, "Starting ensemble");

        let reports = self.run_agents(task, agents, workers, config).await;

        let succeeded = reports.iter().filter(|r| r.outcome.is_success()).count();
        tracing::info!(succeeded, failed = reports.len() - succeeded, "Agents finished");
        if succeeded == 0 {
            return Err(EngineError::AllAgentsFailed {
                count: reports.len(),
                summary: failure_summary(&reports),
            });
        }

        let request = self
            .request_for(&coordinator, coordinator_task(task, &reports), config)
            .options(coordinator.options(&config.defaults));
        let request = TaskRequest {
            max_steps: config.coordinator_max_steps,
            ..request
        };

        tracing::info!(model = %coordinator.model, "Starting coordinator");
        let outcome = self.engine.run(request).await?;

        Ok(EnsembleOutcome {
            answer: outcome.answer.clone(),
            coordinator: outcome,
            agents: config.return_reasoning.then_some(reports),
        })
    }

    async fn run_agents(
        &self,
        task: &str,
        agents: Vec<AgentConfig>,
        workers: usize,
        config: &EnsembleConfig,
    ) -> Vec<AgentReport> {
        let semaphore = Semaphore::new(workers);

        let runs = agents.into_iter().enumerate().map(|(index, agent)| {
            let semaphore = &semaphore;
            async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => {
                        let request = TaskRequest {
                            max_steps: config.agent_max_steps,
                            ..self
                                .request_for(&agent, task.to_string(), config)
                                .options(agent.options(&config.defaults))
                        };
                        match self.engine.run(request).await {
                            Ok(outcome) => AgentOutcome::Succeeded(outcome),
                            Err(e) => {
                                tracing::warn!(agent = index + 1, model = %agent.model, error = %e, "Agent failed");
                                AgentOutcome::Failed(e)
                            }
                        }
                    }
                    Err(e) => AgentOutcome::Failed(EngineError::Other(e.to_string())),
                };
                AgentReport {
                    config: agent,
                    outcome,
                }
            }
        });

        join_all(runs).await
    }

    fn request_for(&self, agent: &AgentConfig, task: String, config: &EnsembleConfig) -> TaskRequest {
        let credentials = Credentials {
            api_key: agent.api_key.clone(),
            wolfram_app_id: config.wolfram_app_id.clone(),
            chain_store_api_key: config.chain_store_api_key.clone(),
        };
        TaskRequest::new(task, credentials)
            .api_url(&agent.api_url)
            .log_conversation(config.log_conversations)
    }
}

fn failure_summary(reports: &[AgentReport]) -> String {
    reports
        .iter()
        .enumerate()
        .filter_map(|(i, r)| match &r.outcome {
            AgentOutcome::Failed(e) => Some(format!("agent {} ({}): {e}", i + 1, r.config.model)),
            AgentOutcome::Succeeded(_) => None,
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Task text for the coordinator session
pub fn coordinator_task(task: &str, reports: &[AgentReport]) -> String {
    let mut text = format!("<ORIGINAL_TASK>\n{task}\n\n<AGENT_RESPONSES>\n");

    for (i, report) in reports.iter().enumerate() {
        let n = i + 1;
        let model = &report.config.model;
        match &report.outcome {
            AgentOutcome::Succeeded(outcome) => {
                let answer = outcome.answer.as_deref().unwrap_or("(no answer returned)");
                text.push_str(&format!("Agent {n} ({model}):\n{answer}\n\n"));
            }
            AgentOutcome::Failed(e) => {
                text.push_str(&format!("Agent {n} ({model}) FAILED and produced no answer: {e}\n\n"));
            }
        }
    }

    text.push_str(
        "<INSTRUCTIONS>\n\
         Several independent agents attempted the ORIGINAL_TASK; their responses are above. \
         Compare them, resolve any disagreements (use your tools to verify where useful), \
         and produce the best complete answer to the ORIGINAL_TASK. \
         Failed agents are not evidence for or against any answer.",
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Conversation;

    fn succeeded(answer: &str) -> AgentOutcome {
        AgentOutcome::Succeeded(SessionOutcome {
            session_id: uuid::Uuid::new_v4(),
            answer: Some(answer.into()),
            conversation: Conversation::new(),
            tools: vec![],
            steps: 1,
            budget_exceeded: false,
        })
    }

    #[test]
    fn test_agent_options_override_defaults() {
        let mut agent = AgentConfig::new("m1", "sk");
        agent.temperature = Some(0.2);
        let defaults = GenerationOptions {
            max_tokens: 500,
            ..Default::default()
        };

        let opts = agent.options(&defaults);
        assert_eq!(opts.model, "m1");
        assert!((opts.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 500);
    }

    #[test]
    fn test_coordinator_task_names_failures() {
        let reports = vec![
            AgentReport {
                config: AgentConfig::new("alpha", "sk"),
                outcome: succeeded("42"),
            },
            AgentReport {
                config: AgentConfig::new("beta", "sk"),
                outcome: AgentOutcome::Failed(EngineError::Timeout(60)),
            },
        ];

        let text = coordinator_task("meaning of life", &reports);
        assert!(text.starts_with("<ORIGINAL_TASK>\nmeaning of life\n\n<AGENT_RESPONSES>\n"));
        assert!(text.contains("Agent 1 (alpha):\n42\n"));
        assert!(text.contains("Agent 2 (beta) FAILED"));
        assert_eq!(failure_summary(&reports), "agent 2 (beta): Completion request timed out after 60 seconds");
    }

    #[test]
    fn test_agent_config_deserializes_with_defaults() {
        let agent: AgentConfig =
            serde_json::from_str(r#"{"model": "m", "api_key": "sk"}"#).unwrap();
        assert_eq!(agent.api_url, DEFAULT_API_URL);
        assert!(agent.temperature.is_none());
    }
}
