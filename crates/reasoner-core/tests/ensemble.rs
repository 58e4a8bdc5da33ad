//! Ensemble fan-out / fan-in behaviour

use std::sync::Arc;
use std::time::Duration;

use reasoner_core::testing::{EchoTool, FnProvider, RecordingSandboxProvider};
use reasoner_core::{
    AgentConfig, AgentOutcome, AssistantReply, ConversationLogger, Engine, EngineError, Ensemble,
    EnsembleConfig, LogRecord, ToolChoice,
};

fn provider() -> Arc<FnProvider> {
    Arc::new(
        FnProvider::new(|req| {
            let model = &req.options.model;
            if model.starts_with("broken") {
                return Err(EngineError::transport(Some(503), "model unavailable"));
            }
            match req.tool_choice {
                ToolChoice::Auto => Ok(AssistantReply::text("<DONE>")),
                ToolChoice::None => Ok(AssistantReply::text(format!("answer from {model}"))),
            }
        })
        .with_delay(Duration::from_millis(20)),
    )
}

fn engine(provider: &Arc<FnProvider>, sandboxes: &RecordingSandboxProvider) -> Engine {
    Engine::builder()
        .provider(provider.clone())
        .sandboxes(Arc::new(sandboxes.clone()))
        .tool(EchoTool::named("python"))
        .build()
        .unwrap()
}

fn agents(models: &[&str]) -> Vec<AgentConfig> {
    models.iter().map(|m| AgentConfig::new(*m, "sk")).collect()
}

#[tokio::test]
async fn test_worker_bound_and_coordinator_ordering() {
    let provider = provider();
    let sandboxes = RecordingSandboxProvider::default();
    let engine = engine(&provider, &sandboxes);
    let config = EnsembleConfig {
        max_workers: 2,
        return_reasoning: true,
        ..Default::default()
    };

    let outcome = Ensemble::new(&engine)
        .run(
            "2+2",
            agents(&["alpha", "broken-beta", "gamma"]),
            AgentConfig::new("judge", "sk"),
            &config,
        )
        .await
        .unwrap();

    assert_eq!(outcome.answer.as_deref(), Some("answer from judge"));
    assert_eq!(sandboxes.max_live(), 2);
    assert_eq!(sandboxes.created(), 4);
    assert_eq!(sandboxes.closed(), 4);

    let models = provider.models();
    let first_judge = models.iter().position(|m| m == "judge").unwrap();
    let last_agent = models.iter().rposition(|m| m != "judge").unwrap();
    assert!(last_agent < first_judge);

    let reports = outcome.agents.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].config.model, "alpha");
    assert!(matches!(reports[1].outcome, AgentOutcome::Failed(EngineError::Transport { .. })));
    match &reports[2].outcome {
        AgentOutcome::Succeeded(session) => {
            assert_eq!(session.answer.as_deref(), Some("answer from gamma"));
        }
        AgentOutcome::Failed(e) => panic!("gamma failed: {e}"),
    }

    let coordinator_framing = outcome.coordinator.conversation.messages()[0].text().unwrap();
    assert!(coordinator_framing.contains("Agent 1 (alpha):\nanswer from alpha"));
    assert!(coordinator_framing.contains("Agent 2 (broken-beta) FAILED"));
    assert!(coordinator_framing.contains("Agent 3 (gamma):\nanswer from gamma"));
}

#[tokio::test]
async fn test_reasoning_detail_is_optional() {
    let provider = provider();
    let sandboxes = RecordingSandboxProvider::default();
    let engine = engine(&provider, &sandboxes);

    let outcome = Ensemble::new(&engine)
        .run(
            "2+2",
            agents(&["alpha"]),
            AgentConfig::new("judge", "sk"),
            &EnsembleConfig::default(),
        )
        .await
        .unwrap();

    assert!(outcome.agents.is_none());
    assert_eq!(outcome.answer.as_deref(), Some("answer from judge"));
}

#[tokio::test]
async fn test_all_agents_failing_skips_coordinator() {
    let provider = provider();
    let sandboxes = RecordingSandboxProvider::default();
    let engine = engine(&provider, &sandboxes);

    let err = Ensemble::new(&engine)
        .run(
            "2+2",
            agents(&["broken-1", "broken-2"]),
            AgentConfig::new("judge", "sk"),
            &EnsembleConfig::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AllAgentsFailed { count: 2, .. }));
    assert!(!provider.models().iter().any(|m| m == "judge"));
    assert_eq!(sandboxes.live(), 0);
}

#[tokio::test]
async fn test_agent_without_key_fails_alone() {
    let provider = provider();
    let sandboxes = RecordingSandboxProvider::default();
    let engine = engine(&provider, &sandboxes);

    let mut keyless = AgentConfig::new("alpha", "");
    keyless.api_key = None;
    let config = EnsembleConfig {
        return_reasoning: true,
        ..Default::default()
    };

    let outcome = Ensemble::new(&engine)
        .run(
            "2+2",
            vec![keyless, AgentConfig::new("gamma", "sk")],
            AgentConfig::new("judge", "sk"),
            &config,
        )
        .await
        .unwrap();

    let reports = outcome.agents.unwrap();
    assert!(matches!(reports[0].outcome, AgentOutcome::Failed(EngineError::Config(_))));
    assert!(reports[1].outcome.is_success());
}

#[tokio::test]
async fn test_empty_ensemble_rejected() {
    let provider = provider();
    let sandboxes = RecordingSandboxProvider::default();
    let engine = engine(&provider, &sandboxes);

    let err = Ensemble::new(&engine)
        .run("2+2", vec![], AgentConfig::new("judge", "sk"), &EnsembleConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(provider.models().is_empty());
}

#[tokio::test]
async fn test_concurrent_logged_sessions_keep_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FnProvider::new(|req| match req.tool_choice {
        ToolChoice::Auto => Ok(AssistantReply::text("<DONE>")),
        ToolChoice::None => Ok(AssistantReply::text(format!("answer from {}", req.options.model))),
    }));
    let engine = Engine::builder()
        .provider(provider)
        .sandboxes(Arc::new(RecordingSandboxProvider::default()))
        .logger(ConversationLogger::new(dir.path()))
        .build()
        .unwrap();
    let config = EnsembleConfig {
        max_workers: 4,
        log_conversations: true,
        ..Default::default()
    };

    Ensemble::new(&engine)
        .run(
            "2+2",
            agents(&["alpha", "beta", "gamma", "delta"]),
            AgentConfig::new("judge", "sk"),
            &config,
        )
        .await
        .unwrap();

    let mut models: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| {
            let record: LogRecord =
                serde_json::from_slice(&std::fs::read(e.unwrap().path()).unwrap()).unwrap();
            record.model
        })
        .collect();
    models.sort();
    assert_eq!(models, ["alpha", "beta", "delta", "gamma", "judge"]);
}
