//! Research Agent Loop Integration Tests
//!
//! Drives the full DECIDE/ACT/DRAFT/CRITIQUE loop with scripted components.

mod common;

use common::{build_agent, fast_config, lookup, ScriptedCritic, ScriptedPlanner};
use research_agent::agent::{
    Decision, ResearchAgent, ResearchRequest, Tool, ToolCall, ToolOutput, ToolRegistry, ToolSchema,
};
use research_agent::config::AgentConfig;
use research_agent::error::{AgentError, ConfigError, ProviderError, UnknownTool};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn agent_with(confidences: &[f64]) -> (ResearchAgent, Arc<ScriptedPlanner>, Arc<ScriptedCritic>) {
    let planner = Arc::new(ScriptedPlanner::no_tools());
    let critic = Arc::new(ScriptedCritic::new(confidences));
    let agent = build_agent(planner.clone(), critic.clone(), fast_config());
    (agent, planner, critic)
}

#[tokio::test]
async fn test_retries_until_accepted() {
    let (agent, planner, critic) = agent_with(&[0.4, 0.6, 0.9]);

    let outcome = assert_ok!(agent.run("what is rust", 5, None).await);
    assert!(outcome.accepted);
    assert_eq!(outcome.attempts_used, 3);
    assert_eq!(outcome.final_answer, "answer 3");
    assert!((outcome.confidence - 0.9).abs() < 1e-9);

    let logged: Vec<f64> = outcome.reflection_log.iter().map(|e| e.confidence).collect();
    assert_eq!(logged, vec![0.4, 0.6, 0.9]);
    assert_eq!(planner.calls(), 3);
    assert_eq!(critic.calls(), 3);
}

#[tokio::test]
async fn test_exhaustion_returns_best_draft() {
    let (agent, _, _) = agent_with(&[0.4, 0.5, 0.3]);

    let outcome = assert_ok!(agent.run("what is rust", 5, None).await);
    assert!(!outcome.accepted);
    assert_eq!(outcome.attempts_used, 3);
    assert_eq!(outcome.final_answer, "answer 2");
    assert!((outcome.confidence - 0.5).abs() < 1e-9);
    assert_eq!(outcome.reflection_log.len(), 3);
}

#[tokio::test]
async fn test_tie_keeps_earliest_draft() {
    let (agent, _, _) = agent_with(&[0.5, 0.5, 0.2]);

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(!outcome.accepted);
    assert_eq!(outcome.final_answer, "answer 1");
}

#[tokio::test]
async fn test_accepts_first_attempt() {
    let (agent, planner, _) = agent_with(&[0.95]);

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(outcome.accepted);
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(outcome.final_answer, "answer 1");
    assert_eq!(planner.calls(), 1);
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let (agent, _, _) = agent_with(&[0.7]);

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(outcome.accepted);
    assert_eq!(outcome.attempts_used, 1);
}

#[tokio::test]
async fn test_feedback_reaches_next_attempt() {
    let (agent, planner, _) = agent_with(&[0.4, 0.9]);

    assert_ok!(agent.run("q", 5, None).await);
    let feedback = planner.feedback_seen();
    assert_eq!(feedback.len(), 2);
    assert!(feedback[0].is_empty());
    assert!(feedback[1].contains("claim from draft 1"));
    assert!(feedback[1].contains("no supporting source"));
}

#[tokio::test]
async fn test_attempts_never_exceed_budget() {
    let planner = Arc::new(ScriptedPlanner::no_tools());
    let critic = Arc::new(ScriptedCritic::new(&[0.1]));
    let config = AgentConfig {
        max_attempts: 2,
        ..fast_config()
    };
    let agent = build_agent(planner.clone(), critic.clone(), config);

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(!outcome.accepted);
    assert_eq!(outcome.attempts_used, 2);
    assert_eq!(critic.calls(), 2);
    assert_eq!(planner.calls(), 2);
}

#[test]
fn test_rejects_unusable_config() {
    for config in [
        AgentConfig {
            max_attempts: 0,
            ..fast_config()
        },
        AgentConfig {
            confidence_threshold: 1.5,
            ..fast_config()
        },
        AgentConfig {
            confidence_threshold: f64::NAN,
            ..fast_config()
        },
    ] {
        let result = ResearchAgent::new(
            Arc::new(ScriptedPlanner::no_tools()),
            Arc::new(common::CountingGenerator::default()),
            Arc::new(ScriptedCritic::new(&[0.1])),
            Arc::new(common::test_registry()),
            config,
        );
        assert!(matches!(
            result,
            Err(ConfigError::NonPositive { .. } | ConfigError::OutOfRange { .. })
        ));
    }
}

#[tokio::test]
async fn test_single_attempt_budget() {
    let config = AgentConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let critic = Arc::new(ScriptedCritic::new(&[0.1]));
    let agent = build_agent(Arc::new(ScriptedPlanner::no_tools()), critic.clone(), config);

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(!outcome.accepted);
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(critic.calls(), 1);
}

#[tokio::test]
async fn test_evidence_deduplicated_by_source() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Decision::Invoke(vec![
        lookup("a", 0.3),
        lookup("a", 0.8),
        lookup("b", 0.5),
    ])]));
    let critic = Arc::new(ScriptedCritic::new(&[0.9]));
    let agent = build_agent(planner, critic.clone(), fast_config());

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert_eq!(outcome.sources, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(outcome.tools_used, vec!["lookup".to_string()]);

    let evidence = critic.last_evidence().unwrap();
    assert_eq!(evidence.len(), 2);
    assert!((evidence.get("a").unwrap().relevance - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_evidence_accumulates_across_attempts() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        Decision::Invoke(vec![lookup("a", 0.9)]),
        Decision::Invoke(vec![lookup("a", 0.2), lookup("c", 0.4)]),
    ]));
    let critic = Arc::new(ScriptedCritic::new(&[0.3, 0.8]));
    let agent = build_agent(planner, critic.clone(), fast_config());

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert_eq!(outcome.attempts_used, 2);
    assert_eq!(outcome.sources, vec!["a".to_string(), "c".to_string()]);
    let evidence = critic.last_evidence().unwrap();
    assert!((evidence.get("a").unwrap().relevance - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_tool_failures_do_not_abort() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Decision::Invoke(vec![
        ToolCall::new("broken", Value::Null),
        ToolCall::new("panics", Value::Null),
        lookup("a", 0.6),
    ])]));
    let critic = Arc::new(ScriptedCritic::new(&[0.9]));
    let agent = build_agent(planner, critic, fast_config());

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(outcome.accepted);
    assert_eq!(outcome.sources, vec!["a".to_string()]);
    assert_eq!(outcome.tools_used.len(), 3);

    let failures = outcome
        .trace
        .iter()
        .filter(|s| s.step == "tool_failed")
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_tool_timeout_is_absorbed() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Decision::Invoke(vec![
        ToolCall::new("slow", Value::Null),
        lookup("a", 0.6),
    ])]));
    let critic = Arc::new(ScriptedCritic::new(&[0.9]));

    let registry = common::test_registry().with_timeout(Duration::from_millis(50));
    let agent = ResearchAgent::new(
        planner,
        Arc::new(common::CountingGenerator::default()),
        critic,
        Arc::new(registry),
        fast_config(),
    )
    .unwrap();

    let outcome = assert_ok!(agent.run("q", 5, None).await);
    assert!(outcome.accepted);
    assert_eq!(outcome.sources, vec!["a".to_string()]);
    let timed_out = outcome
        .trace
        .iter()
        .find(|s| s.step == "tool_failed")
        .unwrap();
    assert_eq!(timed_out.details["error"]["kind"], "timeout");
}

#[tokio::test]
async fn test_unknown_tool_has_no_side_effects() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    let counter = invoked.clone();
    registry.register(Tool::new(
        ToolSchema::new("count", "Counts invocations"),
        move |_args: Value| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolOutput::content_only(json!({ "ok": true })))
            }
        },
    ));

    let planner = Arc::new(ScriptedPlanner::new(vec![Decision::Invoke(vec![
        ToolCall::new("count", Value::Null),
        ToolCall::new("no_such_tool", Value::Null),
    ])]));
    let agent = ResearchAgent::new(
        planner,
        Arc::new(common::CountingGenerator::default()),
        Arc::new(ScriptedCritic::new(&[0.9])),
        Arc::new(registry),
        fast_config(),
    )
    .unwrap();

    let err = assert_err!(agent.run("q", 5, Some("c-1")).await);
    match err {
        AgentError::UnknownTool(UnknownTool(name)) => assert_eq!(name, "no_such_tool"),
        other => panic!("expected UnknownTool, got {:?}", other),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(agent.memory().turns("c-1").is_empty());
    assert_eq!(agent.stats().snapshot().failed, 1);
}

#[tokio::test]
async fn test_generator_failure_is_surfaced() {
    let agent = ResearchAgent::new(
        Arc::new(ScriptedPlanner::no_tools()),
        Arc::new(common::FailingGenerator),
        Arc::new(ScriptedCritic::new(&[0.9])),
        Arc::new(common::test_registry()),
        fast_config(),
    )
    .unwrap();

    let err = assert_err!(agent.run("q", 5, None).await);
    assert!(matches!(
        err,
        AgentError::ProviderUnavailable(ProviderError::Status { status: 503, .. })
    ));
    let stats = agent.stats().snapshot();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.accepted, 0);
}

#[tokio::test]
async fn test_provider_timeout_is_surfaced() {
    let critic = Arc::new(ScriptedCritic::new(&[0.9]).with_delay(Duration::from_secs(10)));
    let config = AgentConfig {
        provider_timeout: Duration::from_millis(50),
        ..AgentConfig::default()
    };
    let agent = build_agent(Arc::new(ScriptedPlanner::no_tools()), critic, config);

    let err = assert_err!(agent.run("q", 5, None).await);
    match err {
        AgentError::ProviderUnavailable(ProviderError::Timeout { provider, .. }) => {
            assert_eq!(provider, "critic")
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (agent, planner, _) = agent_with(&[0.9]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(
        agent
            .run_with(&ResearchRequest::new("q"), &cancel, None)
            .await
    );
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(planner.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_during_tools() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Decision::Invoke(vec![
        ToolCall::new("slow", Value::Null),
    ])]));
    let critic = Arc::new(ScriptedCritic::new(&[0.9]));
    let agent = build_agent(planner, critic.clone(), fast_config());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        agent.run_with(&ResearchRequest::new("q"), &cancel, None),
    )
    .await
    .expect("cancellation should stop the run promptly");

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert_eq!(critic.calls(), 0);
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let (agent, planner, _) = agent_with(&[0.9]);

    for request in [
        ResearchRequest::new("   "),
        ResearchRequest::new("q").with_max_results(0),
        ResearchRequest::new("q").with_max_results(51),
        ResearchRequest::new("q").with_conversation(""),
    ] {
        let err = assert_err!(
            agent
                .run_with(&request, &CancellationToken::new(), None)
                .await
        );
        assert!(matches!(err, AgentError::InvalidRequest(_)), "{:?}", request);
    }
    assert_eq!(planner.calls(), 0);
    assert_eq!(agent.stats().snapshot().total_requests, 0);
}

#[tokio::test]
async fn test_conversation_history_is_recorded_and_used() {
    let (agent, planner, _) = agent_with(&[0.9]);

    assert_ok!(agent.run("first question", 5, Some("conv")).await);
    assert_ok!(agent.run("follow up", 5, Some("conv")).await);

    let turns = agent.memory().turns("conv");
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].text, "first question");
    assert_eq!(turns[1].text, "answer 1");
    assert_eq!(planner.history_seen(), vec![0, 2]);
}

#[tokio::test]
async fn test_stats_recorded() {
    let (agent, _, _) = agent_with(&[0.4, 0.9]);

    assert_ok!(agent.run("q", 5, None).await);
    let stats = agent.stats().snapshot();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.not_accepted, 0);
    assert!((stats.average_attempts - 2.0).abs() < 1e-9);
    assert_eq!(stats.confidence_histogram[9], 1);
    assert_eq!(stats.confidence_histogram.iter().sum::<u64>(), 1);
}

#[tokio::test]
async fn test_progress_mirrors_trace() {
    let (agent, _, _) = agent_with(&[0.5, 0.9]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = assert_ok!(
        agent
            .run_with(&ResearchRequest::new("q"), &CancellationToken::new(), Some(tx))
            .await
    );

    let mut streamed = Vec::new();
    while let Ok(step) = rx.try_recv() {
        streamed.push(step.step);
    }
    let traced: Vec<String> = outcome.trace.iter().map(|s| s.step.clone()).collect();
    assert_eq!(streamed, traced);
    assert_eq!(streamed.first().map(String::as_str), Some("workflow_start"));
    assert_eq!(streamed.last().map(String::as_str), Some("workflow_complete"));
    assert!(streamed.iter().any(|s| s == "retry"));
    assert!(streamed.iter().any(|s| s == "accepted"));
}
