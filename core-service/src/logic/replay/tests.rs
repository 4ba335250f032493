//! Replay integration tests

use std::sync::Arc;

use super::*;
use crate::logic::alert::{AlertChannel, AlertDispatcher, RecordingChannel};
use crate::logic::config::ConfigHandle;
use crate::logic::error::DefenseError;
use crate::logic::events::{ActivityKind, GiftCardEvent, LogActivityLogger};
use crate::logic::geo::SyntheticGeoResolver;
use crate::logic::pipeline::{DefensePipeline, EventSeed, GeoSeed};

fn service() -> (ReplayService, Arc<DefensePipeline>, Arc<RecordingChannel>) {
    let config = ConfigHandle::default();
    let recorder = Arc::new(RecordingChannel::new("rec"));
    let channels: Vec<Arc<dyn AlertChannel>> = vec![recorder.clone()];
    let dispatcher = Arc::new(AlertDispatcher::with_channels(config.clone(), channels));
    let pipeline = Arc::new(DefensePipeline::with_parts(
        config,
        Arc::new(SyntheticGeoResolver),
        dispatcher,
        Arc::new(LogActivityLogger),
    ));
    (ReplayService::new(pipeline.clone()), pipeline, recorder)
}

fn custom(id: &str) -> ReplayScenario {
    ReplayScenario {
        id: id.to_string(),
        name: "Custom".to_string(),
        description: String::new(),
        merchant_id: Some("M-custom".to_string()),
        geo_location: None,
        transaction_amount: Some(1_000),
        simulate_score: None,
        fraud_type: None,
        expected_outcomes: Vec::new(),
    }
}

#[tokio::test]
async fn test_safe_mode_never_touches_live_state() {
    let (service, pipeline, recorder) = service();
    let before = pipeline.counters();
    let live_protective = pipeline.responder().state().counts();

    for scenario in service.scenarios() {
        let execution = service.execute_scenario(&scenario.id, true).await.unwrap();
        assert!(execution.safe_mode);
    }

    assert_eq!(pipeline.counters(), before);
    assert_eq!(pipeline.responder().state().counts(), live_protective);
    assert_eq!(recorder.sent_count(), 0);
    assert!(pipeline.recent_events(10).is_empty());
}

#[tokio::test]
async fn test_large_amount_scenario_impact() {
    let (service, _, _) = service();
    let execution = service.execute_scenario("large-amount", true).await.unwrap();

    // 1 signal, 1 threat, 1 blocked IP, 1 flagged merchant
    assert_eq!(execution.impact_score, 50);
    assert_eq!(execution.signals_generated, 1);
    assert_eq!(execution.max_score, 100);
    assert!(execution.comparison.missed_detections.is_empty());
    assert_eq!(execution.status, ReplayStatus::Success);
    assert!(execution.learning_data.high_amount);
}

#[tokio::test]
async fn test_live_mode_commits_actions() {
    let (service, pipeline, recorder) = service();
    let execution = service.execute_scenario("large-amount", false).await.unwrap();

    assert!(!execution.safe_mode);
    assert_eq!(pipeline.counters().blocked_ips, 1);
    assert!(pipeline.responder().state().is_flagged("merchant-replay-2"));
    assert!(recorder.sent_count() > 0);
    // Replay traffic is never recorded as a historical source
    assert!(pipeline.recent_events(10).is_empty());
}

#[tokio::test]
async fn test_missed_detections_suggest_lower_threshold() {
    let (service, _, _) = service();
    let mut scenario = custom("expects-too-much");
    scenario.expected_outcomes = vec!["rapid-creation".to_string(), "block-ip".to_string()];

    let execution = service.execute_custom(&scenario, true).await.unwrap();
    assert_eq!(execution.comparison.missed_detections, vec!["rapid-creation", "block-ip"]);
    assert_eq!(execution.comparison.response_variance, 1);
    assert_eq!(execution.learning_data.suggested_threshold_adjustment, Some(-5));
    assert_eq!(execution.learning_data.pattern, "baseline");
}

#[tokio::test]
async fn test_geo_scenario_learning_hints() {
    let (service, _, _) = service();
    let execution = service.execute_scenario("offshore-vpn-merchant", true).await.unwrap();

    let hints = &execution.learning_data;
    assert!(hints.vpn_or_proxy);
    assert!(hints.high_risk_geo);
    assert_eq!(hints.pattern, "anonymized-access");
    assert_eq!(hints.countries, vec!["RU".to_string()]);
    assert_eq!(hints.max_risk_score, 88);
}

#[tokio::test]
async fn test_invalid_scenario_is_a_failed_execution() {
    let (service, _, _) = service();
    let mut scenario = custom("broken");
    scenario.geo_location = Some(GeoSeed { ip: String::new(), ..Default::default() });

    let err = service.execute_custom(&scenario, true).await.unwrap_err();
    let DefenseError::ReplayFailed { execution_id, reason } = err else {
        panic!("expected ReplayFailed");
    };
    assert!(reason.contains("geo ip"));

    let stored = service.get_execution(&execution_id).unwrap();
    assert_eq!(stored.status, ReplayStatus::Failed);
    assert_eq!(service.stats().failed, 1);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (service, _, _) = service();
    assert!(matches!(
        service.execute_scenario("nope", true).await,
        Err(DefenseError::ScenarioNotFound(_))
    ));
    assert!(matches!(
        service.execute_historical("nope", true).await,
        Err(DefenseError::EventNotFound(_))
    ));
    assert_eq!(service.execution_count(), 0);
}

#[tokio::test]
async fn test_historical_replay_compares_with_record() {
    let (service, pipeline, _) = service();
    let event = GiftCardEvent::activity(
        "gift_card.activity.created",
        Some("M1"),
        Some("C1"),
        ActivityKind::Load,
        Some(120_000),
        Some("L1"),
    );
    pipeline.process_event(&event, &EventSeed::default()).await;
    let before = pipeline.counters();

    let execution = service.execute_historical(&event.id, true).await.unwrap();

    assert_eq!(execution.source_event_id.as_deref(), Some(event.id.as_str()));
    assert!(execution.scenario_id.is_none());
    assert_eq!(execution.comparison.score_delta, 0);
    assert!(execution.comparison.missed_detections.is_empty());
    assert_eq!(pipeline.counters(), before);
}

#[tokio::test]
async fn test_add_scenario_validates() {
    let (service, _, _) = service();
    assert!(service.add_scenario(custom("mine")).is_ok());
    assert!(matches!(service.add_scenario(custom("mine")), Err(DefenseError::InvalidScenario(_))));
    assert_eq!(service.scenarios().len(), 6);
    assert_eq!(service.remove_scenario("mine").unwrap().id, "mine");
}

#[tokio::test]
async fn test_scheduled_regression_is_single_flight() {
    let (service, _, _) = service();
    let (first, second) = tokio::join!(service.run_scheduled_regression(), service.run_scheduled_regression());

    assert_eq!(first.unwrap().len(), 5);
    assert!(matches!(second, Err(DefenseError::JobAlreadyRunning(_))));
    assert_eq!(service.execution_count(), 5);
    assert_eq!(service.stats().safe_mode, 5);
    assert!(!service.regression_status().running);
}

#[tokio::test]
async fn test_regression_sweep_survives_failed_scenario() {
    let (service, _, _) = service();
    let mut broken = custom("broken-geo");
    broken.geo_location = Some(GeoSeed { ip: String::new(), ..Default::default() });
    service.scenarios.write().push(broken);

    let executions = service.run_scheduled_regression().await.unwrap();

    assert_eq!(executions.len(), 6);
    let failed: Vec<_> = executions.iter().filter(|e| e.status == ReplayStatus::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].scenario_id.as_deref(), Some("broken-geo"));
    assert_eq!(service.stats().failed, 1);
    assert_eq!(service.execution_count(), 6);
}

#[tokio::test]
async fn test_replay_retention() {
    let (service, pipeline, _) = service();
    pipeline.config().update(|c| c.replay_retention = 2);
    for _ in 0..4 {
        service.execute_scenario("low-risk-baseline", true).await.unwrap();
    }
    assert_eq!(service.execution_count(), 2);
}
