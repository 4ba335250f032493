//! Learning integration tests

use std::sync::Arc;

use super::*;
use crate::logic::config::ConfigHandle;
use crate::logic::error::DefenseError;
use crate::logic::events::{ActivityKind, GiftCardEvent};
use crate::logic::pipeline::{DefensePipeline, EventSeed};
use crate::logic::replay::{ReplayScenario, ReplayService};

struct Fixture {
    pipeline: Arc<DefensePipeline>,
    replay: Arc<ReplayService>,
    learning: LearningEngine,
}

fn fixture() -> Fixture {
    let pipeline = Arc::new(DefensePipeline::new(ConfigHandle::default()));
    let replay = Arc::new(ReplayService::new(pipeline.clone()));
    let learning = LearningEngine::new(&pipeline, replay.clone());
    Fixture { pipeline, replay, learning }
}

fn scenario(id: &str, expected: &[&str]) -> ReplayScenario {
    ReplayScenario {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        merchant_id: Some("M-learn".to_string()),
        geo_location: None,
        transaction_amount: Some(1_000),
        simulate_score: None,
        fraud_type: None,
        expected_outcomes: expected.iter().map(|s| s.to_string()).collect(),
    }
}

/// Five quiet runs, `missed` of which expected a detection that never fires
async fn seed_runs(replay: &ReplayService, missed: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..5 {
        let expected: &[&str] = if i < missed { &["rapid-creation"] } else { &[] };
        let execution = replay
            .execute_custom(&scenario(&format!("run-{}", i), expected), true)
            .await
            .unwrap();
        ids.push(execution.id);
    }
    ids
}

#[tokio::test]
async fn test_missed_detections_produce_threshold_rule() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;

    let session = f.learning.run_training_session(None, false).unwrap();
    assert_eq!(session.executions_analyzed, 5);

    let rules = f.learning.learning_rules(None);
    let threshold = rules
        .iter()
        .find(|r| r.category == LearningCategory::Threshold)
        .expect("threshold rule");
    assert!(threshold.confidence >= 0.5);
    assert_eq!(threshold.status, LearningStatus::Pending);
    assert!(session.rules_applied.is_empty());
}

#[tokio::test]
async fn test_auto_apply_lowers_fraud_threshold() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;
    let before = f.pipeline.config().read(|c| c.thresholds.fraud_score);

    let session = f.learning.run_training_session(None, true).unwrap();

    // confidence 0.9 >= 0.85
    assert!(!session.rules_applied.is_empty());
    assert_eq!(session.status, TrainingStatus::Completed);
    assert!(session.completed_at.is_some());
    assert!(session.improvements.detection_accuracy > 0.0);
    assert_eq!(f.pipeline.config().read(|c| c.thresholds.fraud_score), before - 5);
    assert_eq!(f.learning.learning_rules(Some(LearningStatus::Applied)).len(), session.rules_applied.len());
}

#[tokio::test]
async fn test_applied_threshold_rule_changes_response() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;
    f.learning.run_training_session(None, false).unwrap();

    // $600 load scores 80, under the large-amount rule minimum of 85
    let large_load = |card: &str| {
        GiftCardEvent::activity(
            "gift_card.activity.created",
            Some("M-learn"),
            Some(card),
            ActivityKind::Load,
            Some(60_000),
            Some("L1"),
        )
    };
    let review_fired = |outcome: &crate::logic::pipeline::PipelineOutcome| {
        outcome.responses.iter().any(|r| r.rule_id == "large-amount-review")
    };

    let before = f.pipeline.process_event(&large_load("C-600-a"), &EventSeed::default()).await;
    assert_eq!(before.max_score(), 80);
    assert!(!review_fired(&before));

    let rule = f
        .learning
        .learning_rules(Some(LearningStatus::Pending))
        .into_iter()
        .find(|r| r.category == LearningCategory::Threshold)
        .expect("threshold rule");
    assert_eq!(f.learning.apply_learning_rule(&rule.id).unwrap().status, LearningStatus::Applied);

    let after = f.pipeline.process_event(&large_load("C-600-b"), &EventSeed::default()).await;
    assert_eq!(after.max_score(), 80);
    assert!(review_fired(&after));
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;
    f.learning.run_training_session(None, false).unwrap();
    let rule = f.learning.learning_rules(Some(LearningStatus::Pending))[0].clone();
    let before = f.pipeline.config().read(|c| c.thresholds.fraud_score);

    let first = f.learning.apply_learning_rule(&rule.id).unwrap();
    let after_first = f.pipeline.config().read(|c| c.thresholds.fraud_score);
    let second = f.learning.apply_learning_rule(&rule.id).unwrap();

    assert_eq!(first.status, LearningStatus::Applied);
    assert_eq!(second.status, LearningStatus::Applied);
    assert_eq!(first.resolved_at, second.resolved_at);
    assert_eq!(after_first, before - 5);
    assert_eq!(f.pipeline.config().read(|c| c.thresholds.fraud_score), after_first);
}

#[tokio::test]
async fn test_handler_failure_rejects_rule() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;
    f.pipeline.config().update(|c| c.thresholds.fraud_score = 50);
    for id in ["critical-fraud-block", "anonymizer-traffic", "large-amount-review"] {
        f.pipeline.responder().delete_rule(id).unwrap();
    }
    f.learning.run_training_session(None, false).unwrap();

    let rule = f.learning.learning_rules(Some(LearningStatus::Pending))[0].clone();
    let result = f.learning.apply_learning_rule(&rule.id).unwrap();

    assert_eq!(result.status, LearningStatus::Rejected);
    assert!(result.outcome.unwrap().contains("floor"));
    // Terminal: a later apply does not revive it
    let again = f.learning.apply_learning_rule(&rule.id).unwrap();
    assert_eq!(again.status, LearningStatus::Rejected);
}

#[tokio::test]
async fn test_no_training_data() {
    let f = fixture();
    assert!(matches!(
        f.learning.run_training_session(None, true),
        Err(DefenseError::NoTrainingData)
    ));
    assert!(matches!(
        f.learning.run_training_session(Some(&["missing".to_string()]), true),
        Err(DefenseError::ReplayNotFound(_))
    ));
    let sessions = f.learning.sessions(10);
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.status == TrainingStatus::Failed && s.error.is_some()));
}

#[tokio::test]
async fn test_learning_disabled_never_auto_applies() {
    let f = fixture();
    seed_runs(&f.replay, 3).await;
    f.learning.set_learning_enabled(false);

    let session = f.learning.run_training_session(None, true).unwrap();

    assert!(!session.rules_generated.is_empty());
    assert!(session.rules_applied.is_empty());
    assert_eq!(f.learning.stats().applied, 0);
    assert!(!f.learning.stats().learning_enabled);
}

#[tokio::test]
async fn test_named_replay_ids() {
    let f = fixture();
    let ids = seed_runs(&f.replay, 0).await;

    let session = f.learning.run_training_session(Some(&ids[..2]), false).unwrap();
    assert_eq!(session.executions_analyzed, 2);
    assert!(session.rules_generated.is_empty());
}

#[tokio::test]
async fn test_manual_rejection() {
    let f = fixture();
    seed_runs(&f.replay, 2).await;
    f.learning.run_training_session(None, false).unwrap();
    let rule = f.learning.learning_rules(Some(LearningStatus::Pending))[0].clone();

    let rejected = f.learning.reject_learning_rule(&rule.id, "not now").unwrap();
    assert_eq!(rejected.status, LearningStatus::Rejected);
    assert_eq!(f.learning.apply_learning_rule(&rule.id).unwrap().status, LearningStatus::Rejected);
    assert!(matches!(
        f.learning.apply_learning_rule("nope"),
        Err(DefenseError::LearningRuleNotFound(_))
    ));
}

#[tokio::test]
async fn test_geo_regression_expands_coverage() {
    let f = fixture();
    for _ in 0..2 {
        f.replay.execute_scenario("offshore-vpn-merchant", true).await.unwrap();
    }
    let session = f.learning.run_training_session(None, false).unwrap();

    let geo = f
        .learning
        .learning_rules(Some(LearningStatus::Pending))
        .into_iter()
        .find(|r| r.category == LearningCategory::Pattern)
        .expect("pattern rule");
    assert!(session.rules_generated.contains(&geo.id));
    assert_eq!(f.learning.apply_learning_rule(&geo.id).unwrap().status, LearningStatus::Applied);
}

#[tokio::test]
async fn test_scheduled_training_is_single_flight() {
    let f = fixture();
    seed_runs(&f.replay, 0).await;

    let guard = f.learning.training.try_start().unwrap();
    assert!(matches!(
        f.learning.run_scheduled_training().await,
        Err(DefenseError::JobAlreadyRunning(_))
    ));
    drop(guard);

    assert!(f.learning.run_scheduled_training().await.is_ok());
    assert_eq!(f.learning.training_status().runs, 2);
}
