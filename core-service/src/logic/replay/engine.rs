//! Threat Replay Engine
//!
//! One execution algorithm for scenario and historical replay:
//! tag the event, snapshot counters, run the chain, snapshot again, score the
//! impact, compare against expectations and derive learning hints.
//!
//! Safe mode runs on [`DefensePipeline::sandbox`]; the live pipeline is only
//! read. The run itself is a spawned task so a panic inside the chain
//! becomes a failed execution instead of tearing down the caller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logic::config::RuntimeConfig;
use crate::logic::detector::SignalType;
use crate::logic::events::{GiftCardEvent, ReplayMarker};
use crate::logic::pipeline::{DefensePipeline, EventRecord, EventSeed, PipelineCounters, PipelineOutcome};
use crate::logic::response::ActionKind;
use super::scenarios;
use super::types::{LearningData, ReplayComparison, ReplayExecution, ReplayScenario, ReplayStatus};

/// Fraud score floor change suggested for runs with missed detections
const MISSED_DETECTION_ADJUSTMENT: i32 = -5;

/// Fraud score floor change suggested for runs that over-responded
const OVER_RESPONSE_ADJUSTMENT: i32 = 5;

/// What a run is compared against
#[derive(Debug, Clone, Default)]
struct Expectation {
    outcomes: Vec<String>,
    baseline_score: u8,
}

enum ReplaySource {
    Scenario(String),
    Historical(String),
}

pub struct ThreatReplayEngine {
    pipeline: Arc<DefensePipeline>,
}

impl ThreatReplayEngine {
    pub fn new(pipeline: Arc<DefensePipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<DefensePipeline> {
        &self.pipeline
    }

    /// Replay a scenario. Always yields a record; check `status`.
    pub async fn replay_scenario(&self, scenario: &ReplayScenario, safe_mode: bool) -> ReplayExecution {
        let execution_id = Uuid::new_v4().to_string();
        let source = ReplaySource::Scenario(scenario.id.clone());

        if let Err(e) = scenario.validate() {
            log::error!("Replay {} rejected: {}", execution_id, e);
            return failed_execution(execution_id, source, safe_mode, Utc::now(), Instant::now(), e.to_string());
        }

        let marker = ReplayMarker {
            execution_id: execution_id.clone(),
            safe_mode,
            source: scenario.id.clone(),
        };
        let (event, seed) = scenarios::build_event(scenario, marker);
        let expectation = Expectation {
            outcomes: scenario.expected_outcomes.clone(),
            baseline_score: scenario.simulate_score.unwrap_or(0),
        };

        self.run(execution_id, source, event, seed, expectation, safe_mode).await
    }

    /// Resubmit a recorded live event. Always yields a record; check `status`.
    pub async fn replay_historical(&self, record: &EventRecord, safe_mode: bool) -> ReplayExecution {
        let execution_id = Uuid::new_v4().to_string();
        let marker = ReplayMarker {
            execution_id: execution_id.clone(),
            safe_mode,
            source: record.id.clone(),
        };
        let event = record.event.tagged_for_replay(marker);

        let mut outcomes: Vec<String> = record.signal_types.iter().map(|t| t.as_str().to_string()).collect();
        outcomes.extend(record.actions.iter().map(|a| a.as_str().to_string()));
        let expectation = Expectation {
            outcomes,
            baseline_score: record.max_score,
        };

        self.run(
            execution_id,
            ReplaySource::Historical(record.id.clone()),
            event,
            EventSeed::default(),
            expectation,
            safe_mode,
        )
        .await
    }

    async fn run(
        &self,
        execution_id: String,
        source: ReplaySource,
        event: GiftCardEvent,
        seed: EventSeed,
        expectation: Expectation,
        safe_mode: bool,
    ) -> ReplayExecution {
        let triggered_at = Utc::now();
        let started = Instant::now();
        log::info!(
            "Replay {} started ({}, safe_mode={})",
            execution_id,
            source.describe(),
            safe_mode
        );

        let target = if safe_mode {
            Arc::new(self.pipeline.sandbox())
        } else {
            self.pipeline.clone()
        };

        let before = target.counters();
        let runner = target.clone();
        let replay_event = event.clone();
        let task = tokio::spawn(async move { runner.process_event(&replay_event, &seed).await });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = format!("pipeline task failed: {}", e);
                log::error!("Replay {} failed: {}", execution_id, reason);
                return failed_execution(execution_id, source, safe_mode, triggered_at, started, reason);
            }
        };
        let after = target.counters();

        let config = target.config().snapshot();
        let impact_score = impact_score(&before, &after);
        let comparison = compare(&expectation, &outcome);
        let learning_data = derive_learning_data(&config, &event, &outcome, &comparison);
        let status = if outcome.responses.iter().all(|r| r.success) {
            ReplayStatus::Success
        } else {
            ReplayStatus::Partial
        };

        let (scenario_id, source_event_id) = source.ids();
        let execution = ReplayExecution {
            id: execution_id,
            scenario_id,
            source_event_id,
            triggered_at,
            completed_at: Utc::now(),
            safe_mode,
            impact_score,
            signals_generated: outcome.signals.len() as u32,
            threats_logged: outcome.threats.len() as u32,
            responses_triggered: outcome.responses.len() as u32,
            max_score: outcome.max_score(),
            comparison,
            learning_data,
            processing_time_ms: started.elapsed().as_millis() as u64,
            status,
            error: None,
        };

        log::info!(
            "Replay {} finished: status={} impact={} signals={} responses={} missed={:?}",
            execution.id,
            execution.status.as_str(),
            execution.impact_score,
            execution.signals_generated,
            execution.responses_triggered,
            execution.comparison.missed_detections
        );
        execution
    }
}

impl ReplaySource {
    fn describe(&self) -> String {
        match self {
            ReplaySource::Scenario(id) => format!("scenario {}", id),
            ReplaySource::Historical(id) => format!("event {}", id),
        }
    }

    fn ids(self) -> (Option<String>, Option<String>) {
        match self {
            ReplaySource::Scenario(id) => (Some(id), None),
            ReplaySource::Historical(id) => (None, Some(id)),
        }
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// min(100, 10 * signals + 15 * blocked IPs + 20 * flagged merchants + 5 * threats)
pub fn impact_score(before: &PipelineCounters, after: &PipelineCounters) -> u8 {
    let new_signals = after.signals.saturating_sub(before.signals);
    let new_threats = after.threats.saturating_sub(before.threats);
    let new_blocked = after.blocked_ips.saturating_sub(before.blocked_ips) as u64;
    let new_flagged = after.flagged_merchants.saturating_sub(before.flagged_merchants) as u64;

    (10 * new_signals + 15 * new_blocked + 20 * new_flagged + 5 * new_threats).min(100) as u8
}

fn normalize(outcome: &str) -> String {
    outcome.trim().to_lowercase().replace('_', "-")
}

fn compare(expectation: &Expectation, outcome: &PipelineOutcome) -> ReplayComparison {
    let mut observed: BTreeSet<String> = outcome
        .signals
        .iter()
        .map(|s| s.signal_type.as_str().to_string())
        .collect();
    observed.extend(outcome.action_kinds().iter().map(|a| a.as_str().to_string()));

    let mut expected: Vec<String> = Vec::new();
    for item in expectation.outcomes.iter().map(|o| normalize(o)) {
        if !expected.contains(&item) {
            expected.push(item);
        }
    }

    let missed_detections = expected.iter().filter(|e| !observed.contains(*e)).cloned().collect();
    let new_detections = observed.iter().filter(|o| !expected.contains(*o)).cloned().collect();

    let expected_actions = expectation
        .outcomes
        .iter()
        .filter(|o| ActionKind::parse(o).is_some())
        .count() as i64;
    let actual_actions = outcome.action_kinds().len() as i64;

    ReplayComparison {
        score_delta: outcome.max_score() as i32 - expectation.baseline_score as i32,
        missed_detections,
        new_detections,
        response_variance: (expected_actions - actual_actions).unsigned_abs() as u32,
    }
}

fn derive_learning_data(
    config: &RuntimeConfig,
    event: &GiftCardEvent,
    outcome: &PipelineOutcome,
    comparison: &ReplayComparison,
) -> LearningData {
    let high_risk_geo = outcome.threats.iter().any(|t| t.risk_score >= config.thresholds.geo_risk);
    let vpn_or_proxy = outcome.threats.iter().any(|t| t.is_anonymized());
    let high_amount = event.amount_cents().is_some_and(|a| a > config.thresholds.amount_cents);

    let mut countries: Vec<String> = outcome.threats.iter().map(|t| t.location.country.clone()).collect();
    countries.sort();
    countries.dedup();

    let suggested_threshold_adjustment = if !comparison.missed_detections.is_empty() {
        Some(MISSED_DETECTION_ADJUSTMENT)
    } else if !comparison.new_detections.is_empty() && comparison.response_variance > 0 {
        Some(OVER_RESPONSE_ADJUSTMENT)
    } else {
        None
    };

    let top_signal: Option<SignalType> = outcome
        .signals
        .iter()
        .max_by_key(|s| s.score)
        .map(|s| s.signal_type);
    let pattern = if vpn_or_proxy {
        "anonymized-access".to_string()
    } else if high_risk_geo {
        "high-risk-geo".to_string()
    } else if high_amount {
        "high-value".to_string()
    } else if let Some(signal_type) = top_signal {
        signal_type.as_str().to_string()
    } else {
        "baseline".to_string()
    };

    LearningData {
        suggested_threshold_adjustment,
        pattern,
        high_risk_geo,
        vpn_or_proxy,
        high_amount,
        countries,
        max_risk_score: outcome.threats.iter().map(|t| t.risk_score).max().unwrap_or(0),
    }
}

fn failed_execution(
    id: String,
    source: ReplaySource,
    safe_mode: bool,
    triggered_at: DateTime<Utc>,
    started: Instant,
    reason: String,
) -> ReplayExecution {
    let (scenario_id, source_event_id) = source.ids();
    ReplayExecution {
        id,
        scenario_id,
        source_event_id,
        triggered_at,
        completed_at: Utc::now(),
        safe_mode,
        impact_score: 0,
        signals_generated: 0,
        threats_logged: 0,
        responses_triggered: 0,
        max_score: 0,
        comparison: ReplayComparison::default(),
        learning_data: LearningData::default(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        status: ReplayStatus::Failed,
        error: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_score_formula() {
        let before = PipelineCounters::default();
        let after = PipelineCounters { signals: 2, threats: 1, blocked_ips: 1, flagged_merchants: 1 };
        // 20 + 15 + 20 + 5
        assert_eq!(impact_score(&before, &after), 60);

        let after = PipelineCounters { signals: 9, threats: 3, blocked_ips: 2, flagged_merchants: 1 };
        assert_eq!(impact_score(&before, &after), 100);
    }

    #[test]
    fn test_compare_expected_outcomes() {
        let expectation = Expectation {
            outcomes: vec!["large_amount".to_string(), "block-ip".to_string(), "send-alert".to_string()],
            baseline_score: 80,
        };
        let outcome = PipelineOutcome::default();
        let comparison = compare(&expectation, &outcome);

        assert_eq!(comparison.score_delta, -80);
        assert_eq!(comparison.missed_detections, vec!["large-amount", "block-ip", "send-alert"]);
        assert!(comparison.new_detections.is_empty());
        assert_eq!(comparison.response_variance, 2);
    }
}
