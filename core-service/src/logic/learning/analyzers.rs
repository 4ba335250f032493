//! Replay Analyzers
//!
//! Each analyzer inspects aggregate statistics over a batch of replay
//! executions and proposes at most one learning rule when its trigger holds.
//! Analyzers are independent; adding one does not touch the engine.

use std::collections::BTreeSet;

use chrono::Utc;
use uuid::Uuid;

use crate::logic::config::RuntimeConfig;
use crate::logic::replay::ReplayExecution;
use super::types::{ConfigAdjustment, LearningCategory, LearningRule, LearningStatus};

/// Share of runs with missed detections that triggers a threshold rule
const MISSED_RATIO_TRIGGER: f64 = 0.3;

/// Share of runs over the performance budget that triggers a performance rule
const SLOW_RATIO_TRIGGER: f64 = 0.2;

/// Share of runs with response variance that triggers a response rule
const VARIANCE_RATIO_TRIGGER: f64 = 0.3;

/// Share of runs touching high-risk or anonymized locations that triggers a pattern rule
const GEO_RATIO_TRIGGER: f64 = 0.25;

/// Default fraud score step when runs carry no suggestion
const DEFAULT_THRESHOLD_STEP: u8 = 5;

/// Smallest detection window the performance analyzer proposes
const MIN_DETECTION_WINDOW: usize = 10;

// ============================================================================
// ANALYZER TRAIT
// ============================================================================

pub trait ReplayAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, batch: &[ReplayExecution], config: &RuntimeConfig) -> Option<LearningRule>;
}

pub fn default_analyzers() -> Vec<Box<dyn ReplayAnalyzer>> {
    vec![
        Box::new(FraudScoreVarianceAnalyzer),
        Box::new(PerformanceAnalyzer),
        Box::new(ResponseVarianceAnalyzer),
        Box::new(GeoRiskAnalyzer),
    ]
}

fn ratio(batch: &[ReplayExecution], pred: impl Fn(&ReplayExecution) -> bool) -> f64 {
    if batch.is_empty() {
        return 0.0;
    }
    batch.iter().filter(|e| pred(e)).count() as f64 / batch.len() as f64
}

fn propose(
    name: &str,
    condition: String,
    recommendation: String,
    confidence: f64,
    category: LearningCategory,
    adjustment: ConfigAdjustment,
) -> LearningRule {
    LearningRule {
        id: format!("learn-{}", Uuid::new_v4()),
        name: name.to_string(),
        condition,
        recommendation,
        confidence: confidence.clamp(0.0, 1.0),
        category,
        status: LearningStatus::Pending,
        adjustment,
        created_at: Utc::now(),
        resolved_at: None,
        outcome: None,
    }
}

// ============================================================================
// BUILT-IN ANALYZERS
// ============================================================================

/// Too many runs missed what they expected: fraud-score thresholds are too high
pub struct FraudScoreVarianceAnalyzer;

impl ReplayAnalyzer for FraudScoreVarianceAnalyzer {
    fn name(&self) -> &str {
        "fraud-score-variance"
    }

    fn analyze(&self, batch: &[ReplayExecution], config: &RuntimeConfig) -> Option<LearningRule> {
        let missed = ratio(batch, |e| e.has_missed_detections());
        if missed <= MISSED_RATIO_TRIGGER {
            return None;
        }

        let mean_delta = batch
            .iter()
            .map(|e| e.comparison.score_delta.unsigned_abs() as f64)
            .sum::<f64>()
            / batch.len() as f64;

        let suggestions: Vec<u32> = batch
            .iter()
            .filter_map(|e| e.learning_data.suggested_threshold_adjustment)
            .filter(|adj| *adj < 0)
            .map(|adj| adj.unsigned_abs())
            .collect();
        let step = if suggestions.is_empty() {
            DEFAULT_THRESHOLD_STEP
        } else {
            (suggestions.iter().sum::<u32>() / suggestions.len() as u32).clamp(1, 20) as u8
        };

        Some(propose(
            "Lower fraud score threshold",
            format!(
                "{:.0}% of replays missed expected detections (mean score delta {:.1})",
                missed * 100.0,
                mean_delta
            ),
            format!(
                "Lower the fraud score threshold from {} by {}",
                config.thresholds.fraud_score, step
            ),
            (0.5 + missed).min(0.95),
            LearningCategory::Threshold,
            ConfigAdjustment::LowerFraudScoreThreshold { by: step },
        ))
    }
}

/// Runs regularly exceed the processing budget
pub struct PerformanceAnalyzer;

impl ReplayAnalyzer for PerformanceAnalyzer {
    fn name(&self) -> &str {
        "performance"
    }

    fn analyze(&self, batch: &[ReplayExecution], config: &RuntimeConfig) -> Option<LearningRule> {
        let budget = config.performance_budget_ms;
        let slow = ratio(batch, |e| e.processing_time_ms > budget);
        if slow <= SLOW_RATIO_TRIGGER {
            return None;
        }

        let target = (config.detection_window * 3 / 4).max(MIN_DETECTION_WINDOW);
        if target >= config.detection_window {
            return None;
        }

        Some(propose(
            "Shrink detection window",
            format!("{:.0}% of replays exceeded the {}ms budget", slow * 100.0, budget),
            format!(
                "Reduce the detection window from {} to {} events",
                config.detection_window, target
            ),
            (0.4 + slow).min(0.9),
            LearningCategory::Performance,
            ConfigAdjustment::ShrinkDetectionWindow { to: target },
        ))
    }
}

/// Responses diverge from what the runs expected
pub struct ResponseVarianceAnalyzer;

impl ReplayAnalyzer for ResponseVarianceAnalyzer {
    fn name(&self) -> &str {
        "response-variance"
    }

    fn analyze(&self, batch: &[ReplayExecution], _config: &RuntimeConfig) -> Option<LearningRule> {
        let varied = ratio(batch, |e| e.comparison.response_variance > 0);
        if varied <= VARIANCE_RATIO_TRIGGER {
            return None;
        }

        Some(propose(
            "Re-enable response rules",
            format!("{:.0}% of replays triggered a different action set than expected", varied * 100.0),
            "Re-enable disabled response rules so expected actions can fire".to_string(),
            (0.45 + varied / 2.0).min(0.9),
            LearningCategory::Response,
            ConfigAdjustment::EnableDisabledRules,
        ))
    }
}

/// High-risk or anonymized traffic is common in the batch
pub struct GeoRiskAnalyzer;

impl ReplayAnalyzer for GeoRiskAnalyzer {
    fn name(&self) -> &str {
        "geo-risk"
    }

    fn analyze(&self, batch: &[ReplayExecution], _config: &RuntimeConfig) -> Option<LearningRule> {
        let risky = |e: &ReplayExecution| e.learning_data.high_risk_geo || e.learning_data.vpn_or_proxy;
        let share = ratio(batch, risky);
        if share <= GEO_RATIO_TRIGGER {
            return None;
        }

        let countries: BTreeSet<String> = batch
            .iter()
            .filter(|e| risky(e))
            .flat_map(|e| e.learning_data.countries.iter().map(|c| c.to_uppercase()))
            .collect();
        if countries.is_empty() {
            return None;
        }
        let countries: Vec<String> = countries.into_iter().collect();

        Some(propose(
            "Expand geo coverage",
            format!("{:.0}% of replays originated from high-risk or anonymized locations", share * 100.0),
            format!("Add {} to country-based response rules", countries.join(", ")),
            (0.4 + share).min(0.9),
            LearningCategory::Pattern,
            ConfigAdjustment::ExpandGeoCoverage { countries },
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
