//! Replay Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::detector::SignalType;
use crate::logic::error::{DefenseError, DefenseResult};
use crate::logic::pipeline::GeoSeed;

// ============================================================================
// SCENARIOS
// ============================================================================

/// A hypothetical attack to push through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScenario {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub geo_location: Option<GeoSeed>,
    /// Cents
    #[serde(default)]
    pub transaction_amount: Option<i64>,
    /// Injects a signal of `fraud_type` with this score
    #[serde(default)]
    pub simulate_score: Option<u8>,
    #[serde(default)]
    pub fraud_type: Option<SignalType>,
    /// Signal types or action kinds the run should produce
    #[serde(default)]
    pub expected_outcomes: Vec<String>,
}

impl ReplayScenario {
    pub fn validate(&self) -> DefenseResult<()> {
        if self.id.trim().is_empty() {
            return Err(DefenseError::InvalidScenario("id is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(DefenseError::InvalidScenario(format!("{}: name is empty", self.id)));
        }
        if let Some(score) = self.simulate_score {
            if score > 100 {
                return Err(DefenseError::InvalidScenario(format!(
                    "{}: simulate_score {} exceeds 100",
                    self.id, score
                )));
            }
        }
        if let Some(amount) = self.transaction_amount {
            if amount < 0 {
                return Err(DefenseError::InvalidScenario(format!(
                    "{}: negative transaction amount",
                    self.id
                )));
            }
        }
        if let Some(ref geo) = self.geo_location {
            if geo.ip.trim().is_empty() {
                return Err(DefenseError::InvalidScenario(format!("{}: geo ip is empty", self.id)));
            }
            if geo.risk_score.is_some_and(|r| r > 100) {
                return Err(DefenseError::InvalidScenario(format!(
                    "{}: geo risk score exceeds 100",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// EXECUTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Success,
    /// Finished, but at least one auto-response failed
    Partial,
    Failed,
}

impl ReplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayStatus::Success => "success",
            ReplayStatus::Partial => "partial",
            ReplayStatus::Failed => "failed",
        }
    }
}

/// Expected vs. observed outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayComparison {
    pub score_delta: i32,
    /// Expected but absent
    pub missed_detections: Vec<String>,
    /// Present but not expected
    pub new_detections: Vec<String>,
    /// |expected action count - actual action count|
    pub response_variance: u32,
}

/// Hints for the learning engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningData {
    /// Suggested change to the fraud score floor (negative = more sensitive)
    pub suggested_threshold_adjustment: Option<i32>,
    pub pattern: String,
    pub high_risk_geo: bool,
    pub vpn_or_proxy: bool,
    pub high_amount: bool,
    pub countries: Vec<String>,
    pub max_risk_score: u8,
}

/// One replay run. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayExecution {
    pub id: String,
    pub scenario_id: Option<String>,
    /// Original event id for historical replays
    pub source_event_id: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub safe_mode: bool,
    pub impact_score: u8,
    pub signals_generated: u32,
    pub threats_logged: u32,
    pub responses_triggered: u32,
    pub max_score: u8,
    pub comparison: ReplayComparison,
    pub learning_data: LearningData,
    pub processing_time_ms: u64,
    pub status: ReplayStatus,
    pub error: Option<String>,
}

impl ReplayExecution {
    pub fn has_missed_detections(&self) -> bool {
        !self.comparison.missed_detections.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStats {
    pub total: usize,
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    pub safe_mode: usize,
    pub average_impact: f64,
    pub average_processing_ms: f64,
    pub scenarios: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> ReplayScenario {
        ReplayScenario {
            id: "s1".to_string(),
            name: "Scenario".to_string(),
            description: String::new(),
            merchant_id: None,
            geo_location: None,
            transaction_amount: None,
            simulate_score: None,
            fraud_type: None,
            expected_outcomes: Vec::new(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(scenario().validate().is_ok());

        let bad = ReplayScenario { simulate_score: Some(120), ..scenario() };
        assert!(matches!(bad.validate(), Err(DefenseError::InvalidScenario(_))));

        let bad = ReplayScenario { transaction_amount: Some(-1), ..scenario() };
        assert!(bad.validate().is_err());

        let bad = ReplayScenario { id: " ".to_string(), ..scenario() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_scenario_json_defaults() {
        let parsed: ReplayScenario = serde_json::from_value(serde_json::json!({
            "id": "x", "name": "X", "description": "d", "fraud_type": "rapid-redemption"
        }))
        .unwrap();
        assert_eq!(parsed.fraud_type, Some(SignalType::RapidRedemption));
        assert!(parsed.expected_outcomes.is_empty());
    }
}
