//! Learning Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LEARNING RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCategory {
    Threshold,
    Pattern,
    Response,
    Performance,
}

impl LearningCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningCategory::Threshold => "threshold",
            LearningCategory::Pattern => "pattern",
            LearningCategory::Response => "response",
            LearningCategory::Performance => "performance",
        }
    }
}

/// pending -> applied | rejected; both outcomes are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    Pending,
    Applied,
    Rejected,
}

impl LearningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStatus::Pending => "pending",
            LearningStatus::Applied => "applied",
            LearningStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LearningStatus::Pending)
    }
}

/// Concrete configuration change carried by a learning rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigAdjustment {
    /// Lower the detector floor and every rule fraud-score minimum
    LowerFraudScoreThreshold { by: u8 },
    /// Look back over fewer events per analysis
    ShrinkDetectionWindow { to: usize },
    /// Re-enable every disabled response rule
    EnableDisabledRules,
    /// Add countries to every country-membership condition
    ExpandGeoCoverage { countries: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRule {
    pub id: String,
    pub name: String,
    /// Natural-language trigger that produced the rule
    pub condition: String,
    pub recommendation: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub category: LearningCategory,
    pub status: LearningStatus,
    pub adjustment: ConfigAdjustment,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// What applying did, or why it was rejected
    pub outcome: Option<String>,
}

// ============================================================================
// TRAINING SESSIONS
// ============================================================================

/// Rough per-category gain estimates (percent), capped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImprovementEstimates {
    pub detection_accuracy: f64,
    pub response_time: f64,
    pub false_positive_reduction: f64,
    pub coverage: f64,
}

impl ImprovementEstimates {
    /// Per-rule gain ceiling for each category
    const CAP: f64 = 25.0;

    /// Credit one applied rule to its category
    pub fn record(&mut self, category: LearningCategory, confidence: f64) {
        let (slot, weight) = match category {
            LearningCategory::Threshold => (&mut self.detection_accuracy, 10.0),
            LearningCategory::Performance => (&mut self.response_time, 15.0),
            LearningCategory::Response => (&mut self.false_positive_reduction, 8.0),
            LearningCategory::Pattern => (&mut self.coverage, 12.0),
        };
        *slot = (*slot + confidence * weight).min(Self::CAP);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Running,
    Completed,
    /// No usable replay data; nothing was analyzed
    Failed,
}

/// One training run. Rule fields hold learning rule ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub executions_analyzed: usize,
    pub auto_apply: bool,
    pub rules_generated: Vec<String>,
    pub rules_applied: Vec<String>,
    pub rules_rejected: Vec<String>,
    pub improvements: ImprovementEstimates,
    pub status: TrainingStatus,
    pub error: Option<String>,
}

impl TrainingSession {
    pub fn start(auto_apply: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            executions_analyzed: 0,
            auto_apply,
            rules_generated: Vec::new(),
            rules_applied: Vec::new(),
            rules_rejected: Vec::new(),
            improvements: ImprovementEstimates::default(),
            status: TrainingStatus::Running,
            error: None,
        }
    }

    pub fn finish(&mut self, status: TrainingStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_rules: usize,
    pub pending: usize,
    pub applied: usize,
    pub rejected: usize,
    pub sessions: usize,
    pub average_confidence: f64,
    pub learning_enabled: bool,
}
