//! Severity Levels
//!
//! One score → severity mapping shared by the detector, the rule engine
//! and the alert dispatcher. Nothing else may bucket scores.

use serde::{Deserialize, Serialize};

/// Score at or above which severity is critical
pub const CRITICAL_SCORE: u8 = 95;
/// Score at or above which severity is high
pub const HIGH_SCORE: u8 = 85;
/// Score at or above which severity is medium
pub const MEDIUM_SCORE: u8 = 70;

/// Four-level severity bucket derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(score: u8) -> Self {
        if score >= CRITICAL_SCORE {
            Severity::Critical
        } else if score >= HIGH_SCORE {
            Severity::High
        } else if score >= MEDIUM_SCORE {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Bracketed label used in alert titles
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "[LOW]",
            Severity::Medium => "[MEDIUM]",
            Severity::High => "[HIGH]",
            Severity::Critical => "[CRITICAL]",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Severity::Low => "#2ecc71",
            Severity::Medium => "#f1c40f",
            Severity::High => "#e67e22",
            Severity::Critical => "#e74c3c",
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn is_critical(&self) -> bool {
        *self == Severity::Critical
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
