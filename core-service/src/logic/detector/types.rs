//! Detector Types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::severity::Severity;

// ============================================================================
// SIGNAL TYPE
// ============================================================================

/// Heuristic that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    HighFrequencyLoad,
    LargeAmount,
    MultiLocationAbuse,
    RapidCreation,
    RapidRedemption,
}

impl SignalType {
    pub const ALL: [SignalType; 5] = [
        SignalType::HighFrequencyLoad,
        SignalType::LargeAmount,
        SignalType::MultiLocationAbuse,
        SignalType::RapidCreation,
        SignalType::RapidRedemption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::HighFrequencyLoad => "high-frequency-load",
            SignalType::LargeAmount => "large-amount",
            SignalType::MultiLocationAbuse => "multi-location-abuse",
            SignalType::RapidCreation => "rapid-creation",
            SignalType::RapidRedemption => "rapid-redemption",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }

    /// Stable position, used for deterministic derivations
    pub fn index(&self) -> u8 {
        match self {
            SignalType::HighFrequencyLoad => 0,
            SignalType::LargeAmount => 1,
            SignalType::MultiLocationAbuse => 2,
            SignalType::RapidCreation => 3,
            SignalType::RapidRedemption => 4,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FRAUD SIGNAL
// ============================================================================

/// A scored, reasoned record from one heuristic. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub id: String,
    pub signal_type: SignalType,
    /// 0 - 100
    pub score: u8,
    pub severity: Severity,
    pub reason: String,
    pub card_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Id of the event that produced the signal
    pub source_event: String,
    /// Produced by replay traffic
    pub replay: bool,
}

impl FraudSignal {
    pub fn new(
        signal_type: SignalType,
        score: u8,
        severity: Severity,
        reason: String,
        card_id: Option<String>,
        amount_cents: Option<i64>,
        source_event: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            signal_type,
            score: score.min(100),
            severity,
            reason,
            card_id,
            amount_cents,
            timestamp: Utc::now(),
            source_event: source_event.to_string(),
            replay: false,
        }
    }

    /// Whether this signal should raise an alert on its own
    pub fn is_alertable(&self, min_score: u8) -> bool {
        self.score >= min_score || self.severity == Severity::Critical
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalStats {
    pub total: usize,
    pub by_type: HashMap<String, usize>,
    pub by_severity: HashMap<String, usize>,
    pub average_score: f64,
    pub critical_count: usize,
}

impl SignalStats {
    pub fn from_signals<'a>(signals: impl IntoIterator<Item = &'a FraudSignal>) -> Self {
        let mut stats = SignalStats::default();
        let mut score_sum = 0u64;

        for signal in signals {
            stats.total += 1;
            score_sum += signal.score as u64;
            *stats.by_type.entry(signal.signal_type.as_str().to_string()).or_insert(0) += 1;
            *stats.by_severity.entry(signal.severity.as_str().to_string()).or_insert(0) += 1;
            if signal.severity == Severity::Critical {
                stats.critical_count += 1;
            }
        }

        if stats.total > 0 {
            stats.average_score = score_sum as f64 / stats.total as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_roundtrip_names() {
        for t in SignalType::ALL {
            assert_eq!(SignalType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SignalType::parse("LARGE_AMOUNT"), Some(SignalType::LargeAmount));
        assert_eq!(SignalType::parse("velocity"), None);
    }

    #[test]
    fn test_score_is_capped() {
        let s = FraudSignal::new(SignalType::LargeAmount, 150, Severity::Critical, "x".into(), None, None, "e");
        assert_eq!(s.score, 100);
    }

    #[test]
    fn test_stats() {
        let signals = vec![
            FraudSignal::new(SignalType::LargeAmount, 80, Severity::Medium, "a".into(), None, None, "e1"),
            FraudSignal::new(SignalType::LargeAmount, 100, Severity::Critical, "b".into(), None, None, "e2"),
        ];
        let stats = SignalStats::from_signals(&signals);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type["large-amount"], 2);
        assert_eq!(stats.critical_count, 1);
        assert_eq!(stats.average_score, 90.0);
    }
}
