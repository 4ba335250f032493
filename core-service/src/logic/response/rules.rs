//! Response Rules
//!
//! Built-in baseline rules and condition evaluation.

use std::collections::BTreeSet;

use crate::logic::detector::{FraudSignal, SignalType};
use crate::logic::geo::ThreatLocation;
use super::types::{ResponseRule, RuleActions, RuleCondition, ScoreSource, ThreatFlag};

// ============================================================================
// BUILT-IN RULES
// ============================================================================

/// Countries treated as high risk by the baseline geo rule
pub const HIGH_RISK_COUNTRIES: [&str; 5] = ["RU", "CN", "NG", "KP", "IR"];

/// Baseline rule set installed at start-up
pub fn default_rules() -> Vec<ResponseRule> {
    vec![
        ResponseRule::new(
            "critical-fraud-block",
            "Critical Fraud Auto-Block",
            vec![RuleCondition::fraud_score(95)],
            RuleActions {
                block_ip: true,
                flag_merchant: true,
                send_alert: true,
                escalate_to_human: true,
                custom_message: Some("Critical fraud score, source blocked".to_string()),
            },
        ),
        ResponseRule::new(
            "high-risk-geo",
            "High-Risk Geography",
            vec![
                RuleCondition::countries(&HIGH_RISK_COUNTRIES),
                RuleCondition::risk_score(80),
            ],
            RuleActions {
                block_ip: true,
                send_alert: true,
                ..Default::default()
            },
        ),
        ResponseRule::new(
            "anonymizer-traffic",
            "VPN Traffic With Fraud Signals",
            vec![
                RuleCondition::Flag { flag: ThreatFlag::Vpn },
                RuleCondition::fraud_score(85),
            ],
            RuleActions {
                flag_merchant: true,
                send_alert: true,
                ..Default::default()
            },
        ),
        ResponseRule::new(
            "proxy-velocity",
            "Proxy Velocity Abuse",
            vec![
                RuleCondition::Flag { flag: ThreatFlag::Proxy },
                RuleCondition::types(&[SignalType::HighFrequencyLoad, SignalType::RapidRedemption]),
            ],
            RuleActions {
                block_ip: true,
                escalate_to_human: true,
                ..Default::default()
            },
        ),
        ResponseRule::new(
            "large-amount-review",
            "Large Amount Review",
            vec![
                RuleCondition::types(&[SignalType::LargeAmount]),
                RuleCondition::fraud_score(85),
            ],
            RuleActions {
                send_alert: true,
                escalate_to_human: true,
                ..Default::default()
            },
        ),
    ]
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Signals and threats that satisfied at least one condition of a rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleMatch {
    pub signals: BTreeSet<usize>,
    pub threats: BTreeSet<usize>,
}

impl RuleMatch {
    /// Highest score across matched signals and threats
    pub fn max_score(&self, signals: &[FraudSignal], threats: &[ThreatLocation]) -> u8 {
        let signal_max = self.signals.iter().filter_map(|&i| signals.get(i)).map(|s| s.score);
        let threat_max = self.threats.iter().filter_map(|&i| threats.get(i)).map(|t| t.risk_score);
        signal_max.chain(threat_max).max().unwrap_or(0)
    }
}

/// Evaluate a rule's conjunction. Every present condition must be met by at
/// least one signal or threat; a rule without conditions matches everything.
pub fn evaluate(rule: &ResponseRule, signals: &[FraudSignal], threats: &[ThreatLocation]) -> Option<RuleMatch> {
    let mut matched = RuleMatch::default();

    if rule.conditions.is_empty() {
        matched.signals = (0..signals.len()).collect();
        matched.threats = (0..threats.len()).collect();
        return Some(matched);
    }

    for condition in &rule.conditions {
        let (sig_hits, threat_hits) = condition_hits(condition, signals, threats);
        if sig_hits.is_empty() && threat_hits.is_empty() {
            return None;
        }
        matched.signals.extend(sig_hits);
        matched.threats.extend(threat_hits);
    }
    Some(matched)
}

fn condition_hits(
    condition: &RuleCondition,
    signals: &[FraudSignal],
    threats: &[ThreatLocation],
) -> (Vec<usize>, Vec<usize>) {
    match condition {
        RuleCondition::ScoreThreshold { source: ScoreSource::Fraud, min } => {
            (positions(signals, |s| s.score >= *min), Vec::new())
        }
        RuleCondition::ScoreThreshold { source: ScoreSource::Risk, min } => {
            (Vec::new(), positions(threats, |t| t.risk_score >= *min))
        }
        RuleCondition::TypeMembership { types } => {
            (positions(signals, |s| types.contains(&s.signal_type)), Vec::new())
        }
        RuleCondition::CountryMembership { countries } => (
            Vec::new(),
            positions(threats, |t| countries.contains(&t.location.country.to_uppercase())),
        ),
        RuleCondition::Flag { flag } => {
            let hits = match flag {
                ThreatFlag::Vpn => positions(threats, |t| t.is_vpn),
                ThreatFlag::Proxy => positions(threats, |t| t.is_proxy),
                ThreatFlag::Tor => positions(threats, |t| t.is_tor),
            };
            (Vec::new(), hits)
        }
    }
}

fn positions<T>(items: &[T], pred: impl Fn(&T) -> bool) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| pred(item))
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::geo::{GeoLocation, ThreatType};
    use crate::logic::severity::Severity;
    use chrono::Utc;

    fn signal(signal_type: SignalType, score: u8) -> FraudSignal {
        FraudSignal::new(signal_type, score, Severity::from_score(score), "test".into(), None, None, "evt")
    }

    fn threat(country: &str, risk: u8, vpn: bool) -> ThreatLocation {
        ThreatLocation {
            id: "t".into(),
            ip: "198.51.100.1".into(),
            location: GeoLocation {
                country: country.into(),
                region: String::new(),
                city: String::new(),
                coordinates: (0.0, 0.0),
                isp: String::new(),
            },
            risk_score: risk,
            is_vpn: vpn,
            is_proxy: false,
            is_tor: false,
            threat_type: ThreatType::classify(risk, vpn, false, false),
            timestamp: Utc::now(),
            related_signal_id: None,
        }
    }

    fn rule(id: &str) -> ResponseRule {
        default_rules().into_iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_five_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.enabled && r.trigger_count == 0));
    }

    #[test]
    fn test_conjunction_is_existential() {
        // Country met by one threat, risk met by another: still a match
        let threats = vec![threat("RU", 50, false), threat("US", 90, false)];
        let m = evaluate(&rule("high-risk-geo"), &[], &threats).unwrap();
        assert_eq!(m.threats.len(), 2);
        assert_eq!(m.max_score(&[], &threats), 90);
    }

    #[test]
    fn test_missing_condition_blocks_match() {
        let signals = vec![signal(SignalType::LargeAmount, 90)];
        assert!(evaluate(&rule("anonymizer-traffic"), &signals, &[threat("US", 20, false)]).is_none());
        assert!(evaluate(&rule("anonymizer-traffic"), &signals, &[threat("US", 20, true)]).is_some());
    }

    #[test]
    fn test_empty_conditions_match_everything() {
        let open = ResponseRule::new("open", "Open", Vec::new(), RuleActions::default());
        let signals = vec![signal(SignalType::RapidCreation, 72)];
        let m = evaluate(&open, &signals, &[]).unwrap();
        assert_eq!(m.max_score(&signals, &[]), 72);
    }

    #[test]
    fn test_max_score_only_counts_matched() {
        let signals = vec![signal(SignalType::LargeAmount, 88), signal(SignalType::HighFrequencyLoad, 100)];
        let m = evaluate(&rule("large-amount-review"), &signals, &[]).unwrap();
        // The 100 load signal satisfies fraud >= 85 too
        assert_eq!(m.max_score(&signals, &[]), 100);

        let only_type = ResponseRule::new("t", "t", vec![RuleCondition::types(&[SignalType::LargeAmount])], RuleActions::default());
        let m = evaluate(&only_type, &signals, &[]).unwrap();
        assert_eq!(m.max_score(&signals, &[]), 88);
    }
}
