//! Response Types
//!
//! Rules, conditions, actions and the records the auto-responder produces.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::detector::SignalType;

// ============================================================================
// CONDITIONS
// ============================================================================

/// Which score a threshold condition reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Fraud signal score
    Fraud,
    /// Threat location risk score
    Risk,
}

/// Anonymizer flag on a threat location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatFlag {
    Vpn,
    Proxy,
    Tor,
}

impl ThreatFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatFlag::Vpn => "vpn",
            ThreatFlag::Proxy => "proxy",
            ThreatFlag::Tor => "tor",
        }
    }
}

/// One predicate of a rule. A rule's conditions form a conjunction; each
/// must be satisfied by at least one signal or threat in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    ScoreThreshold { source: ScoreSource, min: u8 },
    TypeMembership { types: BTreeSet<SignalType> },
    CountryMembership { countries: BTreeSet<String> },
    Flag { flag: ThreatFlag },
}

impl RuleCondition {
    pub fn fraud_score(min: u8) -> Self {
        RuleCondition::ScoreThreshold { source: ScoreSource::Fraud, min }
    }

    pub fn risk_score(min: u8) -> Self {
        RuleCondition::ScoreThreshold { source: ScoreSource::Risk, min }
    }

    pub fn types(types: &[SignalType]) -> Self {
        RuleCondition::TypeMembership { types: types.iter().copied().collect() }
    }

    pub fn countries(countries: &[&str]) -> Self {
        RuleCondition::CountryMembership {
            countries: countries.iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RuleCondition::ScoreThreshold { source: ScoreSource::Fraud, min } => {
                format!("fraud score >= {}", min)
            }
            RuleCondition::ScoreThreshold { source: ScoreSource::Risk, min } => {
                format!("risk score >= {}", min)
            }
            RuleCondition::TypeMembership { types } => format!(
                "signal type in [{}]",
                types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
            ),
            RuleCondition::CountryMembership { countries } => format!(
                "country in [{}]",
                countries.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            RuleCondition::Flag { flag } => format!("{} detected", flag.as_str()),
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Actions a rule performs when it fires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleActions {
    pub block_ip: bool,
    pub flag_merchant: bool,
    pub send_alert: bool,
    pub escalate_to_human: bool,
    pub custom_message: Option<String>,
}

impl RuleActions {
    pub fn is_empty(&self) -> bool {
        !(self.block_ip || self.flag_merchant || self.send_alert || self.escalate_to_human)
    }

    /// Configured action kinds, in execution order
    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds = Vec::new();
        if self.block_ip {
            kinds.push(ActionKind::BlockIp);
        }
        if self.flag_merchant {
            kinds.push(ActionKind::FlagMerchant);
        }
        if self.send_alert {
            kinds.push(ActionKind::SendAlert);
        }
        if self.escalate_to_human {
            kinds.push(ActionKind::EscalateToHuman);
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    BlockIp,
    FlagMerchant,
    SendAlert,
    EscalateToHuman,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::BlockIp => "block-ip",
            ActionKind::FlagMerchant => "flag-merchant",
            ActionKind::SendAlert => "send-alert",
            ActionKind::EscalateToHuman => "escalate-to-human",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        [
            ActionKind::BlockIp,
            ActionKind::FlagMerchant,
            ActionKind::SendAlert,
            ActionKind::EscalateToHuman,
        ]
        .into_iter()
        .find(|k| k.as_str() == normalized)
    }
}

/// One action that was carried out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub kind: ActionKind,
    pub description: String,
}

/// Failure inside a single action
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionError {
    #[error("event carries no merchant id to flag")]
    MissingMerchant,

    #[error("alert not delivered: {0}")]
    AlertUndelivered(String),
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub conditions: Vec<RuleCondition>,
    pub actions: RuleActions,
    pub trigger_count: u64,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl ResponseRule {
    pub fn new(id: &str, name: &str, conditions: Vec<RuleCondition>, actions: RuleActions) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            enabled: true,
            conditions,
            actions,
            trigger_count: 0,
            last_triggered_at: None,
        }
    }
}

/// Partial update for an existing rule; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<RuleActions>,
}

// ============================================================================
// RECORDS
// ============================================================================

/// One firing of one rule. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResponse {
    pub id: String,
    pub rule_id: String,
    pub triggered_at: DateTime<Utc>,
    /// Id of the event that triggered the rule
    pub trigger_event: String,
    pub actions_executed: Vec<ExecutedAction>,
    pub success: bool,
    pub message: String,
}

impl AutoResponse {
    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.actions_executed.iter().map(|a| a.kind).collect()
    }
}

/// Marker for out-of-band human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub rule_id: String,
    pub event_id: String,
    pub merchant_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub total_responses: usize,
    pub successful_responses: usize,
    pub failed_responses: usize,
    pub blocked_ips: usize,
    pub flagged_merchants: usize,
    pub escalations: usize,
    pub triggers_by_rule: HashMap<String, u64>,
}
