//! Auto-Responder Module
//!
//! Reacts to fraud signals and threat locations with configurable rules:
//! IP blocking, merchant flagging, alerting and human escalation.
//!
//! # Components
//! - `types.rs`: ResponseRule, RuleCondition, RuleActions, AutoResponse
//! - `rules.rs`: Baseline rule set and condition evaluation
//! - `state.rs`: Blocked IPs, flagged merchants, escalations
//! - `engine.rs`: `AutoResponder` (evaluation, action execution, rule CRUD)

pub mod types;
pub mod rules;
pub mod state;
pub mod engine;


pub use types::{
    ActionError, ActionKind, AutoResponse, Escalation, ExecutedAction, ResponseRule, ResponseStats,
    RuleActions, RuleCondition, RuleUpdate, ScoreSource, ThreatFlag,
};
pub use rules::{default_rules, HIGH_RISK_COUNTRIES};
pub use state::{ProtectiveCounts, ProtectiveState};
pub use engine::AutoResponder;
