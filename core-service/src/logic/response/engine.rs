//! Auto-Responder Rule Engine
//!
//! Evaluates every enabled rule against a batch of signals and threats and
//! carries out the matched rule's actions in a fixed order:
//! block IP, flag merchant, send alert, escalate to human.
//!
//! A failing action marks that rule's `AutoResponse` unsuccessful; the
//! remaining actions and rules still run.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::constants::RESPONSE_HISTORY_CAPACITY;
use crate::logic::alert::{AlertDispatcher, AlertPayload};
use crate::logic::detector::FraudSignal;
use crate::logic::error::{DefenseError, DefenseResult};
use crate::logic::events::GiftCardEvent;
use crate::logic::geo::ThreatLocation;
use super::rules::{self, RuleMatch};
use super::state::ProtectiveState;
use super::types::{
    ActionError, ActionKind, AutoResponse, Escalation, ExecutedAction, ResponseRule, ResponseStats,
    RuleCondition, RuleUpdate, ScoreSource,
};

pub struct AutoResponder {
    rules: RwLock<Vec<ResponseRule>>,
    state: ProtectiveState,
    dispatcher: Arc<AlertDispatcher>,
    history: RwLock<VecDeque<AutoResponse>>,
}

impl AutoResponder {
    /// Responder with the five baseline rules
    pub fn new(dispatcher: Arc<AlertDispatcher>) -> Self {
        Self::with_rules(dispatcher, rules::default_rules())
    }

    pub fn with_rules(dispatcher: Arc<AlertDispatcher>, rules: Vec<ResponseRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            state: ProtectiveState::new(),
            dispatcher,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Deep copy of rules and protective state bound to another dispatcher
    pub fn snapshot(&self, dispatcher: Arc<AlertDispatcher>) -> Self {
        Self {
            rules: RwLock::new(self.rules.read().clone()),
            state: self.state.snapshot(),
            dispatcher,
            history: RwLock::new(self.history.read().clone()),
        }
    }

    pub fn state(&self) -> &ProtectiveState {
        &self.state
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    // ========================================================================
    // EVALUATION
    // ========================================================================

    /// Run every enabled rule against one event's signals and threats
    pub async fn process_event(
        &self,
        event: &GiftCardEvent,
        signals: &[FraudSignal],
        threats: &[ThreatLocation],
    ) -> Vec<AutoResponse> {
        if signals.is_empty() && threats.is_empty() {
            return Vec::new();
        }

        let candidates: Vec<ResponseRule> = self.rules.read().iter().filter(|r| r.enabled).cloned().collect();
        let mut responses = Vec::new();

        for rule in candidates {
            let Some(matched) = rules::evaluate(&rule, signals, threats) else {
                continue;
            };

            let response = self.execute(&rule, &matched, event, signals, threats).await;
            self.mark_triggered(&rule.id);

            if response.success {
                log::info!(
                    "Rule '{}' fired on {}: {}",
                    rule.id,
                    event.id,
                    response.message
                );
            } else {
                log::error!("Rule '{}' action failure on {}: {}", rule.id, event.id, response.message);
            }
            responses.push(response);
        }

        if !responses.is_empty() {
            let mut history = self.history.write();
            history.extend(responses.iter().cloned());
            while history.len() > RESPONSE_HISTORY_CAPACITY {
                history.pop_front();
            }
        }
        responses
    }

    async fn execute(
        &self,
        rule: &ResponseRule,
        matched: &RuleMatch,
        event: &GiftCardEvent,
        signals: &[FraudSignal],
        threats: &[ThreatLocation],
    ) -> AutoResponse {
        let mut executed = Vec::new();
        let mut failures: Vec<ActionError> = Vec::new();

        for kind in rule.actions.kinds() {
            let outcome = match kind {
                ActionKind::BlockIp => Ok(self.block_threat_ips(threats)),
                ActionKind::FlagMerchant => self.flag_event_merchant(event),
                ActionKind::SendAlert => self.send_rule_alert(rule, matched, event, signals, threats).await,
                ActionKind::EscalateToHuman => Ok(self.escalate(rule, event)),
            };
            match outcome {
                Ok(description) => executed.push(ExecutedAction { kind, description }),
                Err(e) => failures.push(e),
            }
        }

        let success = failures.is_empty();
        let message = if success {
            rule.actions
                .custom_message
                .clone()
                .unwrap_or_else(|| format!("{} ({} actions)", rule.name, executed.len()))
        } else {
            failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
        };

        AutoResponse {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            triggered_at: Utc::now(),
            trigger_event: event.id.clone(),
            actions_executed: executed,
            success,
            message,
        }
    }

    fn block_threat_ips(&self, threats: &[ThreatLocation]) -> String {
        let mut ips: Vec<&str> = threats.iter().map(|t| t.ip.as_str()).collect();
        ips.sort_unstable();
        ips.dedup();

        for ip in &ips {
            if self.state.block_ip(ip) {
                log::info!("Blocked IP {}", ip);
            }
        }
        if ips.is_empty() {
            "Block IP: no source addresses".to_string()
        } else {
            format!("Block IP {}", ips.join(", "))
        }
    }

    fn flag_event_merchant(&self, event: &GiftCardEvent) -> Result<String, ActionError> {
        let merchant = event.merchant_id.as_deref().ok_or(ActionError::MissingMerchant)?;
        if self.state.flag_merchant(merchant) {
            log::info!("Flagged merchant {}", merchant);
        }
        Ok(format!("Flag merchant {}", merchant))
    }

    async fn send_rule_alert(
        &self,
        rule: &ResponseRule,
        matched: &RuleMatch,
        event: &GiftCardEvent,
        signals: &[FraudSignal],
        threats: &[ThreatLocation],
    ) -> Result<String, ActionError> {
        let score = matched.max_score(signals, threats);
        let message = rule
            .actions
            .custom_message
            .clone()
            .unwrap_or_else(|| format!("Rule '{}' matched event {}", rule.name, event.id));

        let mut payload = AlertPayload::new(&rule.name, &message, score).with_tag("auto-response");
        payload.rule_id = Some(rule.id.clone());
        payload.merchant_id = event.merchant_id.clone();
        if let Some(signal) = matched.signals.iter().next().and_then(|&i| signals.get(i)) {
            payload.signal_id = Some(signal.id.clone());
            payload.card_id = signal.card_id.clone();
        }

        let report = self.dispatcher.dispatch(payload).await;
        if !report.suppressed && !report.results.is_empty() && !report.delivered() {
            return Err(ActionError::AlertUndelivered(report.failed_channels().join(", ")));
        }
        Ok(format!("Send alert (score {})", score))
    }

    fn escalate(&self, rule: &ResponseRule, event: &GiftCardEvent) -> String {
        self.state.escalate(Escalation {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            event_id: event.id.clone(),
            merchant_id: event.merchant_id.clone(),
            reason: rule.name.clone(),
            created_at: Utc::now(),
        });
        format!("Escalate to human review ({})", rule.name)
    }

    fn mark_triggered(&self, rule_id: &str) {
        let mut rules = self.rules.write();
        if let Some(rule) = rules.iter_mut().find(|r| r.id == rule_id) {
            rule.trigger_count += 1;
            rule.last_triggered_at = Some(Utc::now());
        }
    }

    // ========================================================================
    // RULE MANAGEMENT
    // ========================================================================

    pub fn get_rules(&self) -> Vec<ResponseRule> {
        self.rules.read().clone()
    }

    pub fn get_rule(&self, id: &str) -> Option<ResponseRule> {
        self.rules.read().iter().find(|r| r.id == id).cloned()
    }

    /// Add a rule; an empty id gets a generated one
    pub fn add_rule(&self, mut rule: ResponseRule) -> DefenseResult<ResponseRule> {
        if rule.id.trim().is_empty() {
            rule.id = format!("rule-{}", Uuid::new_v4());
        }
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(DefenseError::Config(format!("rule '{}' already exists", rule.id)));
        }
        rule.trigger_count = 0;
        rule.last_triggered_at = None;
        rules.push(rule.clone());
        log::info!("Response rule '{}' added", rule.id);
        Ok(rule)
    }

    pub fn update_rule(&self, id: &str, update: RuleUpdate) -> DefenseResult<ResponseRule> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DefenseError::RuleNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        if let Some(conditions) = update.conditions {
            rule.conditions = conditions;
        }
        if let Some(actions) = update.actions {
            rule.actions = actions;
        }
        log::info!("Response rule '{}' updated", id);
        Ok(rule.clone())
    }

    pub fn delete_rule(&self, id: &str) -> DefenseResult<ResponseRule> {
        let mut rules = self.rules.write();
        let pos = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| DefenseError::RuleNotFound(id.to_string()))?;
        log::info!("Response rule '{}' deleted", id);
        Ok(rules.remove(pos))
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> DefenseResult<ResponseRule> {
        self.update_rule(id, RuleUpdate { enabled: Some(enabled), ..Default::default() })
    }

    /// Enable every disabled rule; returns how many changed
    pub fn enable_all_rules(&self) -> usize {
        let mut rules = self.rules.write();
        let mut changed = 0;
        for rule in rules.iter_mut().filter(|r| !r.enabled) {
            rule.enabled = true;
            changed += 1;
        }
        changed
    }

    /// Add countries to every country condition; returns the rules touched
    pub fn expand_geo_coverage(&self, countries: &[String]) -> usize {
        let mut rules = self.rules.write();
        let mut touched = 0;
        for rule in rules.iter_mut() {
            let mut grew = false;
            for condition in rule.conditions.iter_mut() {
                if let RuleCondition::CountryMembership { countries: set } = condition {
                    for country in countries {
                        grew |= set.insert(country.to_uppercase());
                    }
                }
            }
            if grew {
                touched += 1;
            }
        }
        touched
    }

    /// Lower every fraud-score minimum by `by`, never below `floor`;
    /// returns how many conditions moved
    pub fn lower_fraud_score_minimums(&self, by: u8, floor: u8) -> usize {
        let mut rules = self.rules.write();
        let mut lowered = 0;
        for condition in rules.iter_mut().flat_map(|r| r.conditions.iter_mut()) {
            if let RuleCondition::ScoreThreshold { source: ScoreSource::Fraud, min } = condition {
                let next = min.saturating_sub(by).max(floor);
                if next < *min {
                    *min = next;
                    lowered += 1;
                }
            }
        }
        lowered
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Most recent responses, oldest first
    pub fn response_history(&self, limit: usize) -> Vec<AutoResponse> {
        let history = self.history.read();
        let start = history.len().saturating_sub(limit);
        history.iter().skip(start).cloned().collect()
    }

    pub fn response_count(&self) -> usize {
        self.history.read().len()
    }

    pub fn stats(&self) -> ResponseStats {
        let rules = self.rules.read();
        let history = self.history.read();
        let counts = self.state.counts();
        let successful = history.iter().filter(|r| r.success).count();

        ResponseStats {
            total_rules: rules.len(),
            enabled_rules: rules.iter().filter(|r| r.enabled).count(),
            total_responses: history.len(),
            successful_responses: successful,
            failed_responses: history.len() - successful,
            blocked_ips: counts.blocked_ips,
            flagged_merchants: counts.flagged_merchants,
            escalations: counts.escalations,
            triggers_by_rule: rules
                .iter()
                .map(|r| (r.id.clone(), r.trigger_count))
                .collect::<HashMap<_, _>>(),
        }
    }
}
