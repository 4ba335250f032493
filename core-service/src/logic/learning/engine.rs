//! Defense Learning Engine
//!
//! Turns batches of replay executions into confidence-scored learning rules
//! and applies them to the live detector and rule engine configuration.
//!
//! # Components
//! - Analyzers propose rules (see [`super::analyzers`])
//! - `apply_learning_rule` dispatches a rule's adjustment to its handler
//! - Training sessions record what was generated, applied and estimated

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::constants::DEFAULT_TRAINING_BATCH;
use crate::logic::config::ConfigHandle;
use crate::logic::error::{DefenseError, DefenseResult};
use crate::logic::pipeline::DefensePipeline;
use crate::logic::replay::{ReplayExecution, ReplayService, ReplayStatus};
use crate::logic::response::{AutoResponder, RuleCondition};
use crate::logic::schedule::{JobStatus, PeriodicJob};
use super::analyzers::{default_analyzers, ReplayAnalyzer};
use super::types::{
    ConfigAdjustment, LearningRule, LearningStats, LearningStatus, TrainingSession, TrainingStatus,
};

/// Lowest fraud score floor the engine will move the detector to
const MIN_FRAUD_SCORE_FLOOR: u8 = 50;

/// FIFO cap for training session history
const SESSION_HISTORY_CAPACITY: usize = 100;

pub struct LearningEngine {
    config: ConfigHandle,
    responder: Arc<AutoResponder>,
    replay: Arc<ReplayService>,
    analyzers: Vec<Box<dyn ReplayAnalyzer>>,
    rules: RwLock<Vec<LearningRule>>,
    sessions: RwLock<VecDeque<TrainingSession>>,
    pub(super) training: PeriodicJob,
}

impl LearningEngine {
    /// Adjustments land on the live pipeline's config and responder
    pub fn new(pipeline: &DefensePipeline, replay: Arc<ReplayService>) -> Self {
        Self {
            config: pipeline.config().clone(),
            responder: pipeline.responder().clone(),
            replay,
            analyzers: default_analyzers(),
            rules: RwLock::new(Vec::new()),
            sessions: RwLock::new(VecDeque::new()),
            training: PeriodicJob::new("defense-training"),
        }
    }

    // ========================================================================
    // TRAINING
    // ========================================================================

    /// Analyze the named executions, or the most recent batch when `replay_ids`
    /// is `None`. Fails with `NoTrainingData` when nothing usable is found; the
    /// attempt is still recorded as a failed session.
    pub fn run_training_session(
        &self,
        replay_ids: Option<&[String]>,
        auto_apply: bool,
    ) -> DefenseResult<TrainingSession> {
        let mut session = TrainingSession::start(auto_apply);

        let batch = match self.training_batch(replay_ids) {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Training session {} failed: {}", session.id, e);
                session.error = Some(e.to_string());
                session.finish(TrainingStatus::Failed);
                self.record_session(session);
                return Err(e);
            }
        };
        session.executions_analyzed = batch.len();

        let config = self.config.snapshot();
        let proposals: Vec<LearningRule> = self
            .analyzers
            .iter()
            .filter_map(|analyzer| {
                let rule = analyzer.analyze(&batch, &config)?;
                log::info!(
                    "Analyzer '{}' proposed {} rule '{}' (confidence {:.2}): {}",
                    analyzer.name(),
                    rule.category.as_str(),
                    rule.name,
                    rule.confidence,
                    rule.condition
                );
                Some(rule)
            })
            .collect();
        self.rules.write().extend(proposals.iter().cloned());
        session.rules_generated = proposals.iter().map(|r| r.id.clone()).collect();

        let apply = auto_apply && config.learning_enabled;
        if auto_apply && !config.learning_enabled && !proposals.is_empty() {
            log::info!("Learning mode disabled: {} rules left pending", proposals.len());
        }

        for proposal in &proposals {
            if !apply || proposal.confidence < config.auto_approval_threshold {
                continue;
            }
            match self.apply_learning_rule(&proposal.id) {
                Ok(rule) if rule.status == LearningStatus::Applied => {
                    session.improvements.record(rule.category, rule.confidence);
                    session.rules_applied.push(rule.id);
                }
                Ok(rule) => session.rules_rejected.push(rule.id),
                Err(e) => {
                    log::warn!("Auto-apply of {} failed: {}", proposal.id, e);
                    session.rules_rejected.push(proposal.id.clone());
                }
            }
        }
        session.finish(TrainingStatus::Completed);

        log::info!(
            "Training session {} over {} executions: {} rules generated, {} applied, {} rejected",
            session.id,
            session.executions_analyzed,
            session.rules_generated.len(),
            session.rules_applied.len(),
            session.rules_rejected.len()
        );

        self.record_session(session.clone());
        Ok(session)
    }

    /// Usable executions only; failed replays carry no signal to learn from
    fn training_batch(&self, replay_ids: Option<&[String]>) -> DefenseResult<Vec<ReplayExecution>> {
        let batch: Vec<ReplayExecution> = match replay_ids {
            Some(ids) => self.replay.executions_by_ids(ids)?,
            None => self.replay.executions(DEFAULT_TRAINING_BATCH),
        }
        .into_iter()
        .filter(|e| e.status != ReplayStatus::Failed)
        .collect();

        if batch.is_empty() {
            return Err(DefenseError::NoTrainingData);
        }
        Ok(batch)
    }

    fn record_session(&self, session: TrainingSession) {
        let mut sessions = self.sessions.write();
        sessions.push_back(session);
        while sessions.len() > SESSION_HISTORY_CAPACITY {
            sessions.pop_front();
        }
    }

    /// Auto-applying session over the recent batch. Single-flight.
    pub async fn run_scheduled_training(&self) -> DefenseResult<TrainingSession> {
        self.training
            .run(async { self.run_training_session(None, true) })
            .await
    }

    pub fn training_status(&self) -> JobStatus {
        self.training.status()
    }

    // ========================================================================
    // RULE LIFECYCLE
    // ========================================================================

    /// Apply a pending rule. Rules that are already applied or rejected are
    /// returned unchanged. A handler failure rejects the rule.
    pub fn apply_learning_rule(&self, id: &str) -> DefenseResult<LearningRule> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DefenseError::LearningRuleNotFound(id.to_string()))?;

        if rule.status.is_terminal() {
            return Ok(rule.clone());
        }

        match self.apply_adjustment(&rule.adjustment) {
            Ok(summary) => {
                log::info!("Learning rule '{}' applied: {}", rule.name, summary);
                rule.status = LearningStatus::Applied;
                rule.outcome = Some(summary);
            }
            Err(e) => {
                log::warn!("Learning rule '{}' rejected: {}", rule.name, e);
                rule.status = LearningStatus::Rejected;
                rule.outcome = Some(e.to_string());
            }
        }
        rule.resolved_at = Some(Utc::now());
        Ok(rule.clone())
    }

    /// Manual review rejection of a pending rule
    pub fn reject_learning_rule(&self, id: &str, reason: &str) -> DefenseResult<LearningRule> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DefenseError::LearningRuleNotFound(id.to_string()))?;

        if !rule.status.is_terminal() {
            log::warn!("Learning rule '{}' rejected by reviewer: {}", rule.name, reason);
            rule.status = LearningStatus::Rejected;
            rule.outcome = Some(reason.to_string());
            rule.resolved_at = Some(Utc::now());
        }
        Ok(rule.clone())
    }

    fn apply_adjustment(&self, adjustment: &ConfigAdjustment) -> DefenseResult<String> {
        match adjustment {
            // Detector floor and every rule fraud-score minimum move together
            ConfigAdjustment::LowerFraudScoreThreshold { by } => {
                let (current, next) = self.config.update(|c| {
                    let current = c.thresholds.fraud_score;
                    c.thresholds.fraud_score = current.saturating_sub(*by).max(MIN_FRAUD_SCORE_FLOOR);
                    (current, c.thresholds.fraud_score)
                });
                let lowered = self.responder.lower_fraud_score_minimums(*by, MIN_FRAUD_SCORE_FLOOR);
                if current == next && lowered == 0 {
                    return Err(DefenseError::Config(format!(
                        "fraud score thresholds already at floor {}",
                        MIN_FRAUD_SCORE_FLOOR
                    )));
                }
                Ok(format!(
                    "fraud score threshold {} -> {}, {} rule minimums lowered by {}",
                    current, next, lowered, by
                ))
            }

            ConfigAdjustment::ShrinkDetectionWindow { to } => {
                if *to == 0 {
                    return Err(DefenseError::Config("detection window must be positive".to_string()));
                }
                self.config.update(|c| {
                    let current = c.detection_window;
                    c.detection_window = current.min(*to);
                    Ok(format!("detection window {} -> {}", current, c.detection_window))
                })
            }

            ConfigAdjustment::EnableDisabledRules => {
                let enabled = self.responder.enable_all_rules();
                Ok(format!("{} response rules re-enabled", enabled))
            }

            ConfigAdjustment::ExpandGeoCoverage { countries } => {
                let has_geo_rule = self.responder.get_rules().iter().any(|r| {
                    r.conditions
                        .iter()
                        .any(|c| matches!(c, RuleCondition::CountryMembership { .. }))
                });
                if !has_geo_rule {
                    return Err(DefenseError::RuleNotFound("no country-based response rule".to_string()));
                }
                let touched = self.responder.expand_geo_coverage(countries);
                Ok(format!("{} added to {} rules", countries.join(", "), touched))
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// All learning rules, optionally filtered by status
    pub fn learning_rules(&self, status: Option<LearningStatus>) -> Vec<LearningRule> {
        self.rules
            .read()
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect()
    }

    pub fn get_learning_rule(&self, id: &str) -> Option<LearningRule> {
        self.rules.read().iter().find(|r| r.id == id).cloned()
    }

    /// Most recent sessions, oldest first
    pub fn sessions(&self, limit: usize) -> Vec<TrainingSession> {
        let sessions = self.sessions.read();
        let start = sessions.len().saturating_sub(limit);
        sessions.iter().skip(start).cloned().collect()
    }

    pub fn set_learning_enabled(&self, enabled: bool) {
        self.config.set_learning_enabled(enabled);
    }

    pub fn stats(&self) -> LearningStats {
        let rules = self.rules.read();
        let mut stats = LearningStats {
            total_rules: rules.len(),
            sessions: self.sessions.read().len(),
            learning_enabled: self.config.read(|c| c.learning_enabled),
            ..Default::default()
        };
        for rule in rules.iter() {
            match rule.status {
                LearningStatus::Pending => stats.pending += 1,
                LearningStatus::Applied => stats.applied += 1,
                LearningStatus::Rejected => stats.rejected += 1,
            }
        }
        if !rules.is_empty() {
            stats.average_confidence = rules.iter().map(|r| r.confidence).sum::<f64>() / rules.len() as f64;
        }
        stats
    }
}
