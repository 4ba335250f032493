//! Threat Replay Service
//!
//! Scenario library, execution log and the scheduled regression job.
//! A failed execution is stored like any other and then surfaced to the
//! caller as `ReplayFailed`; that is the only error a replay produces.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::logic::error::{DefenseError, DefenseResult};
use crate::logic::pipeline::DefensePipeline;
use crate::logic::schedule::{JobStatus, PeriodicJob};
use super::engine::ThreatReplayEngine;
use super::scenarios;
use super::types::{ReplayExecution, ReplayScenario, ReplayStats, ReplayStatus};

pub struct ReplayService {
    engine: ThreatReplayEngine,
    pub(super) scenarios: RwLock<Vec<ReplayScenario>>,
    executions: RwLock<VecDeque<ReplayExecution>>,
    regression: PeriodicJob,
}

impl ReplayService {
    pub fn new(pipeline: Arc<DefensePipeline>) -> Self {
        Self {
            engine: ThreatReplayEngine::new(pipeline),
            scenarios: RwLock::new(scenarios::default_scenarios()),
            executions: RwLock::new(VecDeque::new()),
            regression: PeriodicJob::new("replay-regression"),
        }
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    pub async fn execute_scenario(&self, scenario_id: &str, safe_mode: bool) -> DefenseResult<ReplayExecution> {
        let scenario = self
            .get_scenario(scenario_id)
            .ok_or_else(|| DefenseError::ScenarioNotFound(scenario_id.to_string()))?;

        let execution = self.engine.replay_scenario(&scenario, safe_mode).await;
        self.store(execution)
    }

    /// Run an ad-hoc scenario without adding it to the library
    pub async fn execute_custom(&self, scenario: &ReplayScenario, safe_mode: bool) -> DefenseResult<ReplayExecution> {
        let execution = self.engine.replay_scenario(scenario, safe_mode).await;
        self.store(execution)
    }

    pub async fn execute_historical(&self, event_id: &str, safe_mode: bool) -> DefenseResult<ReplayExecution> {
        let record = self
            .engine
            .pipeline()
            .find_event(event_id)
            .ok_or_else(|| DefenseError::EventNotFound(event_id.to_string()))?;

        let execution = self.engine.replay_historical(&record, safe_mode).await;
        self.store(execution)
    }

    /// Safe-mode pass over the whole scenario library. Single-flight.
    pub async fn run_scheduled_regression(&self) -> DefenseResult<Vec<ReplayExecution>> {
        self.regression
            .run(async {
                let library = self.scenarios();
                log::info!("Scheduled regression over {} scenarios", library.len());

                let mut executions = Vec::with_capacity(library.len());
                for scenario in &library {
                    let execution = self.engine.replay_scenario(scenario, true).await;
                    // Failures are recorded but do not stop the sweep
                    if let Err(e) = self.store(execution.clone()) {
                        log::warn!("Regression scenario '{}' failed: {}", scenario.id, e);
                    }
                    executions.push(execution);
                }
                Ok(executions)
            })
            .await
    }

    pub fn regression_status(&self) -> JobStatus {
        self.regression.status()
    }

    fn store(&self, execution: ReplayExecution) -> DefenseResult<ReplayExecution> {
        let retention = self.engine.pipeline().config().read(|c| c.replay_retention);
        {
            let mut log = self.executions.write();
            log.push_back(execution.clone());
            if retention > 0 {
                while log.len() > retention {
                    log.pop_front();
                }
            }
        }

        if execution.status == ReplayStatus::Failed {
            return Err(DefenseError::ReplayFailed {
                execution_id: execution.id.clone(),
                reason: execution.error.clone().unwrap_or_default(),
            });
        }
        Ok(execution)
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    pub fn scenarios(&self) -> Vec<ReplayScenario> {
        self.scenarios.read().clone()
    }

    pub fn get_scenario(&self, id: &str) -> Option<ReplayScenario> {
        self.scenarios.read().iter().find(|s| s.id == id).cloned()
    }

    pub fn add_scenario(&self, scenario: ReplayScenario) -> DefenseResult<ReplayScenario> {
        scenario.validate()?;
        let mut library = self.scenarios.write();
        if library.iter().any(|s| s.id == scenario.id) {
            return Err(DefenseError::InvalidScenario(format!("{} already exists", scenario.id)));
        }
        library.push(scenario.clone());
        log::info!("Replay scenario '{}' added", scenario.id);
        Ok(scenario)
    }

    pub fn remove_scenario(&self, id: &str) -> DefenseResult<ReplayScenario> {
        let mut library = self.scenarios.write();
        let pos = library
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| DefenseError::ScenarioNotFound(id.to_string()))?;
        Ok(library.remove(pos))
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// Most recent executions, oldest first
    pub fn executions(&self, limit: usize) -> Vec<ReplayExecution> {
        let log = self.executions.read();
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    pub fn get_execution(&self, id: &str) -> Option<ReplayExecution> {
        self.executions.read().iter().find(|e| e.id == id).cloned()
    }

    /// Look up several executions; any unknown id is an error
    pub fn executions_by_ids(&self, ids: &[String]) -> DefenseResult<Vec<ReplayExecution>> {
        let log = self.executions.read();
        ids.iter()
            .map(|id| {
                log.iter()
                    .find(|e| &e.id == id)
                    .cloned()
                    .ok_or_else(|| DefenseError::ReplayNotFound(id.clone()))
            })
            .collect()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.read().len()
    }

    pub fn stats(&self) -> ReplayStats {
        let log = self.executions.read();
        let mut stats = ReplayStats {
            total: log.len(),
            scenarios: self.scenarios.read().len(),
            ..Default::default()
        };

        let mut impact_sum = 0u64;
        let mut time_sum = 0u64;
        for execution in log.iter() {
            match execution.status {
                ReplayStatus::Success => stats.success += 1,
                ReplayStatus::Partial => stats.partial += 1,
                ReplayStatus::Failed => stats.failed += 1,
            }
            if execution.safe_mode {
                stats.safe_mode += 1;
            }
            impact_sum += execution.impact_score as u64;
            time_sum += execution.processing_time_ms;
        }

        if stats.total > 0 {
            stats.average_impact = impact_sum as f64 / stats.total as f64;
            stats.average_processing_ms = time_sum as f64 / stats.total as f64;
        }
        stats
    }
}
