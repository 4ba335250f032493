use serde::Serialize;

use crate::constants::APP_VERSION;
use crate::logic::context::DefenseContext;
use crate::logic::pipeline::PipelineCounters;
use crate::logic::schedule::JobStatus;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub version: String,
    pub counters: PipelineCounters,

    pub rules: RuleStatus,
    pub alerts: AlertStatus,
    pub learning: LearningStatusSummary,

    pub regression_job: JobStatus,
    pub training_job: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleStatus {
    pub total: usize,
    pub enabled: usize,
    pub responses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertStatus {
    pub channels: Vec<String>,
    pub min_score_threshold: u8,
    pub unsent: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningStatusSummary {
    pub enabled: bool,
    pub pending_rules: usize,
    pub applied_rules: usize,
    pub replay_executions: usize,
}

impl EngineStatus {
    pub fn collect(ctx: &DefenseContext) -> Self {
        let responder = ctx.pipeline.responder();
        let rules = responder.get_rules();
        let learning = ctx.learning.stats();

        Self {
            version: APP_VERSION.to_string(),
            counters: ctx.pipeline.counters(),
            rules: RuleStatus {
                total: rules.len(),
                enabled: rules.iter().filter(|r| r.enabled).count(),
                responses: responder.response_count(),
            },
            alerts: AlertStatus {
                channels: ctx.pipeline.dispatcher().channel_names(),
                min_score_threshold: ctx.config.read(|c| c.min_score_threshold),
                unsent: ctx.pipeline.dispatcher().stats().unsent_buffered,
            },
            learning: LearningStatusSummary {
                enabled: learning.learning_enabled,
                pending_rules: learning.pending,
                applied_rules: learning.applied,
                replay_executions: ctx.replay.execution_count(),
            },
            regression_job: ctx.replay.regression_status(),
            training_job: ctx.learning.training_status(),
        }
    }
}
