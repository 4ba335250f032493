//! Admin Commands - query/command surface for the operator UI
//!
//! Plain functions over a shared [`DefenseContext`]. Unknown ids surface as
//! the matching `*NotFound` error; everything else is infallible reads.

use serde_json::Value;

use crate::logic::alert::{DispatchStats, UnsentAlert};
use crate::logic::config::{ChannelConfig, RuntimeConfig};
use crate::logic::context::DefenseContext;
use crate::logic::detector::{FraudSignal, SignalStats};
use crate::logic::error::{DefenseError, DefenseResult};
use crate::logic::events::GiftCardEvent;
use crate::logic::geo::{ThreatLocation, ThreatStats};
use crate::logic::learning::{LearningRule, LearningStats, LearningStatus, TrainingSession};
use crate::logic::pipeline::{EventRecord, EventSeed, PipelineOutcome};
use crate::logic::replay::{ReplayExecution, ReplayScenario, ReplayStats};
use crate::logic::response::{AutoResponse, Escalation, ResponseRule, ResponseStats, RuleUpdate};
use super::engine_status::EngineStatus;

const DEFAULT_LIMIT: usize = 50;

// ============================================================================
// INGEST
// ============================================================================

/// Feed one webhook payload through the pipeline
pub async fn ingest_event(ctx: &DefenseContext, payload: &Value) -> DefenseResult<PipelineOutcome> {
    if !payload.is_object() {
        return Err(DefenseError::InvalidEvent("payload is not a JSON object".to_string()));
    }
    let event = GiftCardEvent::from_json(payload);
    Ok(ctx.pipeline.process_event(&event, &EventSeed::default()).await)
}

pub fn get_recent_events(ctx: &DefenseContext, limit: Option<usize>) -> Vec<EventRecord> {
    ctx.pipeline.recent_events(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_engine_status(ctx: &DefenseContext) -> EngineStatus {
    EngineStatus::collect(ctx)
}

// ============================================================================
// SIGNALS & THREATS
// ============================================================================

pub fn get_recent_signals(ctx: &DefenseContext, limit: Option<usize>) -> Vec<FraudSignal> {
    ctx.pipeline.detector().recent_signals(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_signal_stats(ctx: &DefenseContext) -> SignalStats {
    ctx.pipeline.detector().stats()
}

pub fn get_recent_threats(ctx: &DefenseContext, limit: Option<usize>) -> Vec<ThreatLocation> {
    ctx.pipeline.enricher().recent_threats(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_threat_stats(ctx: &DefenseContext) -> ThreatStats {
    let high_risk = ctx.config.read(|c| c.thresholds.geo_risk);
    ctx.pipeline.enricher().threat_stats(high_risk)
}

// ============================================================================
// RULES
// ============================================================================

pub fn get_rules(ctx: &DefenseContext) -> Vec<ResponseRule> {
    ctx.pipeline.responder().get_rules()
}

pub fn get_rule(ctx: &DefenseContext, id: &str) -> DefenseResult<ResponseRule> {
    ctx.pipeline
        .responder()
        .get_rule(id)
        .ok_or_else(|| DefenseError::RuleNotFound(id.to_string()))
}

pub fn add_rule(ctx: &DefenseContext, rule: ResponseRule) -> DefenseResult<ResponseRule> {
    ctx.pipeline.responder().add_rule(rule)
}

pub fn update_rule(ctx: &DefenseContext, id: &str, update: RuleUpdate) -> DefenseResult<ResponseRule> {
    ctx.pipeline.responder().update_rule(id, update)
}

pub fn delete_rule(ctx: &DefenseContext, id: &str) -> DefenseResult<ResponseRule> {
    ctx.pipeline.responder().delete_rule(id)
}

pub fn set_rule_enabled(ctx: &DefenseContext, id: &str, enabled: bool) -> DefenseResult<ResponseRule> {
    ctx.pipeline.responder().set_rule_enabled(id, enabled)
}

pub fn get_response_history(ctx: &DefenseContext, limit: Option<usize>) -> Vec<AutoResponse> {
    ctx.pipeline.responder().response_history(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_response_stats(ctx: &DefenseContext) -> ResponseStats {
    ctx.pipeline.responder().stats()
}

// ============================================================================
// PROTECTIVE STATE
// ============================================================================

pub fn get_blocked_ips(ctx: &DefenseContext) -> Vec<String> {
    ctx.pipeline.responder().state().blocked_ips()
}

/// Returns whether the IP was blocked
pub fn unblock_ip(ctx: &DefenseContext, ip: &str) -> bool {
    let removed = ctx.pipeline.responder().state().unblock_ip(ip);
    if removed {
        log::info!("IP {} unblocked by operator", ip);
    }
    removed
}

pub fn get_flagged_merchants(ctx: &DefenseContext) -> Vec<String> {
    ctx.pipeline.responder().state().flagged_merchants()
}

/// Returns whether the merchant was flagged
pub fn unflag_merchant(ctx: &DefenseContext, merchant_id: &str) -> bool {
    let removed = ctx.pipeline.responder().state().unflag_merchant(merchant_id);
    if removed {
        log::info!("Merchant {} unflagged by operator", merchant_id);
    }
    removed
}

pub fn get_escalations(ctx: &DefenseContext) -> Vec<Escalation> {
    ctx.pipeline.responder().state().escalations()
}

// ============================================================================
// ALERTS
// ============================================================================

pub fn get_unsent_alerts(ctx: &DefenseContext) -> Vec<UnsentAlert> {
    ctx.pipeline.dispatcher().unsent_alerts()
}

pub fn clear_unsent_alerts(ctx: &DefenseContext) -> usize {
    ctx.pipeline.dispatcher().clear_unsent()
}

pub fn get_dispatch_stats(ctx: &DefenseContext) -> DispatchStats {
    ctx.pipeline.dispatcher().stats()
}

pub fn get_alert_channels(ctx: &DefenseContext) -> Vec<String> {
    ctx.pipeline.dispatcher().channel_names()
}

/// Swap the webhook channels at runtime; returns the active channel names
pub fn update_alert_channels(ctx: &DefenseContext, channels: ChannelConfig) -> DefenseResult<Vec<String>> {
    let urls = [
        &channels.slack_webhook,
        &channels.discord_webhook,
        &channels.teams_webhook,
        &channels.generic_webhook,
    ];
    for url in urls.into_iter().flatten() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DefenseError::Config(format!("invalid webhook url: {}", url)));
        }
    }
    Ok(ctx.pipeline.dispatcher().reconfigure(channels))
}

// ============================================================================
// REPLAY
// ============================================================================

/// Run a library scenario; safe mode unless explicitly disabled
pub async fn execute_replay(
    ctx: &DefenseContext,
    scenario_id: &str,
    safe_mode: Option<bool>,
) -> DefenseResult<ReplayExecution> {
    ctx.replay.execute_scenario(scenario_id, safe_mode.unwrap_or(true)).await
}

/// Resubmit a recorded event; safe mode unless explicitly disabled
pub async fn execute_historical_replay(
    ctx: &DefenseContext,
    event_id: &str,
    safe_mode: Option<bool>,
) -> DefenseResult<ReplayExecution> {
    ctx.replay.execute_historical(event_id, safe_mode.unwrap_or(true)).await
}

pub fn get_replay_history(ctx: &DefenseContext, limit: Option<usize>) -> Vec<ReplayExecution> {
    ctx.replay.executions(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_replay_execution(ctx: &DefenseContext, id: &str) -> DefenseResult<ReplayExecution> {
    ctx.replay
        .get_execution(id)
        .ok_or_else(|| DefenseError::ReplayNotFound(id.to_string()))
}

pub fn get_replay_scenarios(ctx: &DefenseContext) -> Vec<ReplayScenario> {
    ctx.replay.scenarios()
}

pub fn add_replay_scenario(ctx: &DefenseContext, scenario: ReplayScenario) -> DefenseResult<ReplayScenario> {
    ctx.replay.add_scenario(scenario)
}

pub fn get_replay_stats(ctx: &DefenseContext) -> ReplayStats {
    ctx.replay.stats()
}

// ============================================================================
// LEARNING
// ============================================================================

/// `status` is one of pending / applied / rejected; `None` lists all
pub fn get_learning_rules(ctx: &DefenseContext, status: Option<&str>) -> DefenseResult<Vec<LearningRule>> {
    let filter = match status {
        None => None,
        Some(raw) => Some(parse_learning_status(raw)?),
    };
    Ok(ctx.learning.learning_rules(filter))
}

pub fn apply_learning_rule(ctx: &DefenseContext, id: &str) -> DefenseResult<LearningRule> {
    ctx.learning.apply_learning_rule(id)
}

pub fn reject_learning_rule(ctx: &DefenseContext, id: &str, reason: &str) -> DefenseResult<LearningRule> {
    ctx.learning.reject_learning_rule(id, reason)
}

pub fn run_training_session(
    ctx: &DefenseContext,
    replay_ids: Option<Vec<String>>,
    auto_apply: bool,
) -> DefenseResult<TrainingSession> {
    ctx.learning.run_training_session(replay_ids.as_deref(), auto_apply)
}

pub fn get_training_sessions(ctx: &DefenseContext, limit: Option<usize>) -> Vec<TrainingSession> {
    ctx.learning.sessions(limit.unwrap_or(DEFAULT_LIMIT))
}

pub fn get_learning_stats(ctx: &DefenseContext) -> LearningStats {
    ctx.learning.stats()
}

pub fn set_learning_mode(ctx: &DefenseContext, enabled: bool) -> bool {
    ctx.learning.set_learning_enabled(enabled);
    enabled
}

fn parse_learning_status(raw: &str) -> DefenseResult<LearningStatus> {
    match raw.trim().to_lowercase().as_str() {
        "pending" => Ok(LearningStatus::Pending),
        "applied" => Ok(LearningStatus::Applied),
        "rejected" => Ok(LearningStatus::Rejected),
        other => Err(DefenseError::Config(format!("unknown learning status '{}'", other))),
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Update a named threshold and return the resulting configuration
pub fn update_threshold(ctx: &DefenseContext, name: &str, value: f64) -> DefenseResult<RuntimeConfig> {
    ctx.config.set_threshold(name, value)?;
    Ok(ctx.config.snapshot())
}

pub fn get_config(ctx: &DefenseContext) -> RuntimeConfig {
    ctx.config.snapshot()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(card: &str, amount: i64) -> Value {
        json!({
            "type": "gift_card.activity.created",
            "merchant_id": "M-api",
            "data": { "object": {
                "gift_card_id": card,
                "type": "LOAD",
                "amount_money": { "amount": amount },
                "location_id": "L1"
            }}
        })
    }

    #[tokio::test]
    async fn test_ingest_and_query() {
        let ctx = DefenseContext::default();
        for _ in 0..3 {
            ingest_event(&ctx, &load("C-api", 2_000)).await.unwrap();
        }

        let signals = get_recent_signals(&ctx, None);
        assert_eq!(signals.len(), 1);
        assert_eq!(get_signal_stats(&ctx).total, 1);
        assert_eq!(get_recent_events(&ctx, Some(2)).len(), 2);
        assert_eq!(get_threat_stats(&ctx).total, 1);
        assert_eq!(get_engine_status(&ctx).counters.signals, 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_object() {
        let ctx = DefenseContext::default();
        assert!(matches!(
            ingest_event(&ctx, &json!([1, 2])).await,
            Err(DefenseError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_rule_commands() {
        let ctx = DefenseContext::default();
        assert_eq!(get_rules(&ctx).len(), 5);

        let disabled = set_rule_enabled(&ctx, "high-risk-geo", false).unwrap();
        assert!(!disabled.enabled);
        assert!(get_rule(&ctx, "missing").unwrap_err().is_not_found());
        assert!(delete_rule(&ctx, "missing").is_err());

        delete_rule(&ctx, "proxy-velocity").unwrap();
        assert_eq!(get_response_stats(&ctx).total_rules, 4);
    }

    #[tokio::test]
    async fn test_replay_commands_default_to_safe_mode() {
        let ctx = DefenseContext::default();
        let execution = execute_replay(&ctx, "large-amount", None).await.unwrap();

        assert!(execution.safe_mode);
        assert!(get_blocked_ips(&ctx).is_empty());
        assert_eq!(get_replay_history(&ctx, None).len(), 1);
        assert_eq!(get_replay_execution(&ctx, &execution.id).unwrap().id, execution.id);
        assert_eq!(get_replay_stats(&ctx).safe_mode, 1);
        assert!(execute_historical_replay(&ctx, "unknown", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_protective_state_commands() {
        let ctx = DefenseContext::default();
        execute_replay(&ctx, "large-amount", Some(false)).await.unwrap();

        let blocked = get_blocked_ips(&ctx);
        assert_eq!(blocked.len(), 1);
        assert!(unblock_ip(&ctx, &blocked[0]));
        assert!(!unblock_ip(&ctx, &blocked[0]));

        assert!(unflag_merchant(&ctx, "merchant-replay-2"));
        assert!(get_flagged_merchants(&ctx).is_empty());
        assert!(!get_escalations(&ctx).is_empty());
    }

    #[test]
    fn test_alert_channel_commands() {
        let ctx = DefenseContext::default();
        assert_eq!(get_alert_channels(&ctx), vec!["console"]);

        let channels = ChannelConfig {
            teams_webhook: Some("https://hooks.example/teams".to_string()),
            ..Default::default()
        };
        assert_eq!(update_alert_channels(&ctx, channels).unwrap(), vec!["console", "teams"]);
        assert_eq!(get_engine_status(&ctx).alerts.channels, vec!["console", "teams"]);
        assert_eq!(get_config(&ctx).channels.enabled_external(), vec!["teams"]);

        let bad = ChannelConfig {
            slack_webhook: Some("hooks.example/slack".to_string()),
            ..Default::default()
        };
        assert!(matches!(update_alert_channels(&ctx, bad), Err(DefenseError::Config(_))));
        assert_eq!(get_alert_channels(&ctx), vec!["console", "teams"]);
    }

    #[test]
    fn test_learning_and_config_commands() {
        let ctx = DefenseContext::default();
        assert!(matches!(
            run_training_session(&ctx, None, true),
            Err(DefenseError::NoTrainingData)
        ));
        assert!(get_learning_rules(&ctx, Some("applied")).unwrap().is_empty());
        assert!(get_learning_rules(&ctx, Some("bogus")).is_err());

        assert!(!set_learning_mode(&ctx, false));
        assert!(!get_learning_stats(&ctx).learning_enabled);

        let config = update_threshold(&ctx, "geo_risk", 80.0).unwrap();
        assert_eq!(config.thresholds.geo_risk, 80);
        assert!(matches!(
            update_threshold(&ctx, "velocity", 1.0),
            Err(DefenseError::UnknownThreshold(_))
        ));
    }
}
