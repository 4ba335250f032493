//! Alert Dispatcher
//!
//! `dispatch` never fails. Low-score alerts are dropped unless critical,
//! the rest fan out concurrently to every enabled channel with a per-channel
//! timeout. Failed deliveries land in a bounded unsent buffer (no retry).
//!
//! A dry-run dispatcher (see [`AlertDispatcher::dry_run`]) records what would
//! have been sent without touching any channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::constants::UNSENT_BUFFER_CAPACITY;
use crate::logic::config::{ChannelConfig, ConfigHandle};
use super::channels::{AlertChannel, ConsoleChannel, WebhookChannel, WebhookPlatform};
use super::types::{AlertPayload, ChannelResult, DispatchReport, DispatchStats, UnsentAlert};

/// Dry-run report log cap
const SIMULATED_LOG_CAPACITY: usize = 500;

pub struct AlertDispatcher {
    config: ConfigHandle,
    channels: RwLock<Vec<Arc<dyn AlertChannel>>>,
    dry_run: bool,
    unsent: Mutex<VecDeque<UnsentAlert>>,
    simulated_log: Mutex<VecDeque<(AlertPayload, DispatchReport)>>,
    dispatched: AtomicU64,
    suppressed: AtomicU64,
    channel_failures: AtomicU64,
    simulated: AtomicU64,
}

impl AlertDispatcher {
    /// Console channel plus every webhook configured in `config.channels`
    pub fn new(config: ConfigHandle) -> Self {
        let channels = build_channels(&config.read(|c| c.channels.clone()));
        Self::with_channels(config, channels)
    }

    pub fn with_channels(config: ConfigHandle, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            config,
            channels: RwLock::new(channels),
            dry_run: false,
            unsent: Mutex::new(VecDeque::new()),
            simulated_log: Mutex::new(VecDeque::new()),
            dispatched: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            channel_failures: AtomicU64::new(0),
            simulated: AtomicU64::new(0),
        }
    }

    /// Dispatcher sharing this one's channel list that never sends
    pub fn dry_run(&self) -> Self {
        let mut sandbox = Self::with_channels(self.config.clone(), self.channels.read().clone());
        sandbox.dry_run = true;
        sandbox
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn add_channel(&self, channel: Arc<dyn AlertChannel>) {
        log::info!("Alert channel '{}' registered", channel.name());
        self.channels.write().push(channel);
    }

    pub fn remove_channel(&self, name: &str) -> bool {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|c| c.name() != name);
        before != channels.len()
    }

    /// Replace the webhook channels with the ones `channels` configures and
    /// store it in the runtime config. Console and custom channels stay.
    pub fn reconfigure(&self, channels: ChannelConfig) -> Vec<String> {
        let webhooks = webhook_channels(&channels);
        self.config.update(|c| c.channels = channels);
        {
            let mut current = self.channels.write();
            current.retain(|c| !WebhookPlatform::ALL.iter().any(|p| p.as_str() == c.name()));
            current.extend(webhooks);
        }

        let names = self.channel_names();
        log::info!("Alert channels reconfigured: {}", names.join(", "));
        names
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Send one alert. Never fails; the report says what happened.
    pub async fn dispatch(&self, mut payload: AlertPayload) -> DispatchReport {
        let severity = payload.effective_severity();
        payload.severity = Some(severity);
        let alert_id = Uuid::new_v4().to_string();

        let (min_score, timeout_secs) =
            self.config.read(|c| (c.min_score_threshold, c.channels.timeout_secs()));

        if payload.score < min_score && !severity.is_critical() {
            log::debug!(
                "Alert '{}' suppressed (score {} < {}, severity {})",
                payload.title, payload.score, min_score, severity
            );
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return DispatchReport {
                alert_id,
                severity,
                suppressed: true,
                simulated: self.dry_run,
                results: Vec::new(),
            };
        }

        let channels: Vec<_> = self
            .channels
            .read()
            .iter()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();

        if self.dry_run {
            let results = channels
                .iter()
                .map(|c| ChannelResult {
                    channel: c.name().to_string(),
                    success: true,
                    message: "simulated".to_string(),
                    duration_ms: 0,
                })
                .collect();
            let report = DispatchReport {
                alert_id,
                severity,
                suppressed: false,
                simulated: true,
                results,
            };
            self.simulated.fetch_add(1, Ordering::Relaxed);
            let mut log = self.simulated_log.lock();
            log.push_back((payload, report.clone()));
            while log.len() > SIMULATED_LOG_CAPACITY {
                log.pop_front();
            }
            return report;
        }

        let results = fan_out(&channels, &payload, &alert_id, Duration::from_secs(timeout_secs)).await;
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let failed: Vec<&ChannelResult> = results.iter().filter(|r| !r.success).collect();
        if !failed.is_empty() {
            self.channel_failures.fetch_add(failed.len() as u64, Ordering::Relaxed);
            let unsent = UnsentAlert {
                alert_id: alert_id.clone(),
                payload: payload.clone(),
                failed_channels: failed.iter().map(|r| r.channel.clone()).collect(),
                errors: failed.iter().map(|r| r.message.clone()).collect(),
                timestamp: Utc::now(),
            };
            let mut buffer = self.unsent.lock();
            buffer.push_back(unsent);
            while buffer.len() > UNSENT_BUFFER_CAPACITY {
                buffer.pop_front();
            }
        }

        DispatchReport {
            alert_id,
            severity,
            suppressed: false,
            simulated: false,
            results,
        }
    }

    pub fn unsent_alerts(&self) -> Vec<UnsentAlert> {
        self.unsent.lock().iter().cloned().collect()
    }

    pub fn clear_unsent(&self) -> usize {
        let mut buffer = self.unsent.lock();
        let n = buffer.len();
        buffer.clear();
        n
    }

    /// Alerts a dry-run dispatcher would have sent
    pub fn simulated_alerts(&self) -> Vec<(AlertPayload, DispatchReport)> {
        self.simulated_log.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            simulated: self.simulated.load(Ordering::Relaxed),
            unsent_buffered: self.unsent.lock().len(),
            channels: self.channel_names(),
        }
    }
}

// ============================================================================
// FAN OUT
// ============================================================================

/// One task per channel, joined once all have finished
async fn fan_out(
    channels: &[Arc<dyn AlertChannel>],
    payload: &AlertPayload,
    alert_id: &str,
    timeout: Duration,
) -> Vec<ChannelResult> {
    let tasks: Vec<_> = channels
        .iter()
        .map(|channel| {
            let channel = channel.clone();
            let payload = payload.clone();
            let alert_id = alert_id.to_string();
            let name = channel.name().to_string();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, channel.send(&payload, &alert_id)).await;
                (outcome, started.elapsed().as_millis() as u64)
            });
            (name, handle)
        })
        .collect();

    let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let joined = futures::future::join_all(handles).await;

    names
        .into_iter()
        .zip(joined)
        .map(|(channel, joined)| {
            let (success, message, duration_ms) = match joined {
                Ok((Ok(Ok(note)), ms)) => (true, note, ms),
                Ok((Ok(Err(e)), ms)) => (false, e.to_string(), ms),
                Ok((Err(_), ms)) => (false, format!("timed out after {}s", timeout.as_secs()), ms),
                Err(e) => (false, format!("channel task failed: {}", e), 0),
            };
            if success {
                log::info!("Alert {} delivered via {}", alert_id, channel);
            } else {
                log::error!("Alert {} failed on {}: {}", alert_id, channel, message);
            }
            ChannelResult {
                channel,
                success,
                message,
                duration_ms,
            }
        })
        .collect()
}

fn build_channels(config: &ChannelConfig) -> Vec<Arc<dyn AlertChannel>> {
    let mut channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(ConsoleChannel)];
    channels.extend(webhook_channels(config));
    channels
}

fn webhook_channels(config: &ChannelConfig) -> Vec<Arc<dyn AlertChannel>> {
    let timeout = Duration::from_secs(config.timeout_secs());
    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

    let webhooks = [
        (WebhookPlatform::Slack, &config.slack_webhook),
        (WebhookPlatform::Discord, &config.discord_webhook),
        (WebhookPlatform::MicrosoftTeams, &config.teams_webhook),
        (WebhookPlatform::Generic, &config.generic_webhook),
    ];
    for (platform, url) in webhooks {
        if let Some(url) = url {
            channels.push(Arc::new(WebhookChannel::new(platform, url, timeout)));
        }
    }
    channels
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::alert::RecordingChannel;
    use crate::logic::config::RuntimeConfig;
    use crate::logic::severity::Severity;

    fn dispatcher_with(channels: Vec<Arc<dyn AlertChannel>>) -> AlertDispatcher {
        AlertDispatcher::with_channels(ConfigHandle::default(), channels)
    }

    #[test]
    fn test_default_channels_from_config() {
        let mut config = RuntimeConfig::default();
        config.channels.slack_webhook = Some("https://hooks.example/slack".to_string());
        let dispatcher = AlertDispatcher::new(ConfigHandle::new(config));
        assert_eq!(dispatcher.channel_names(), vec!["console", "slack"]);
    }

    #[test]
    fn test_reconfigure_swaps_webhooks() {
        let config = ConfigHandle::default();
        let channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(RecordingChannel::new("rec"))];
        let dispatcher = AlertDispatcher::with_channels(config.clone(), channels);

        let slack = ChannelConfig {
            slack_webhook: Some("https://hooks.example/slack".to_string()),
            ..Default::default()
        };
        assert_eq!(dispatcher.reconfigure(slack), vec!["rec", "slack"]);
        assert_eq!(config.read(|c| c.channels.enabled_external()), vec!["slack"]);

        let discord = ChannelConfig {
            discord_webhook: Some("https://hooks.example/discord".to_string()),
            ..Default::default()
        };
        assert_eq!(dispatcher.reconfigure(discord), vec!["rec", "discord"]);

        assert_eq!(dispatcher.reconfigure(ChannelConfig::default()), vec!["rec"]);
        assert!(config.read(|c| c.channels.enabled_external()).is_empty());
    }

    #[tokio::test]
    async fn test_score_80_is_dropped() {
        let recorder = Arc::new(RecordingChannel::new("rec"));
        let dispatcher = dispatcher_with(vec![recorder.clone()]);

        let report = dispatcher.dispatch(AlertPayload::new("t", "m", 80)).await;

        assert!(report.suppressed);
        assert!(report.results.is_empty());
        assert_eq!(recorder.sent_count(), 0);
        assert_eq!(dispatcher.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_critical_override_bypasses_threshold() {
        let recorder = Arc::new(RecordingChannel::new("rec"));
        let dispatcher = dispatcher_with(vec![recorder.clone()]);

        let payload = AlertPayload::new("t", "m", 40).with_severity(Severity::Critical);
        let report = dispatcher.dispatch(payload).await;

        assert!(report.delivered());
        assert_eq!(recorder.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_channel_is_isolated() {
        let good = Arc::new(RecordingChannel::new("good"));
        let bad = Arc::new(RecordingChannel::failing("bad", "connection refused"));
        let dispatcher = dispatcher_with(vec![bad.clone(), good.clone()]);

        let report = dispatcher.dispatch(AlertPayload::new("t", "m", 90)).await;

        assert_eq!(report.severity, Severity::High);
        assert_eq!(good.sent_count(), 1);
        assert_eq!(report.failed_channels(), vec!["bad"]);

        let unsent = dispatcher.unsent_alerts();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].failed_channels, vec!["bad".to_string()]);
        assert_eq!(dispatcher.stats().channel_failures, 1);
    }

    #[tokio::test]
    async fn test_slow_channel_times_out() {
        let mut config = RuntimeConfig::default();
        config.channels.timeout_secs = Some(1);
        let slow = Arc::new(RecordingChannel::slow("slow", Duration::from_secs(5)));
        let fast = Arc::new(RecordingChannel::new("fast"));
        let dispatcher = AlertDispatcher::with_channels(
            ConfigHandle::new(config),
            vec![slow.clone(), fast.clone()],
        );

        let report = dispatcher.dispatch(AlertPayload::new("t", "m", 99)).await;

        assert_eq!(report.failed_channels(), vec!["slow"]);
        assert!(report.results[0].message.contains("timed out"));
        assert_eq!(fast.sent_count(), 1);
        assert_eq!(slow.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_never_sends() {
        let recorder = Arc::new(RecordingChannel::new("rec"));
        let live = dispatcher_with(vec![recorder.clone()]);
        let sandbox = live.dry_run();

        let report = sandbox.dispatch(AlertPayload::new("t", "m", 99)).await;

        assert!(report.simulated);
        assert_eq!(report.results.len(), 1);
        assert_eq!(recorder.sent_count(), 0);
        assert_eq!(sandbox.simulated_alerts().len(), 1);
        assert_eq!(live.stats().dispatched, 0);
    }
}
