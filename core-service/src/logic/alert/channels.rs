//! Alert Channels
//!
//! Pluggable notification strategies. Each channel is independent; the
//! dispatcher treats every send as failure-isolated.
//!
//! Channels:
//! - `ConsoleChannel`: always on, writes through the `log` facade
//! - `WebhookChannel`: Slack, Discord, Teams or generic JSON webhooks
//! - `RecordingChannel`: in-memory capture (dry runs, tests, embedding hosts)

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::logic::error::{DefenseError, DefenseResult};
use super::types::AlertPayload;

// ============================================================================
// CHANNEL TRAIT
// ============================================================================

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Deliver one alert; `Ok` carries a short delivery note
    async fn send(&self, payload: &AlertPayload, alert_id: &str) -> DefenseResult<String>;
}

// ============================================================================
// CONSOLE
// ============================================================================

#[derive(Debug, Default)]
pub struct ConsoleChannel;

#[async_trait]
impl AlertChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, payload: &AlertPayload, alert_id: &str) -> DefenseResult<String> {
        let severity = payload.effective_severity();
        log::warn!(
            "{} {} (score {}) [{}]: {}",
            severity.label(),
            payload.title,
            payload.score,
            alert_id,
            payload.message
        );
        Ok("logged".to_string())
    }
}

// ============================================================================
// WEBHOOK
// ============================================================================

/// Webhook platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookPlatform {
    Slack,
    Discord,
    MicrosoftTeams,
    Generic,
}

impl WebhookPlatform {
    pub const ALL: [WebhookPlatform; 4] = [
        WebhookPlatform::Slack,
        WebhookPlatform::Discord,
        WebhookPlatform::MicrosoftTeams,
        WebhookPlatform::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookPlatform::Slack => "slack",
            WebhookPlatform::Discord => "discord",
            WebhookPlatform::MicrosoftTeams => "teams",
            WebhookPlatform::Generic => "generic",
        }
    }
}

pub struct WebhookChannel {
    platform: WebhookPlatform,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(platform: WebhookPlatform, url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            platform,
            url: url.to_string(),
            client,
        }
    }

    pub fn platform(&self) -> WebhookPlatform {
        self.platform
    }

    /// Platform-specific JSON body
    pub fn format_payload(&self, payload: &AlertPayload, alert_id: &str) -> serde_json::Value {
        match self.platform {
            WebhookPlatform::Slack => format_slack(payload),
            WebhookPlatform::Discord => format_discord(payload),
            WebhookPlatform::MicrosoftTeams => format_teams(payload),
            WebhookPlatform::Generic => serde_json::json!({
                "alert_id": alert_id,
                "severity": payload.effective_severity(),
                "alert": payload,
            }),
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        self.platform.as_str()
    }

    fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    async fn send(&self, payload: &AlertPayload, alert_id: &str) -> DefenseResult<String> {
        let body = self.format_payload(payload, alert_id);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DefenseError::Channel(format!("{}: {}", self.name(), e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(format!("Sent to {} ({})", self.name(), status))
        } else {
            Err(DefenseError::Channel(format!("{} responded {}", self.name(), status)))
        }
    }
}

fn details(payload: &AlertPayload) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("Severity", payload.effective_severity().as_str().to_string()),
        ("Score", payload.score.to_string()),
    ];
    if let Some(ref card) = payload.card_id {
        fields.push(("Card", card.clone()));
    }
    if let Some(ref merchant) = payload.merchant_id {
        fields.push(("Merchant", merchant.clone()));
    }
    if let Some(ref rule) = payload.rule_id {
        fields.push(("Rule", rule.clone()));
    }
    if let Some(ref host) = payload.hostname {
        fields.push(("Host", host.clone()));
    }
    fields
}

fn title_line(payload: &AlertPayload) -> String {
    format!("{} {}", payload.effective_severity().label(), payload.title)
}

fn format_slack(payload: &AlertPayload) -> serde_json::Value {
    let fields: Vec<_> = details(payload)
        .into_iter()
        .map(|(k, v)| serde_json::json!({ "type": "mrkdwn", "text": format!("*{}:* {}", k, v) }))
        .collect();

    serde_json::json!({
        "blocks": [
            { "type": "header", "text": { "type": "plain_text", "text": title_line(payload), "emoji": true } },
            { "type": "section", "text": { "type": "mrkdwn", "text": payload.message } },
            { "type": "section", "fields": fields },
        ],
        "attachments": [{ "color": payload.effective_severity().color() }]
    })
}

fn format_discord(payload: &AlertPayload) -> serde_json::Value {
    let fields: Vec<_> = details(payload)
        .into_iter()
        .map(|(k, v)| serde_json::json!({ "name": k, "value": v, "inline": true }))
        .collect();
    let color = u32::from_str_radix(&payload.effective_severity().color()[1..], 16).unwrap_or(0);

    serde_json::json!({
        "embeds": [{
            "title": title_line(payload),
            "description": payload.message,
            "color": color,
            "fields": fields,
            "timestamp": payload.timestamp.to_rfc3339()
        }]
    })
}

fn format_teams(payload: &AlertPayload) -> serde_json::Value {
    let facts: Vec<_> = details(payload)
        .into_iter()
        .map(|(k, v)| serde_json::json!({ "name": k, "value": v }))
        .collect();

    serde_json::json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": payload.effective_severity().color().replace('#', ""),
        "summary": payload.title,
        "sections": [{
            "activityTitle": title_line(payload),
            "text": payload.message,
            "facts": facts
        }]
    })
}

// ============================================================================
// RECORDING
// ============================================================================

/// Captures every alert in memory; can be told to fail for isolation tests
pub struct RecordingChannel {
    name: String,
    fail_with: Option<String>,
    delay: Option<Duration>,
    sent: Mutex<Vec<(String, AlertPayload)>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_with: None,
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every send fails with `error`
    pub fn failing(name: &str, error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            ..Self::new(name)
        }
    }

    /// Every send sleeps first (timeout tests)
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<(String, AlertPayload)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: &AlertPayload, alert_id: &str) -> DefenseResult<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref error) = self.fail_with {
            return Err(DefenseError::Channel(error.clone()));
        }
        self.sent.lock().push((alert_id.to_string(), payload.clone()));
        Ok("recorded".to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> AlertPayload {
        let mut p = AlertPayload::new("Large amount", "Card C1 loaded $1,200", 100);
        p.card_id = Some("C1".to_string());
        p
    }

    #[test]
    fn test_format_slack() {
        let channel = WebhookChannel::new(WebhookPlatform::Slack, "https://x", Duration::from_secs(1));
        let formatted = channel.format_payload(&payload(), "a1").to_string();
        assert!(formatted.contains("Large amount"));
        assert!(formatted.contains("blocks"));
        assert!(formatted.contains("*Card:* C1"));
    }

    #[test]
    fn test_format_discord() {
        let channel = WebhookChannel::new(WebhookPlatform::Discord, "https://x", Duration::from_secs(1));
        let formatted = channel.format_payload(&payload(), "a1");
        assert!(formatted["embeds"][0]["title"].as_str().unwrap().starts_with("[CRITICAL]"));
        assert_eq!(formatted["embeds"][0]["color"], 0xe74c3c);
    }

    #[test]
    fn test_format_generic_carries_alert_id() {
        let channel = WebhookChannel::new(WebhookPlatform::Generic, "https://x", Duration::from_secs(1));
        let formatted = channel.format_payload(&payload(), "a1");
        assert_eq!(formatted["alert_id"], "a1");
        assert_eq!(formatted["severity"], "critical");
    }

    #[tokio::test]
    async fn test_recording_channel() {
        let ok = RecordingChannel::new("rec");
        assert!(ok.send(&payload(), "a1").await.is_ok());
        assert_eq!(ok.sent_count(), 1);

        let bad = RecordingChannel::failing("bad", "boom");
        assert!(bad.send(&payload(), "a1").await.is_err());
        assert_eq!(bad.sent_count(), 0);
    }
}
