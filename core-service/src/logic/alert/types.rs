//! Alert Types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::severity::Severity;

// ============================================================================
// PAYLOAD
// ============================================================================

/// Alert payload handed to channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub message: String,
    /// 0 - 100
    pub score: u8,
    /// Derived from `score` when absent
    pub severity: Option<Severity>,
    pub timestamp: DateTime<Utc>,
    pub hostname: Option<String>,
    pub signal_id: Option<String>,
    pub rule_id: Option<String>,
    pub card_id: Option<String>,
    pub merchant_id: Option<String>,
    pub tags: Vec<String>,
    pub extra: HashMap<String, String>,
}

impl AlertPayload {
    pub fn new(title: &str, message: &str, score: u8) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            score: score.min(100),
            severity: None,
            timestamp: Utc::now(),
            hostname: hostname::get().ok().map(|h| h.to_string_lossy().to_string()),
            signal_id: None,
            rule_id: None,
            card_id: None,
            merchant_id: None,
            tags: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Explicit severity, or the shared score derivation
    pub fn effective_severity(&self) -> Severity {
        self.severity.unwrap_or_else(|| Severity::from_score(self.score))
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome of one channel send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: String,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Outcome of one `dispatch` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub alert_id: String,
    pub severity: Severity,
    pub suppressed: bool,
    /// Dry run: channels were not invoked
    pub simulated: bool,
    pub results: Vec<ChannelResult>,
}

impl DispatchReport {
    pub fn delivered(&self) -> bool {
        !self.suppressed && self.results.iter().any(|r| r.success)
    }

    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.channel.as_str())
            .collect()
    }
}

/// Payload that one or more channels failed to deliver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsentAlert {
    pub alert_id: String,
    pub payload: AlertPayload,
    pub failed_channels: Vec<String>,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub suppressed: u64,
    pub channel_failures: u64,
    pub simulated: u64,
    pub unsent_buffered: usize,
    pub channels: Vec<String>,
}
