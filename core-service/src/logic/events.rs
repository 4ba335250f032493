//! Gift Card Events & Activity Logging
//!
//! Inbound payment-webhook events and the write-only audit trail seam.
//!
//! Events are parsed leniently: a malformed payload yields an event with no
//! activity, which simply fails to match any heuristic downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::GIFT_CARD_MARKER;

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Kind of gift card activity carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Load,
    Activate,
    Redeem,
    Create,
    Other(String),
}

impl ActivityKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "LOAD" => ActivityKind::Load,
            "ACTIVATE" => ActivityKind::Activate,
            "REDEEM" => ActivityKind::Redeem,
            "CREATE" => ActivityKind::Create,
            other => ActivityKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::Load => "LOAD",
            ActivityKind::Activate => "ACTIVATE",
            ActivityKind::Redeem => "REDEEM",
            ActivityKind::Create => "CREATE",
            ActivityKind::Other(s) => s.as_str(),
        }
    }
}

/// Nested payment-activity object (`data.object`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftCardActivity {
    pub card_id: Option<String>,
    pub kind: ActivityKind,
    pub amount_cents: Option<i64>,
    pub location_id: Option<String>,
    pub balance_cents: Option<i64>,
}

/// Marks synthetic traffic injected by the replay engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMarker {
    pub execution_id: String,
    pub safe_mode: bool,
    /// Scenario id or original event id
    pub source: String,
}

/// One inbound event. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftCardEvent {
    pub id: String,
    pub event_type: String,
    pub merchant_id: Option<String>,
    pub activity: Option<GiftCardActivity>,
    pub received_at: DateTime<Utc>,
    pub replay: Option<ReplayMarker>,
}

impl GiftCardEvent {
    /// Parse a webhook payload. Never fails; missing pieces become `None`.
    pub fn from_json(payload: &Value) -> Self {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let id = payload
            .get("event_id")
            .or_else(|| payload.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let merchant_id = payload
            .get("merchant_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let activity = payload
            .get("data")
            .and_then(|d| d.get("object"))
            .filter(|o| o.is_object())
            .map(parse_activity);

        Self {
            id,
            event_type,
            merchant_id,
            activity,
            received_at: Utc::now(),
            replay: None,
        }
    }

    /// Build a gift card activity event directly
    pub fn activity(
        event_type: &str,
        merchant_id: Option<&str>,
        card_id: Option<&str>,
        kind: ActivityKind,
        amount_cents: Option<i64>,
        location_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            merchant_id: merchant_id.map(str::to_string),
            activity: Some(GiftCardActivity {
                card_id: card_id.map(str::to_string),
                kind,
                amount_cents,
                location_id: location_id.map(str::to_string),
                balance_cents: None,
            }),
            received_at: Utc::now(),
            replay: None,
        }
    }

    /// Only gift card events are processed by the detector
    pub fn is_gift_card(&self) -> bool {
        self.event_type.contains(GIFT_CARD_MARKER)
    }

    pub fn is_replay(&self) -> bool {
        self.replay.is_some()
    }

    pub fn card_id(&self) -> Option<&str> {
        self.activity.as_ref().and_then(|a| a.card_id.as_deref())
    }

    pub fn kind(&self) -> Option<&ActivityKind> {
        self.activity.as_ref().map(|a| &a.kind)
    }

    pub fn amount_cents(&self) -> Option<i64> {
        self.activity.as_ref().and_then(|a| a.amount_cents)
    }

    pub fn location_id(&self) -> Option<&str> {
        self.activity.as_ref().and_then(|a| a.location_id.as_deref())
    }

    /// Card creation: a `*.created` event or an ACTIVATE/CREATE activity
    pub fn is_card_creation(&self) -> bool {
        self.event_type.ends_with(".created")
            || matches!(self.kind(), Some(ActivityKind::Create) | Some(ActivityKind::Activate))
    }

    /// Return a copy tagged as replay traffic with a fresh id
    pub fn tagged_for_replay(&self, marker: ReplayMarker) -> Self {
        Self {
            id: format!("replay-{}", Uuid::new_v4()),
            received_at: Utc::now(),
            replay: Some(marker),
            ..self.clone()
        }
    }
}

fn parse_activity(object: &Value) -> GiftCardActivity {
    let str_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    let money = |key: &str| {
        object
            .get(key)
            .and_then(|m| m.get("amount"))
            .and_then(Value::as_i64)
    };

    GiftCardActivity {
        card_id: str_field("gift_card_id").or_else(|| str_field("id")),
        kind: ActivityKind::parse(&str_field("type").unwrap_or_default()),
        amount_cents: money("amount_money"),
        location_id: str_field("location_id"),
        balance_cents: money("balance_money"),
    }
}

// ============================================================================
// ACTIVITY LOGGER
// ============================================================================

/// Write-only audit trail owned by the host application
pub trait ActivityLogger: Send + Sync {
    /// Record an activity; returns the id assigned by the logger
    fn log(&self, kind: &str, data: &Value, source: &str) -> String;
}

/// Default logger: forwards to the `log` facade
#[derive(Debug, Default)]
pub struct LogActivityLogger;

impl ActivityLogger for LogActivityLogger {
    fn log(&self, kind: &str, data: &Value, source: &str) -> String {
        let id = Uuid::new_v4().to_string();
        log::debug!("[activity:{}] {} from {}: {}", id, kind, source, data);
        id
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_webhook_payload() {
        let payload = json!({
            "type": "gift_card.activity.created",
            "event_id": "evt-1",
            "merchant_id": "M1",
            "data": { "object": {
                "gift_card_id": "C1",
                "type": "load",
                "amount_money": { "amount": 2500, "currency": "USD" },
                "location_id": "L1",
                "balance_money": { "amount": 5000 }
            }}
        });

        let event = GiftCardEvent::from_json(&payload);
        assert_eq!(event.id, "evt-1");
        assert!(event.is_gift_card());
        assert_eq!(event.merchant_id.as_deref(), Some("M1"));
        assert_eq!(event.card_id(), Some("C1"));
        assert_eq!(event.kind(), Some(&ActivityKind::Load));
        assert_eq!(event.amount_cents(), Some(2500));
        assert_eq!(event.location_id(), Some("L1"));
    }

    #[test]
    fn test_malformed_payload_is_lenient() {
        let event = GiftCardEvent::from_json(&json!({ "type": 42, "data": "oops" }));
        assert_eq!(event.event_type, "");
        assert!(event.activity.is_none());
        assert!(!event.is_gift_card());
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_card_id_falls_back_to_object_id() {
        let event = GiftCardEvent::from_json(&json!({
            "type": "gift_card.updated",
            "data": { "object": { "id": "gc-9", "type": "REDEEM" } }
        }));
        assert_eq!(event.card_id(), Some("gc-9"));
        assert_eq!(event.kind(), Some(&ActivityKind::Redeem));
    }

    #[test]
    fn test_card_creation() {
        let created = GiftCardEvent::from_json(&json!({ "type": "gift_card.created" }));
        assert!(created.is_card_creation());

        let load = GiftCardEvent::activity(
            "gift_card.activity.created", None, Some("C1"), ActivityKind::Load, Some(100), None,
        );
        assert!(!load.is_card_creation());
    }

    #[test]
    fn test_tagged_for_replay() {
        let event = GiftCardEvent::from_json(&json!({ "type": "gift_card.created", "event_id": "e1" }));
        let replayed = event.tagged_for_replay(ReplayMarker {
            execution_id: "x".to_string(),
            safe_mode: true,
            source: "e1".to_string(),
        });
        assert!(replayed.is_replay());
        assert_ne!(replayed.id, event.id);
        assert_eq!(replayed.event_type, event.event_type);
    }
}
