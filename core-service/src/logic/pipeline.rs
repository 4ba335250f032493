//! Defense Pipeline
//!
//! Owns one instance of every engine and drives an event through
//! detector -> enricher -> rule engine -> dispatcher.
//!
//! Enrichment runs as its own task and is joined before the rule engine
//! sees the batch, so every response is computed against a known threat set.
//! [`DefensePipeline::sandbox`] builds a copy-on-write pipeline for safe-mode
//! replay: it starts from the live state but never writes back.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::EVENT_HISTORY_CAPACITY;
use super::alert::{AlertDispatcher, AlertPayload, DispatchReport};
use super::config::ConfigHandle;
use super::detector::{FraudDetector, FraudSignal, SignalType};
use super::events::{ActivityLogger, GiftCardEvent, LogActivityLogger};
use super::geo::{synthetic_source_ip, GeoResolver, GeoThreatEnricher, SyntheticGeoResolver, ThreatLocation, ThreatType};
use super::response::{ActionKind, AutoResponder, AutoResponse};

// ============================================================================
// TYPES
// ============================================================================

/// A processed live event, kept as a historical replay source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event: GiftCardEvent,
    pub max_score: u8,
    pub signal_types: Vec<SignalType>,
    pub actions: Vec<ActionKind>,
    pub processed_at: DateTime<Utc>,
}

/// Geo override for synthetic traffic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoSeed {
    pub ip: String,
    pub country: Option<String>,
    pub vpn: Option<bool>,
    pub risk_score: Option<u8>,
}

/// Extra inputs the replay engine attaches to a synthetic event
#[derive(Debug, Clone, Default)]
pub struct EventSeed {
    /// Recorded as if the detector had produced them
    pub simulated_signals: Vec<FraudSignal>,
    pub geo: Option<GeoSeed>,
}

/// Everything one event produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    pub event_id: String,
    pub signals: Vec<FraudSignal>,
    pub threats: Vec<ThreatLocation>,
    pub alerts: Vec<DispatchReport>,
    pub responses: Vec<AutoResponse>,
}

impl PipelineOutcome {
    pub fn max_score(&self) -> u8 {
        self.signals.iter().map(|s| s.score).max().unwrap_or(0)
    }

    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.responses.iter().flat_map(|r| r.action_kinds()).collect()
    }
}

/// Monotonic counters diffed around a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub signals: u64,
    pub threats: u64,
    pub blocked_ips: usize,
    pub flagged_merchants: usize,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct DefensePipeline {
    config: ConfigHandle,
    detector: Arc<FraudDetector>,
    enricher: Arc<GeoThreatEnricher>,
    dispatcher: Arc<AlertDispatcher>,
    responder: Arc<AutoResponder>,
    logger: Arc<dyn ActivityLogger>,
    history: RwLock<VecDeque<EventRecord>>,
    sandboxed: bool,
}

impl DefensePipeline {
    /// Synthetic geo resolver, channels from config, log-backed audit trail
    pub fn new(config: ConfigHandle) -> Self {
        let dispatcher = Arc::new(AlertDispatcher::new(config.clone()));
        Self::with_parts(
            config,
            Arc::new(SyntheticGeoResolver),
            dispatcher,
            Arc::new(LogActivityLogger),
        )
    }

    pub fn with_parts(
        config: ConfigHandle,
        resolver: Arc<dyn GeoResolver>,
        dispatcher: Arc<AlertDispatcher>,
        logger: Arc<dyn ActivityLogger>,
    ) -> Self {
        Self {
            detector: Arc::new(FraudDetector::new(config.clone())),
            enricher: Arc::new(GeoThreatEnricher::new(resolver)),
            responder: Arc::new(AutoResponder::new(dispatcher.clone())),
            dispatcher,
            logger,
            history: RwLock::new(VecDeque::new()),
            sandboxed: false,
            config,
        }
    }

    /// Copy-on-write pipeline for safe-mode runs: snapshots of every engine
    /// and a dry-run dispatcher. Nothing it does reaches the live pipeline.
    pub fn sandbox(&self) -> Self {
        let dispatcher = Arc::new(self.dispatcher.dry_run());
        Self {
            config: self.config.clone(),
            detector: Arc::new(self.detector.snapshot()),
            enricher: Arc::new(self.enricher.snapshot()),
            responder: Arc::new(self.responder.snapshot(dispatcher.clone())),
            dispatcher,
            logger: self.logger.clone(),
            history: RwLock::new(self.history.read().clone()),
            sandboxed: true,
        }
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn detector(&self) -> &Arc<FraudDetector> {
        &self.detector
    }

    pub fn enricher(&self) -> &Arc<GeoThreatEnricher> {
        &self.enricher
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    pub fn responder(&self) -> &Arc<AutoResponder> {
        &self.responder
    }

    // ========================================================================
    // PROCESSING
    // ========================================================================

    /// Run one event through the full chain
    pub async fn process_event(&self, event: &GiftCardEvent, seed: &EventSeed) -> PipelineOutcome {
        let source = if event.is_replay() { "replay" } else { "webhook" };
        if let Ok(data) = serde_json::to_value(event) {
            self.logger.log("gift_card_event", &data, source);
        }

        // 1. Detection
        let mut signals = self.detector.analyze(event);
        if !seed.simulated_signals.is_empty() {
            let simulated: Vec<FraudSignal> = seed
                .simulated_signals
                .iter()
                .cloned()
                .map(|mut s| {
                    s.replay = event.is_replay();
                    s.source_event = event.id.clone();
                    s
                })
                .collect();
            self.detector.record(&simulated);
            signals.extend(simulated);
        }

        // 2. Enrichment (joined before rules run)
        let threats = self.enrich(&signals, seed.geo.as_ref()).await;

        // 3. Alerts for individually alertable signals
        let min_score = self.config.read(|c| c.min_score_threshold);
        let mut alerts = Vec::new();
        for signal in signals.iter().filter(|s| s.is_alertable(min_score)) {
            log::warn!(
                "Fraud signal {} score={} severity={}: {}",
                signal.signal_type, signal.score, signal.severity, signal.reason
            );
            alerts.push(self.dispatcher.dispatch(signal_alert(signal, event)).await);
        }

        // 4. Rules
        let responses = self.responder.process_event(event, &signals, &threats).await;

        let outcome = PipelineOutcome {
            event_id: event.id.clone(),
            signals,
            threats,
            alerts,
            responses,
        };

        if !event.is_replay() && event.is_gift_card() {
            self.record(event, &outcome);
        }
        outcome
    }

    async fn enrich(&self, signals: &[FraudSignal], geo: Option<&GeoSeed>) -> Vec<ThreatLocation> {
        let latest = signals.last();
        let ip = match (geo, latest) {
            (Some(seed), _) => seed.ip.clone(),
            (None, Some(signal)) => synthetic_source_ip(signal.signal_type, signal.severity),
            (None, None) => return Vec::new(),
        };

        let enricher = self.enricher.clone();
        let lookup_ip = ip.clone();
        let task = tokio::spawn(async move { enricher.analyze(&lookup_ip).await });

        let mut location = match task.await {
            Ok(location) => location,
            Err(e) => {
                log::error!("Geo enrichment for {} failed: {}", ip, e);
                return Vec::new();
            }
        };

        if let Some(seed) = geo {
            apply_geo_seed(&mut location, seed);
        }

        let related = latest.map(|s| s.id.as_str());
        vec![self.enricher.log_threat_location(location, related)]
    }

    fn record(&self, event: &GiftCardEvent, outcome: &PipelineOutcome) {
        let record = EventRecord {
            id: event.id.clone(),
            event: event.clone(),
            max_score: outcome.max_score(),
            signal_types: outcome.signals.iter().map(|s| s.signal_type).collect(),
            actions: outcome.action_kinds(),
            processed_at: Utc::now(),
        };
        let mut history = self.history.write();
        history.push_back(record);
        while history.len() > EVENT_HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn counters(&self) -> PipelineCounters {
        let protective = self.responder.state().counts();
        PipelineCounters {
            signals: self.detector.total_emitted(),
            threats: self.enricher.total_logged(),
            blocked_ips: protective.blocked_ips,
            flagged_merchants: protective.flagged_merchants,
        }
    }

    pub fn find_event(&self, id: &str) -> Option<EventRecord> {
        self.history.read().iter().find(|r| r.id == id).cloned()
    }

    /// Most recent recorded events, oldest first
    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        let history = self.history.read();
        let start = history.len().saturating_sub(limit);
        history.iter().skip(start).cloned().collect()
    }
}

fn signal_alert(signal: &FraudSignal, event: &GiftCardEvent) -> AlertPayload {
    let mut payload = AlertPayload::new(
        &format!("Gift card fraud: {}", signal.signal_type),
        &signal.reason,
        signal.score,
    )
    .with_severity(signal.severity)
    .with_tag(signal.signal_type.as_str());
    payload.signal_id = Some(signal.id.clone());
    payload.card_id = signal.card_id.clone();
    payload.merchant_id = event.merchant_id.clone();
    if signal.replay {
        payload = payload.with_tag("replay");
    }
    payload
}

fn apply_geo_seed(location: &mut ThreatLocation, seed: &GeoSeed) {
    if let Some(ref country) = seed.country {
        location.location.country = country.to_uppercase();
    }
    if let Some(vpn) = seed.vpn {
        location.is_vpn = vpn;
    }
    if let Some(risk) = seed.risk_score {
        location.risk_score = risk.min(100);
    }
    location.threat_type = ThreatType::classify(
        location.risk_score,
        location.is_vpn,
        location.is_proxy,
        location.is_tor,
    );
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::alert::{AlertChannel, RecordingChannel};
    use crate::logic::events::ActivityKind;
    use crate::logic::severity::Severity;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct MemoryLogger {
        entries: Mutex<Vec<(String, String)>>,
    }

    impl ActivityLogger for MemoryLogger {
        fn log(&self, kind: &str, _data: &Value, source: &str) -> String {
            let mut entries = self.entries.lock();
            entries.push((kind.to_string(), source.to_string()));
            entries.len().to_string()
        }
    }

    fn pipeline(recorder: Arc<RecordingChannel>) -> (DefensePipeline, Arc<MemoryLogger>) {
        let config = ConfigHandle::default();
        let channels: Vec<Arc<dyn AlertChannel>> = vec![recorder];
        let dispatcher = Arc::new(AlertDispatcher::with_channels(config.clone(), channels));
        let logger = Arc::new(MemoryLogger::default());
        let pipeline = DefensePipeline::with_parts(config, Arc::new(SyntheticGeoResolver), dispatcher, logger.clone());
        (pipeline, logger)
    }

    fn load(card: &str, amount: i64) -> GiftCardEvent {
        GiftCardEvent::activity("gift_card.activity.created", Some("M1"), Some(card), ActivityKind::Load, Some(amount), Some("L1"))
    }

    #[tokio::test]
    async fn test_three_loads_flow_through_chain() {
        let recorder = Arc::new(RecordingChannel::new("rec"));
        let (pipeline, logger) = pipeline(recorder.clone());

        let mut last = PipelineOutcome::default();
        for _ in 0..3 {
            last = pipeline.process_event(&load("C1", 2_000), &EventSeed::default()).await;
        }

        assert_eq!(last.signals.len(), 1);
        assert_eq!(last.signals[0].score, 90);
        assert_eq!(last.threats.len(), 1);
        assert_eq!(
            last.threats[0].ip,
            synthetic_source_ip(SignalType::HighFrequencyLoad, Severity::High)
        );
        assert_eq!(last.threats[0].related_signal_id.as_deref(), Some(last.signals[0].id.as_str()));
        // Score 90 >= 85: one signal alert delivered
        assert_eq!(last.alerts.len(), 1);
        assert!(recorder.sent_count() >= 1);
        assert_eq!(logger.entries.lock().len(), 3);
        assert_eq!(pipeline.recent_events(10).len(), 3);
    }

    #[tokio::test]
    async fn test_non_gift_card_event_is_ignored() {
        let (pipeline, _) = pipeline(Arc::new(RecordingChannel::new("rec")));
        let event = GiftCardEvent::from_json(&serde_json::json!({ "type": "payment.created" }));
        let outcome = pipeline.process_event(&event, &EventSeed::default()).await;

        assert!(outcome.signals.is_empty());
        assert!(outcome.threats.is_empty());
        assert!(outcome.responses.is_empty());
        assert!(pipeline.recent_events(10).is_empty());
    }

    #[tokio::test]
    async fn test_geo_seed_overrides_location() {
        let (pipeline, _) = pipeline(Arc::new(RecordingChannel::new("rec")));
        let seed = EventSeed {
            simulated_signals: Vec::new(),
            geo: Some(GeoSeed {
                ip: "203.0.113.50".to_string(),
                country: Some("ru".to_string()),
                vpn: Some(true),
                risk_score: Some(92),
            }),
        };
        let outcome = pipeline.process_event(&load("C9", 1_000), &seed).await;

        let threat = &outcome.threats[0];
        assert_eq!(threat.location.country, "RU");
        assert_eq!(threat.risk_score, 92);
        assert_eq!(threat.threat_type, ThreatType::Vpn);
        // High-risk geo rule: RU + risk >= 80
        assert!(outcome.responses.iter().any(|r| r.rule_id == "high-risk-geo"));
        assert!(pipeline.responder().state().is_blocked("203.0.113.50"));
    }

    #[tokio::test]
    async fn test_sandbox_never_touches_live_state() {
        let recorder = Arc::new(RecordingChannel::new("rec"));
        let (pipeline, _) = pipeline(recorder.clone());
        let sandbox = pipeline.sandbox();
        let before = pipeline.counters();

        let big = load("C2", 150_000);
        let outcome = sandbox.process_event(&big, &EventSeed::default()).await;

        assert!(!outcome.signals.is_empty());
        assert!(outcome.alerts.iter().all(|a| a.simulated));
        assert!(sandbox.counters().blocked_ips > 0);
        assert_eq!(pipeline.counters(), before);
        assert_eq!(recorder.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_signals_are_recorded() {
        let (pipeline, _) = pipeline(Arc::new(RecordingChannel::new("rec")));
        let simulated = FraudSignal::new(
            SignalType::RapidRedemption,
            97,
            Severity::Critical,
            "simulated".to_string(),
            None,
            None,
            "placeholder",
        );
        let event = load("C3", 100);
        let seed = EventSeed { simulated_signals: vec![simulated], geo: None };
        let outcome = pipeline.process_event(&event, &seed).await;

        assert_eq!(outcome.signals.len(), 1);
        assert_eq!(outcome.signals[0].source_event, event.id);
        assert_eq!(pipeline.detector().signal_count(), 1);
        assert_eq!(pipeline.find_event(&event.id).unwrap().max_score, 97);
    }
}
