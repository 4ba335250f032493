//! Detector Engine
//!
//! Owns the sliding window of recent gift card events and the append-only
//! signal log. Window push and evaluation happen under one write lock so
//! concurrent events never observe a half-updated window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::logic::config::ConfigHandle;
use crate::logic::events::GiftCardEvent;
use super::heuristics;
use super::types::{FraudSignal, SignalStats};

pub struct FraudDetector {
    config: ConfigHandle,
    window: RwLock<VecDeque<GiftCardEvent>>,
    signals: RwLock<VecDeque<FraudSignal>>,
    /// Signals ever recorded (survives FIFO eviction)
    emitted: AtomicU64,
}

impl FraudDetector {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            window: RwLock::new(VecDeque::new()),
            signals: RwLock::new(VecDeque::new()),
            emitted: AtomicU64::new(0),
        }
    }

    /// Deep copy used for sandboxed replay runs
    pub fn snapshot(&self) -> Self {
        Self {
            config: self.config.clone(),
            window: RwLock::new(self.window.read().clone()),
            signals: RwLock::new(self.signals.read().clone()),
            emitted: AtomicU64::new(self.emitted.load(Ordering::SeqCst)),
        }
    }

    /// Score one event. Non gift card events are a silent no-op.
    pub fn analyze(&self, event: &GiftCardEvent) -> Vec<FraudSignal> {
        if !event.is_gift_card() {
            return Vec::new();
        }

        let (window_size, floor_cents, min_score) = self.config.read(|c| {
            (c.detection_window, c.thresholds.amount_cents, c.thresholds.fraud_score)
        });

        let mut signals = {
            let mut window = self.window.write();
            window.push_back(event.clone());
            while window.len() > window_size {
                window.pop_front();
            }
            heuristics::evaluate(event, window.make_contiguous(), floor_cents)
        };

        signals.retain(|s| s.score >= min_score);
        if event.is_replay() {
            for signal in &mut signals {
                signal.replay = true;
            }
        }

        for signal in &signals {
            log::debug!(
                "Signal {} score={} severity={} card={:?}: {}",
                signal.signal_type, signal.score, signal.severity, signal.card_id, signal.reason
            );
        }

        self.record(&signals);
        signals
    }

    /// Append externally produced signals (e.g. replay simulations)
    pub fn record(&self, signals: &[FraudSignal]) {
        if signals.is_empty() {
            return;
        }
        let retention = self.config.read(|c| c.signal_retention).max(1);
        let mut log = self.signals.write();
        log.extend(signals.iter().cloned());
        self.emitted.fetch_add(signals.len() as u64, Ordering::SeqCst);
        while log.len() > retention {
            log.pop_front();
        }
    }

    /// Most recent signals, oldest first
    pub fn recent_signals(&self, limit: usize) -> Vec<FraudSignal> {
        let log = self.signals.read();
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.read().len()
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn window_len(&self) -> usize {
        self.window.read().len()
    }

    pub fn stats(&self) -> SignalStats {
        SignalStats::from_signals(self.signals.read().iter())
    }

    pub fn clear(&self) {
        self.window.write().clear();
        self.signals.write().clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::config::RuntimeConfig;
    use crate::logic::detector::SignalType;
    use crate::logic::events::ActivityKind;
    use crate::logic::severity::Severity;
    use serde_json::json;

    fn load(card: &str) -> GiftCardEvent {
        GiftCardEvent::activity(
            "gift_card.activity.created",
            Some("M1"),
            Some(card),
            ActivityKind::Load,
            Some(2_000),
            Some("L1"),
        )
    }

    #[test]
    fn test_three_loads_yield_one_signal() {
        let detector = FraudDetector::new(ConfigHandle::default());

        let mut all = Vec::new();
        for _ in 0..3 {
            all.extend(detector.analyze(&load("C1")));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].signal_type, SignalType::HighFrequencyLoad);
        assert_eq!(all[0].score, 90);
        assert_eq!(all[0].severity, Severity::High);
        assert_eq!(detector.signal_count(), 1);
    }

    #[test]
    fn test_non_gift_card_event_is_noop() {
        let detector = FraudDetector::new(ConfigHandle::default());
        let event = GiftCardEvent::from_json(&json!({ "type": "payment.created" }));
        assert!(detector.analyze(&event).is_empty());
        assert_eq!(detector.window_len(), 0);
    }

    #[test]
    fn test_window_is_bounded() {
        let config = RuntimeConfig { detection_window: 2, ..Default::default() };
        let detector = FraudDetector::new(ConfigHandle::new(config));

        // Only the last two loads are visible, so the burst never reaches 3
        for _ in 0..5 {
            assert!(detector.analyze(&load("C1")).is_empty());
        }
        assert_eq!(detector.window_len(), 2);
    }

    #[test]
    fn test_signal_retention_is_fifo() {
        let config = RuntimeConfig { signal_retention: 2, ..Default::default() };
        let detector = FraudDetector::new(ConfigHandle::new(config));

        for _ in 0..6 {
            detector.analyze(&load("C1"));
        }
        assert_eq!(detector.signal_count(), 2);
        assert_eq!(detector.total_emitted(), 4);
        let recent = detector.recent_signals(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].score, 100);
    }

    #[test]
    fn test_fraud_score_floor_filters_signals() {
        let mut config = RuntimeConfig::default();
        config.thresholds.fraud_score = 95;
        let detector = FraudDetector::new(ConfigHandle::new(config));

        for _ in 0..3 {
            assert!(detector.analyze(&load("C1")).is_empty());
        }
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let detector = FraudDetector::new(ConfigHandle::default());
        detector.analyze(&load("C1"));
        detector.analyze(&load("C1"));

        let sandbox = detector.snapshot();
        assert_eq!(sandbox.analyze(&load("C1")).len(), 1);

        assert_eq!(sandbox.signal_count(), 1);
        assert_eq!(detector.signal_count(), 0);
        assert_eq!(detector.window_len(), 2);
    }
}
