//! Detection Heuristics
//!
//! Five independent heuristics. Each sees the current event plus the window
//! of recent gift card events (current event included, oldest first) and
//! emits at most one signal. The score formulas are calibrated constants and
//! must not be "simplified".

use std::collections::BTreeSet;

use crate::logic::events::{ActivityKind, GiftCardEvent};
use crate::logic::severity::Severity;
use super::types::{FraudSignal, SignalType};

// ============================================================================
// CONSTANTS
// ============================================================================

/// LOADs on one card before high-frequency fires
pub const LOAD_BURST_MIN: usize = 3;

/// Distinct locations one card may use before multi-location fires
pub const MAX_DISTINCT_LOCATIONS: usize = 2;

/// Card creations in the window before rapid-creation fires
pub const CREATION_BURST_MIN: usize = 5;

/// Redemptions on one card before rapid-redemption fires
pub const REDEMPTION_BURST_MIN: usize = 3;

/// Large-amount score step ($100 in cents)
const AMOUNT_STEP_CENTS: i64 = 10_000;

/// Large-amount severity bands (cents)
const AMOUNT_CRITICAL_CENTS: i64 = 100_000;
const AMOUNT_HIGH_CENTS: i64 = 75_000;

// ============================================================================
// RUN ALL
// ============================================================================

/// Run every heuristic; several may fire for the same event
pub fn evaluate(event: &GiftCardEvent, window: &[GiftCardEvent], amount_floor_cents: i64) -> Vec<FraudSignal> {
    [
        high_frequency_load(event, window),
        large_amount(event, amount_floor_cents),
        multi_location_abuse(event, window),
        rapid_creation(event, window),
        rapid_redemption(event, window),
    ]
    .into_iter()
    .flatten()
    .collect()
}

// ============================================================================
// HEURISTICS
// ============================================================================

/// Same card loaded >= 3 times in the window
pub fn high_frequency_load(event: &GiftCardEvent, window: &[GiftCardEvent]) -> Option<FraudSignal> {
    if event.kind() != Some(&ActivityKind::Load) {
        return None;
    }
    let card = event.card_id()?;
    let n = count_card_activity(window, card, &ActivityKind::Load);
    if n < LOAD_BURST_MIN {
        return None;
    }

    let score = (90 + 5 * (n - LOAD_BURST_MIN)).min(100) as u8;
    let severity = if n >= 5 { Severity::Critical } else { Severity::High };

    Some(FraudSignal::new(
        SignalType::HighFrequencyLoad,
        score,
        severity,
        format!("Card {} loaded {} times in the last {} events", card, n, window.len()),
        Some(card.to_string()),
        event.amount_cents(),
        &event.id,
    ))
}

/// Single activity above the amount floor
pub fn large_amount(event: &GiftCardEvent, floor_cents: i64) -> Option<FraudSignal> {
    let amount = event.amount_cents()?;
    if amount <= floor_cents {
        return None;
    }

    let steps = (amount - floor_cents) / AMOUNT_STEP_CENTS;
    let score = (75 + 5 * steps).min(100) as u8;
    let severity = if amount > AMOUNT_CRITICAL_CENTS {
        Severity::Critical
    } else if amount > AMOUNT_HIGH_CENTS {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(FraudSignal::new(
        SignalType::LargeAmount,
        score,
        severity,
        format!(
            "Amount {} exceeds {}",
            format_dollars(amount),
            format_dollars(floor_cents)
        ),
        event.card_id().map(str::to_string),
        Some(amount),
        &event.id,
    ))
}

/// Same card seen at more than two distinct locations
pub fn multi_location_abuse(event: &GiftCardEvent, window: &[GiftCardEvent]) -> Option<FraudSignal> {
    let card = event.card_id()?;
    let locations: BTreeSet<&str> = window
        .iter()
        .filter(|e| e.card_id() == Some(card))
        .filter_map(|e| e.location_id())
        .collect();

    let distinct = locations.len();
    if distinct <= MAX_DISTINCT_LOCATIONS {
        return None;
    }

    let score = (85 + (5 * distinct).min(15)).min(100) as u8;
    let severity = if distinct > 4 { Severity::Critical } else { Severity::High };

    Some(FraudSignal::new(
        SignalType::MultiLocationAbuse,
        score,
        severity,
        format!("Card {} used across {} locations", card, distinct),
        Some(card.to_string()),
        event.amount_cents(),
        &event.id,
    ))
}

/// Burst of card creations anywhere in the window
pub fn rapid_creation(event: &GiftCardEvent, window: &[GiftCardEvent]) -> Option<FraudSignal> {
    if !event.is_card_creation() {
        return None;
    }
    let n = window.iter().filter(|e| e.is_card_creation()).count();
    if n < CREATION_BURST_MIN {
        return None;
    }

    let score = (70 + (3 * n).min(25)) as u8;
    let severity = if n > 8 { Severity::Critical } else { Severity::High };

    Some(FraudSignal::new(
        SignalType::RapidCreation,
        score,
        severity,
        format!("{} gift cards created in the last {} events", n, window.len()),
        event.card_id().map(str::to_string),
        event.amount_cents(),
        &event.id,
    ))
}

/// Same card redeemed >= 3 times in the window
pub fn rapid_redemption(event: &GiftCardEvent, window: &[GiftCardEvent]) -> Option<FraudSignal> {
    if event.kind() != Some(&ActivityKind::Redeem) {
        return None;
    }
    let card = event.card_id()?;
    let n = count_card_activity(window, card, &ActivityKind::Redeem);
    if n < REDEMPTION_BURST_MIN {
        return None;
    }

    let score = (80 + (4 * n).min(20)) as u8;
    let severity = if n > 5 { Severity::Critical } else { Severity::High };

    Some(FraudSignal::new(
        SignalType::RapidRedemption,
        score,
        severity,
        format!("Card {} redeemed {} times in the last {} events", card, n, window.len()),
        Some(card.to_string()),
        event.amount_cents(),
        &event.id,
    ))
}

// ============================================================================
// UTILITIES
// ============================================================================

fn count_card_activity(window: &[GiftCardEvent], card: &str, kind: &ActivityKind) -> usize {
    window
        .iter()
        .filter(|e| e.card_id() == Some(card) && e.kind() == Some(kind))
        .count()
}

fn format_dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(card: &str, kind: ActivityKind, amount: i64, location: &str) -> GiftCardEvent {
        GiftCardEvent::activity(
            "gift_card.activity.created",
            Some("M1"),
            Some(card),
            kind,
            Some(amount),
            Some(location),
        )
    }

    #[test]
    fn test_high_frequency_load_threshold() {
        let window: Vec<_> = (0..3).map(|_| activity("C1", ActivityKind::Load, 1000, "L1")).collect();

        assert!(high_frequency_load(&window[1], &window[..2]).is_none());

        let signal = high_frequency_load(&window[2], &window).unwrap();
        assert_eq!(signal.score, 90);
        assert_eq!(signal.severity, Severity::High);
        assert_eq!(signal.card_id.as_deref(), Some("C1"));
    }

    #[test]
    fn test_high_frequency_load_escalates() {
        let window: Vec<_> = (0..5).map(|_| activity("C1", ActivityKind::Load, 1000, "L1")).collect();
        let signal = high_frequency_load(&window[4], &window).unwrap();
        assert_eq!(signal.score, 100);
        assert_eq!(signal.severity, Severity::Critical);
    }

    #[test]
    fn test_large_amount_bands() {
        let floor = 50_000;

        // $500 exactly does not fire
        assert!(large_amount(&activity("C", ActivityKind::Load, 50_000, "L"), floor).is_none());

        // $600 -> 75 + 5*1 = 80, medium band
        let s = large_amount(&activity("C", ActivityKind::Load, 60_000, "L"), floor).unwrap();
        assert_eq!((s.score, s.severity), (80, Severity::Medium));

        // $800 -> 75 + 5*3 = 90, high band
        let s = large_amount(&activity("C", ActivityKind::Load, 80_000, "L"), floor).unwrap();
        assert_eq!((s.score, s.severity), (90, Severity::High));

        // $1,000 is still the high band (critical needs > $1,000)
        let s = large_amount(&activity("C", ActivityKind::Load, 100_000, "L"), floor).unwrap();
        assert_eq!((s.score, s.severity), (100, Severity::High));

        // $1,200 -> min(75 + 5*7, 100) = 100, critical band
        let s = large_amount(&activity("C", ActivityKind::Load, 120_000, "L"), floor).unwrap();
        assert_eq!((s.score, s.severity), (100, Severity::Critical));
    }

    #[test]
    fn test_multi_location_abuse() {
        let window = vec![
            activity("C1", ActivityKind::Redeem, 100, "L1"),
            activity("C1", ActivityKind::Redeem, 100, "L2"),
            activity("C2", ActivityKind::Redeem, 100, "L9"),
            activity("C1", ActivityKind::Load, 100, "L3"),
        ];
        let signal = multi_location_abuse(&window[3], &window).unwrap();
        assert_eq!(signal.score, 100);
        assert_eq!(signal.severity, Severity::High);

        assert!(multi_location_abuse(&window[2], &window).is_none());
    }

    #[test]
    fn test_rapid_creation() {
        let window: Vec<_> = (0..5)
            .map(|_| GiftCardEvent::from_json(&json!({ "type": "gift_card.created" })))
            .collect();
        let signal = rapid_creation(&window[4], &window).unwrap();
        assert_eq!(signal.score, 85);
        assert_eq!(signal.severity, Severity::High);

        assert!(rapid_creation(&window[3], &window[..4]).is_none());
    }

    #[test]
    fn test_rapid_redemption() {
        let window: Vec<_> = (0..6).map(|_| activity("C7", ActivityKind::Redeem, 500, "L1")).collect();
        let s = rapid_redemption(&window[2], &window[..3]).unwrap();
        assert_eq!((s.score, s.severity), (92, Severity::High));

        let s = rapid_redemption(&window[5], &window).unwrap();
        assert_eq!((s.score, s.severity), (100, Severity::Critical));
    }

    #[test]
    fn test_multiple_heuristics_fire_together() {
        let window: Vec<_> = (0..3).map(|_| activity("C1", ActivityKind::Load, 120_000, "L1")).collect();
        let signals = evaluate(&window[2], &window, 50_000);
        let types: Vec<_> = signals.iter().map(|s| s.signal_type).collect();
        assert_eq!(types, vec![SignalType::HighFrequencyLoad, SignalType::LargeAmount]);
    }

    #[test]
    fn test_event_without_activity_matches_nothing() {
        let event = GiftCardEvent::from_json(&json!({ "type": "gift_card.updated" }));
        assert!(evaluate(&event, std::slice::from_ref(&event), 50_000).is_empty());
    }
}
