//! Built-in replay scenarios and scenario -> event synthesis

use crate::logic::detector::{FraudSignal, SignalType};
use crate::logic::events::{ActivityKind, GiftCardEvent, ReplayMarker};
use crate::logic::pipeline::{EventSeed, GeoSeed};
use crate::logic::severity::Severity;
use super::types::ReplayScenario;

pub fn default_scenarios() -> Vec<ReplayScenario> {
    let outcomes = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![
        ReplayScenario {
            id: "load-burst".to_string(),
            name: "High-Frequency Load Burst".to_string(),
            description: "Repeated reloads of one card in a short window".to_string(),
            merchant_id: Some("merchant-replay-1".to_string()),
            geo_location: None,
            transaction_amount: Some(2_500),
            simulate_score: Some(95),
            fraud_type: Some(SignalType::HighFrequencyLoad),
            expected_outcomes: outcomes(&["high-frequency-load", "block-ip", "flag-merchant", "send-alert"]),
        },
        ReplayScenario {
            id: "large-amount".to_string(),
            name: "Large Amount Load".to_string(),
            description: "Single $1,200 load on a fresh card".to_string(),
            merchant_id: Some("merchant-replay-2".to_string()),
            geo_location: None,
            transaction_amount: Some(120_000),
            simulate_score: None,
            fraud_type: None,
            expected_outcomes: outcomes(&["large-amount", "send-alert", "escalate-to-human"]),
        },
        ReplayScenario {
            id: "offshore-vpn-merchant".to_string(),
            name: "Offshore VPN Merchant".to_string(),
            description: "Card used across locations from a high-risk VPN exit".to_string(),
            merchant_id: Some("merchant-replay-3".to_string()),
            geo_location: Some(GeoSeed {
                ip: "185.220.101.33".to_string(),
                country: Some("RU".to_string()),
                vpn: Some(true),
                risk_score: Some(88),
            }),
            transaction_amount: Some(9_000),
            simulate_score: Some(88),
            fraud_type: Some(SignalType::MultiLocationAbuse),
            expected_outcomes: outcomes(&["multi-location-abuse", "block-ip", "flag-merchant", "send-alert"]),
        },
        ReplayScenario {
            id: "rapid-redemption".to_string(),
            name: "Rapid Redemption".to_string(),
            description: "Balance drained through repeated redemptions".to_string(),
            merchant_id: Some("merchant-replay-4".to_string()),
            geo_location: None,
            transaction_amount: Some(5_000),
            simulate_score: Some(92),
            fraud_type: Some(SignalType::RapidRedemption),
            expected_outcomes: outcomes(&["rapid-redemption", "send-alert"]),
        },
        ReplayScenario {
            id: "low-risk-baseline".to_string(),
            name: "Low-Risk Baseline".to_string(),
            description: "Ordinary small load; nothing should fire".to_string(),
            merchant_id: Some("merchant-replay-5".to_string()),
            geo_location: None,
            transaction_amount: Some(1_500),
            simulate_score: None,
            fraud_type: None,
            expected_outcomes: Vec::new(),
        },
    ]
}

/// Synthesize the tagged event and seed for a scenario run
pub fn build_event(scenario: &ReplayScenario, marker: ReplayMarker) -> (GiftCardEvent, EventSeed) {
    let (event_type, kind) = match scenario.fraud_type {
        Some(SignalType::RapidCreation) => ("gift_card.created", ActivityKind::Create),
        Some(SignalType::RapidRedemption) => ("gift_card.activity.created", ActivityKind::Redeem),
        _ => ("gift_card.activity.created", ActivityKind::Load),
    };
    let card_id = format!("replay-card-{}", scenario.id);

    let event = GiftCardEvent::activity(
        event_type,
        scenario.merchant_id.as_deref(),
        Some(&card_id),
        kind,
        scenario.transaction_amount,
        Some("replay-location"),
    )
    .tagged_for_replay(marker);

    let simulated_signals = scenario
        .simulate_score
        .map(|score| {
            let signal_type = scenario.fraud_type.unwrap_or(SignalType::HighFrequencyLoad);
            let mut signal = FraudSignal::new(
                signal_type,
                score,
                Severity::from_score(score),
                format!("Simulated {} from scenario '{}'", signal_type, scenario.name),
                Some(card_id.clone()),
                scenario.transaction_amount,
                &event.id,
            );
            signal.replay = true;
            signal
        })
        .into_iter()
        .collect();

    let seed = EventSeed {
        simulated_signals,
        geo: scenario.geo_location.clone(),
    };
    (event, seed)
}
