//! GiftShield Core
//!
//! Fraud detection and automated response for gift card commerce events.
//!
//! ```text
//! event ─► FraudDetector ─► GeoThreatEnricher ─► AutoResponder ─► AlertDispatcher
//!                 ▲                                   ▲
//!      ThreatReplayEngine (sandboxed) ──► DefenseLearningEngine (threshold tuning)
//! ```

pub mod api;
pub mod constants;
pub mod logic;

pub use logic::context::DefenseContext;
pub use logic::error::{DefenseError, DefenseResult};
