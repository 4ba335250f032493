//! Fraud Signal Detector
//!
//! Scores each gift card event against a sliding window of recent events.
//!
//! # Components
//! - `types.rs`: FraudSignal, SignalType, SignalStats
//! - `heuristics.rs`: The five independent scoring heuristics
//! - `engine.rs`: Sliding window + bounded signal log

pub mod types;
pub mod heuristics;
pub mod engine;

pub use types::{FraudSignal, SignalType, SignalStats};
pub use engine::FraudDetector;
