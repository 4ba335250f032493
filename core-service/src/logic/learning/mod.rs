//! Defense Learning
//!
//! Explainable, confidence-scored tuning driven by replay outcomes.
//! No statistical model: each analyzer is a fixed trigger over batch ratios.
//!
//! # Components
//! - `types.rs`: LearningRule, ConfigAdjustment, TrainingSession
//! - `analyzers.rs`: ReplayAnalyzer trait + the four built-in analyzers
//! - `engine.rs`: `LearningEngine` (sessions, apply/reject, scheduled training)

pub mod types;
pub mod analyzers;
pub mod engine;

#[cfg(test)]
mod tests;

pub use types::{
    ConfigAdjustment, ImprovementEstimates, LearningCategory, LearningRule, LearningStats, LearningStatus,
    TrainingSession, TrainingStatus,
};
pub use analyzers::{default_analyzers, ReplayAnalyzer};
pub use engine::LearningEngine;
