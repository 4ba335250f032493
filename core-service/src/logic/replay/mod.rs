//! Threat Replay
//!
//! Pushes synthetic scenarios or recorded events back through the defense
//! pipeline and measures what they would change.
//!
//! # Components
//! - `types.rs`: ReplayScenario, ReplayExecution, comparison and learning hints
//! - `scenarios.rs`: Built-in scenario library, scenario -> event synthesis
//! - `engine.rs`: The shared execution algorithm (safe mode = sandboxed pipeline)
//! - `service.rs`: Scenario library, execution log, scheduled regression

pub mod types;
pub mod scenarios;
pub mod engine;
pub mod service;

#[cfg(test)]
mod tests;

pub use types::{LearningData, ReplayComparison, ReplayExecution, ReplayScenario, ReplayStats, ReplayStatus};
pub use scenarios::default_scenarios;
pub use engine::{impact_score, ThreatReplayEngine};
pub use service::ReplayService;
