//! Logic Module - Defense Engines
//!
//! Everything that scores, enriches, reacts to and learns from gift card events.
//!
//! ## Layout
//! - `detector/` - Fraud signal heuristics over a sliding event window
//! - `geo/` - IP -> location enrichment and threat log
//! - `response/` - Rule engine and protective state
//! - `alert/` - Multi-channel alert dispatch
//! - `pipeline` - The event chain wiring the engines above
//! - `replay/` - Scenario and historical replay, safe mode
//! - `learning/` - Replay-driven threshold tuning

// Shared
pub mod config;
pub mod error;
pub mod severity;
pub mod events;
pub mod schedule;

// Engines
pub mod detector;
pub mod geo;
pub mod response;
pub mod alert;

// Orchestration
pub mod pipeline;
pub mod replay;
pub mod learning;
pub mod context;
