//! API Module
//!
//! Administrative surface consumed by the operator UI.
//!
//! Structure:
//! - commands.rs: Queries and commands over a `DefenseContext`
//! - engine_status.rs: Aggregated status snapshot
//!
//! Usage:
//! - `api::commands::get_rules(&ctx)` - Direct access
//! - `api::get_rules(&ctx)` - Re-exported

pub mod commands;
pub mod engine_status;

pub use commands::*;
pub use engine_status::EngineStatus;
