//! Alert Dispatcher
//!
//! Fans alerts out to pluggable notification channels with score-based
//! suppression. Channel failures are isolated and never reach the caller.
//!
//! # Components
//! - `types.rs`: AlertPayload, DispatchReport, UnsentAlert
//! - `channels.rs`: `AlertChannel` trait, console / webhook / recording channels
//! - `dispatcher.rs`: Suppression, concurrent fan-out, unsent buffer

pub mod types;
pub mod channels;
pub mod dispatcher;

pub use types::{AlertPayload, ChannelResult, DispatchReport, DispatchStats, UnsentAlert};
pub use channels::{AlertChannel, ConsoleChannel, RecordingChannel, WebhookChannel, WebhookPlatform};
pub use dispatcher::AlertDispatcher;
