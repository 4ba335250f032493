//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment overrides are read through the helpers at the bottom.

/// Alerts below this score are suppressed unless critical
pub const DEFAULT_MIN_SCORE_THRESHOLD: u8 = 85;

/// Learning rules at or above this confidence are applied automatically
pub const DEFAULT_AUTO_APPROVAL_THRESHOLD: f64 = 0.85;

/// Number of recent gift card events the detector looks back over
pub const DEFAULT_DETECTION_WINDOW: usize = 50;

/// FIFO cap for the fraud signal log
pub const DEFAULT_SIGNAL_RETENTION: usize = 1000;

/// FIFO cap for the replay execution log (0 disables the cap)
pub const DEFAULT_REPLAY_RETENTION: usize = 1000;

/// FIFO cap for the geo threat log
pub const THREAT_LOG_CAPACITY: usize = 100;

/// FIFO cap for recorded live events (historical replay source)
pub const EVENT_HISTORY_CAPACITY: usize = 500;

/// FIFO cap for auto-response history
pub const RESPONSE_HISTORY_CAPACITY: usize = 500;

/// FIFO cap for the undelivered alert buffer
pub const UNSENT_BUFFER_CAPACITY: usize = 200;

/// Per-channel send timeout (seconds)
pub const DEFAULT_CHANNEL_TIMEOUT_SECS: u64 = 10;

/// Replays slower than this count against the performance analyzer
pub const DEFAULT_PERFORMANCE_BUDGET_MS: u64 = 500;

/// Replays pulled into a training session when none are named
pub const DEFAULT_TRAINING_BATCH: usize = 20;

/// Marker an event type must contain to be processed by the detector
pub const GIFT_CARD_MARKER: &str = "gift_card";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "GiftShield";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Read a parseable value from the environment
pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Read a boolean flag ("false"/"0" disable, anything else enables)
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| s.to_lowercase() != "false" && s != "0")
}

/// Read a non-empty string from the environment
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}
