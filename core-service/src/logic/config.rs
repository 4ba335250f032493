//! Runtime Configuration
//!
//! Mutable configuration shared by every engine in a pipeline.
//! Operators and the learning engine adjust it at runtime through
//! [`ConfigHandle`]; it can also be loaded from env or a JSON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::{self, env_flag, env_parse, env_string};
use super::error::{DefenseError, DefenseResult};

// ============================================================================
// DETECTION THRESHOLDS
// ============================================================================

/// Named detection thresholds (operator / learning adjustable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// Minimum score a heuristic must reach to be emitted
    pub fraud_score: u8,
    /// Risk score at which a location counts as high-risk
    pub geo_risk: u8,
    /// Large-amount floor in cents
    pub amount_cents: i64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            fraud_score: 70,
            geo_risk: 70,
            amount_cents: 50_000,
        }
    }
}

// ============================================================================
// CHANNEL CONFIG
// ============================================================================

/// Alert channel configuration. The console channel is always on;
/// webhook channels are enabled by the presence of a URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub slack_webhook: Option<String>,
    pub discord_webhook: Option<String>,
    pub teams_webhook: Option<String>,
    pub generic_webhook: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        Self {
            slack_webhook: env_string("GIFTSHIELD_SLACK_WEBHOOK"),
            discord_webhook: env_string("GIFTSHIELD_DISCORD_WEBHOOK"),
            teams_webhook: env_string("GIFTSHIELD_TEAMS_WEBHOOK"),
            generic_webhook: env_string("GIFTSHIELD_GENERIC_WEBHOOK"),
            timeout_secs: env_parse("GIFTSHIELD_CHANNEL_TIMEOUT"),
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(constants::DEFAULT_CHANNEL_TIMEOUT_SECS)
    }

    /// Names of the external channels that are configured
    pub fn enabled_external(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.slack_webhook.is_some() {
            names.push("slack");
        }
        if self.discord_webhook.is_some() {
            names.push("discord");
        }
        if self.teams_webhook.is_some() {
            names.push("teams");
        }
        if self.generic_webhook.is_some() {
            names.push("generic");
        }
        names
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Alerts below this score are dropped unless critical
    pub min_score_threshold: u8,
    /// Learning rules at or above this confidence are auto-applied
    pub auto_approval_threshold: f64,
    /// Learning mode; when off, sessions never auto-apply
    pub learning_enabled: bool,
    /// Sliding window size (events)
    pub detection_window: usize,
    /// Signal log cap
    pub signal_retention: usize,
    /// Replay log cap (0 disables the cap)
    pub replay_retention: usize,
    /// Replays slower than this are flagged by the performance analyzer
    pub performance_budget_ms: u64,
    pub thresholds: DetectionThresholds,
    pub channels: ChannelConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_score_threshold: constants::DEFAULT_MIN_SCORE_THRESHOLD,
            auto_approval_threshold: constants::DEFAULT_AUTO_APPROVAL_THRESHOLD,
            learning_enabled: true,
            detection_window: constants::DEFAULT_DETECTION_WINDOW,
            signal_retention: constants::DEFAULT_SIGNAL_RETENTION,
            replay_retention: constants::DEFAULT_REPLAY_RETENTION,
            performance_budget_ms: constants::DEFAULT_PERFORMANCE_BUDGET_MS,
            thresholds: DetectionThresholds::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_score_threshold: env_parse("GIFTSHIELD_MIN_SCORE")
                .unwrap_or(defaults.min_score_threshold),
            auto_approval_threshold: env_parse("GIFTSHIELD_AUTO_APPROVAL")
                .unwrap_or(defaults.auto_approval_threshold),
            learning_enabled: env_flag("GIFTSHIELD_LEARNING_ENABLED")
                .unwrap_or(defaults.learning_enabled),
            detection_window: env_parse("GIFTSHIELD_DETECTION_WINDOW")
                .unwrap_or(defaults.detection_window),
            signal_retention: env_parse("GIFTSHIELD_SIGNAL_RETENTION")
                .unwrap_or(defaults.signal_retention),
            replay_retention: env_parse("GIFTSHIELD_REPLAY_RETENTION")
                .unwrap_or(defaults.replay_retention),
            performance_budget_ms: env_parse("GIFTSHIELD_PERFORMANCE_BUDGET_MS")
                .unwrap_or(defaults.performance_budget_ms),
            thresholds: defaults.thresholds,
            channels: ChannelConfig::from_env(),
        }
    }

    /// Default on-disk location
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("giftshield")
            .join("config.json")
    }

    /// Load from a JSON file (missing fields fall back to defaults)
    pub fn load(path: &Path) -> DefenseResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> DefenseResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Saved runtime config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> DefenseResult<()> {
        if self.min_score_threshold > 100 {
            return Err(DefenseError::Config(format!(
                "min_score_threshold {} exceeds 100",
                self.min_score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_approval_threshold) {
            return Err(DefenseError::Config(format!(
                "auto_approval_threshold {} outside [0, 1]",
                self.auto_approval_threshold
            )));
        }
        if self.detection_window == 0 {
            return Err(DefenseError::Config("detection_window must be positive".to_string()));
        }
        Ok(())
    }

    /// Update a named threshold. Accepted names: `fraud_score`, `geo_risk`,
    /// `amount` (dollars), `min_score`, `auto_approval`.
    pub fn set_threshold(&mut self, name: &str, value: f64) -> DefenseResult<()> {
        let as_score = |v: f64| -> DefenseResult<u8> {
            if (0.0..=100.0).contains(&v) {
                Ok(v.round() as u8)
            } else {
                Err(DefenseError::Config(format!("{} = {} outside [0, 100]", name, v)))
            }
        };

        match name {
            "fraud_score" | "fraudScore" => self.thresholds.fraud_score = as_score(value)?,
            "geo_risk" | "geoRisk" => self.thresholds.geo_risk = as_score(value)?,
            "min_score" | "minScoreThreshold" => self.min_score_threshold = as_score(value)?,
            "amount" => {
                if value <= 0.0 {
                    return Err(DefenseError::Config("amount must be positive".to_string()));
                }
                self.thresholds.amount_cents = (value * 100.0).round() as i64;
            }
            "auto_approval" | "autoApprovalThreshold" => {
                if !(0.0..=1.0).contains(&value) {
                    return Err(DefenseError::Config(format!("auto_approval {} outside [0, 1]", value)));
                }
                self.auto_approval_threshold = value;
            }
            other => return Err(DefenseError::UnknownThreshold(other.to_string())),
        }
        Ok(())
    }
}

// ============================================================================
// SHARED HANDLE
// ============================================================================

/// Cheaply clonable shared view of the runtime configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> RuntimeConfig {
        self.inner.read().clone()
    }

    /// Read a single value without cloning the whole config
    pub fn read<R>(&self, f: impl FnOnce(&RuntimeConfig) -> R) -> R {
        f(&self.inner.read())
    }

    /// Mutate under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut RuntimeConfig) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn set_threshold(&self, name: &str, value: f64) -> DefenseResult<()> {
        self.inner.write().set_threshold(name, value)?;
        log::info!("Threshold '{}' updated to {}", name, value);
        Ok(())
    }

    pub fn set_learning_enabled(&self, enabled: bool) {
        self.inner.write().learning_enabled = enabled;
        log::info!("Learning mode {}", if enabled { "enabled" } else { "disabled" });
    }
}

// ============================================================================
// TESTS
// ============================================================================
