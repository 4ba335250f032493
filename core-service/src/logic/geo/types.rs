//! Geo Types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
    /// (latitude, longitude)
    pub coordinates: (f64, f64),
    pub isp: String,
}

/// Threat category of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    TorExit,
    Vpn,
    Proxy,
    HighRiskRegion,
    Suspicious,
    Clean,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::TorExit => "tor_exit",
            ThreatType::Vpn => "vpn",
            ThreatType::Proxy => "proxy",
            ThreatType::HighRiskRegion => "high_risk_region",
            ThreatType::Suspicious => "suspicious",
            ThreatType::Clean => "clean",
        }
    }

    /// Strongest indicator wins
    pub fn classify(risk_score: u8, vpn: bool, proxy: bool, tor: bool) -> Self {
        if tor {
            ThreatType::TorExit
        } else if vpn {
            ThreatType::Vpn
        } else if proxy {
            ThreatType::Proxy
        } else if risk_score >= 70 {
            ThreatType::HighRiskRegion
        } else if risk_score >= 40 {
            ThreatType::Suspicious
        } else {
            ThreatType::Clean
        }
    }
}

/// What a resolver knows about an IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoProfile {
    pub location: GeoLocation,
    /// 0 - 100
    pub risk_score: u8,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
}

// ============================================================================
// THREAT LOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatLocation {
    pub id: String,
    pub ip: String,
    pub location: GeoLocation,
    pub risk_score: u8,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub threat_type: ThreatType,
    pub timestamp: DateTime<Utc>,
    pub related_signal_id: Option<String>,
}

impl ThreatLocation {
    pub fn is_anonymized(&self) -> bool {
        self.is_vpn || self.is_proxy || self.is_tor
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatStats {
    pub total: usize,
    pub by_country: HashMap<String, usize>,
    pub by_threat_type: HashMap<String, usize>,
    pub vpn_count: usize,
    pub proxy_count: usize,
    pub tor_count: usize,
    pub average_risk: f64,
    pub high_risk_count: usize,
}
