//! Geo-Threat Enricher
//!
//! IP lookups are cached for the lifetime of the enricher (no TTL).
//! Threat locations go to a FIFO log capped at [`THREAT_LOG_CAPACITY`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::constants::THREAT_LOG_CAPACITY;
use super::resolver::GeoResolver;
use super::types::{GeoProfile, ThreatLocation, ThreatStats, ThreatType};

pub struct GeoThreatEnricher {
    resolver: Arc<dyn GeoResolver>,
    cache: RwLock<HashMap<String, GeoProfile>>,
    threat_log: RwLock<VecDeque<ThreatLocation>>,
    logged: AtomicU64,
}

impl GeoThreatEnricher {
    pub fn new(resolver: Arc<dyn GeoResolver>) -> Self {
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            threat_log: RwLock::new(VecDeque::new()),
            logged: AtomicU64::new(0),
        }
    }

    /// Deep copy used for sandboxed replay runs
    pub fn snapshot(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            cache: RwLock::new(self.cache.read().clone()),
            threat_log: RwLock::new(self.threat_log.read().clone()),
            logged: AtomicU64::new(self.logged.load(Ordering::SeqCst)),
        }
    }

    /// Resolve an IP into a threat location. Never fails.
    pub async fn analyze(&self, ip: &str) -> ThreatLocation {
        let cached = self.cache.read().get(ip).cloned();
        let profile = match cached {
            Some(profile) => {
                log::debug!("Geo cache hit for {}", ip);
                profile
            }
            None => {
                log::debug!("Geo cache miss for {} (resolver: {})", ip, self.resolver.name());
                let resolved = self.resolver.resolve(ip).await;
                // First writer wins if two lookups raced
                self.cache
                    .write()
                    .entry(ip.to_string())
                    .or_insert(resolved)
                    .clone()
            }
        };

        let location = ThreatLocation {
            id: Uuid::new_v4().to_string(),
            ip: ip.to_string(),
            threat_type: ThreatType::classify(
                profile.risk_score,
                profile.is_vpn,
                profile.is_proxy,
                profile.is_tor,
            ),
            location: profile.location,
            risk_score: profile.risk_score,
            is_vpn: profile.is_vpn,
            is_proxy: profile.is_proxy,
            is_tor: profile.is_tor,
            timestamp: Utc::now(),
            related_signal_id: None,
        };

        if location.risk_score >= 70 {
            log::info!(
                "High-risk location {} -> {} ({}) risk={} type={}",
                ip,
                location.location.city,
                location.location.country,
                location.risk_score,
                location.threat_type.as_str()
            );
        }
        location
    }

    /// Append to the threat log, evicting the oldest entry past capacity
    pub fn log_threat_location(
        &self,
        mut location: ThreatLocation,
        related_signal_id: Option<&str>,
    ) -> ThreatLocation {
        if related_signal_id.is_some() {
            location.related_signal_id = related_signal_id.map(str::to_string);
        }
        location.timestamp = Utc::now();

        let mut log = self.threat_log.write();
        log.push_back(location.clone());
        self.logged.fetch_add(1, Ordering::SeqCst);
        while log.len() > THREAT_LOG_CAPACITY {
            log.pop_front();
        }
        location
    }

    /// Most recent threat locations, oldest first
    pub fn recent_threats(&self, limit: usize) -> Vec<ThreatLocation> {
        let log = self.threat_log.read();
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    pub fn threat_count(&self) -> usize {
        self.threat_log.read().len()
    }

    /// Threat locations ever logged (survives FIFO eviction)
    pub fn total_logged(&self) -> u64 {
        self.logged.load(Ordering::SeqCst)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.read().len()
    }

    /// Aggregate stats, computed on demand from the log
    pub fn threat_stats(&self, high_risk_threshold: u8) -> ThreatStats {
        let log = self.threat_log.read();
        let mut stats = ThreatStats::default();
        let mut risk_sum = 0u64;

        for threat in log.iter() {
            stats.total += 1;
            risk_sum += threat.risk_score as u64;
            *stats.by_country.entry(threat.location.country.clone()).or_insert(0) += 1;
            *stats.by_threat_type.entry(threat.threat_type.as_str().to_string()).or_insert(0) += 1;
            if threat.is_vpn {
                stats.vpn_count += 1;
            }
            if threat.is_proxy {
                stats.proxy_count += 1;
            }
            if threat.is_tor {
                stats.tor_count += 1;
            }
            if threat.risk_score >= high_risk_threshold {
                stats.high_risk_count += 1;
            }
        }

        if stats.total > 0 {
            stats.average_risk = risk_sum as f64 / stats.total as f64;
        }
        stats
    }
}

// ============================================================================
// TESTS
// ============================================================================
