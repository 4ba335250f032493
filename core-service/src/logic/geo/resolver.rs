//! Geo Resolvers
//!
//! `GeoResolver` is the seam where a real geo-IP source plugs in.
//! `SyntheticGeoResolver` buckets IPs deterministically into fixed regional
//! profiles so the rest of the pipeline behaves identically across runs.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::logic::detector::SignalType;
use crate::logic::severity::Severity;
use super::types::{GeoLocation, GeoProfile};

// ============================================================================
// RESOLVER TRAIT
// ============================================================================

/// Maps an IP string to a location / risk profile. Must not fail.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, ip: &str) -> GeoProfile;
}

// ============================================================================
// REGION PROFILES
// ============================================================================

struct RegionProfile {
    country: &'static str,
    region: &'static str,
    city: &'static str,
    coordinates: (f64, f64),
    isp: &'static str,
    base_risk: u8,
}

const REGION_PROFILES: &[RegionProfile] = &[
    RegionProfile { country: "US", region: "California", city: "San Francisco", coordinates: (37.7749, -122.4194), isp: "Comcast Cable", base_risk: 15 },
    RegionProfile { country: "GB", region: "England", city: "London", coordinates: (51.5074, -0.1278), isp: "BT Group", base_risk: 20 },
    RegionProfile { country: "DE", region: "Hesse", city: "Frankfurt", coordinates: (50.1109, 8.6821), isp: "Deutsche Telekom", base_risk: 18 },
    RegionProfile { country: "NL", region: "North Holland", city: "Amsterdam", coordinates: (52.3676, 4.9041), isp: "LeaseWeb Hosting", base_risk: 45 },
    RegionProfile { country: "BR", region: "Sao Paulo", city: "Sao Paulo", coordinates: (-23.5505, -46.6333), isp: "Vivo", base_risk: 55 },
    RegionProfile { country: "RO", region: "Bucharest", city: "Bucharest", coordinates: (44.4268, 26.1025), isp: "RCS & RDS", base_risk: 60 },
    RegionProfile { country: "NG", region: "Lagos", city: "Lagos", coordinates: (6.5244, 3.3792), isp: "MTN Nigeria", base_risk: 75 },
    RegionProfile { country: "CN", region: "Guangdong", city: "Shenzhen", coordinates: (22.5431, 114.0579), isp: "China Telecom", base_risk: 70 },
    RegionProfile { country: "RU", region: "Moscow", city: "Moscow", coordinates: (55.7558, 37.6173), isp: "Rostelecom", base_risk: 80 },
    RegionProfile { country: "VN", region: "Ho Chi Minh", city: "Ho Chi Minh City", coordinates: (10.8231, 106.6297), isp: "Viettel", base_risk: 50 },
];

/// Risk variance applied around a profile's base risk
pub const RISK_VARIANCE: i32 = 15;

// ============================================================================
// SYNTHETIC RESOLVER
// ============================================================================

/// Deterministic resolver keyed by a hash of the IP's last octet
#[derive(Debug, Default, Clone)]
pub struct SyntheticGeoResolver;

impl SyntheticGeoResolver {
    pub fn profile_for(ip: &str) -> GeoProfile {
        let octet = last_octet(ip);
        let bucket = crc32fast::hash(octet.to_string().as_bytes()) as usize % REGION_PROFILES.len();
        let profile = &REGION_PROFILES[bucket];

        let variance = (octet as i32 * 7) % (2 * RISK_VARIANCE + 1) - RISK_VARIANCE;
        let risk_score = (profile.base_risk as i32 + variance).clamp(0, 100) as u8;

        GeoProfile {
            location: GeoLocation {
                country: profile.country.to_string(),
                region: profile.region.to_string(),
                city: profile.city.to_string(),
                coordinates: profile.coordinates,
                isp: profile.isp.to_string(),
            },
            risk_score,
            is_vpn: risk_score > 60 && octet % 3 == 0,
            is_proxy: risk_score > 50 && octet % 5 == 0,
            is_tor: risk_score > 75 && octet % 7 == 0,
        }
    }
}

#[async_trait]
impl GeoResolver for SyntheticGeoResolver {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn resolve(&self, ip: &str) -> GeoProfile {
        Self::profile_for(ip)
    }
}

/// Last octet of an IP; unparseable input falls back to a hash byte
pub fn last_octet(ip: &str) -> u8 {
    match ip.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.octets()[3],
        Ok(IpAddr::V6(v6)) => v6.octets()[15],
        Err(_) => (crc32fast::hash(ip.as_bytes()) & 0xff) as u8,
    }
}

/// Stand-in source IP for a signal. Webhook events carry no client IP, so the
/// address is derived from signal type and severity only.
pub fn synthetic_source_ip(signal_type: SignalType, severity: Severity) -> String {
    const FIRST_OCTETS: [u8; 5] = [185, 45, 103, 91, 196];

    let rank = match severity {
        Severity::Low => 0u8,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    };
    let key = format!("{}:{}", signal_type.as_str(), severity.as_str());

    format!(
        "{}.{}.{}.{}",
        FIRST_OCTETS[signal_type.index() as usize],
        10 + rank * 40,
        crc32fast::hash(signal_type.as_str().as_bytes()) % 256,
        crc32fast::hash(key.as_bytes()) % 254 + 1,
    )
}

// ============================================================================
// TESTS
// ============================================================================
