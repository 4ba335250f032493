//! Geo-Threat Enricher
//!
//! Maps an IP address to a location / risk profile and keeps a bounded log
//! of threat locations.
//!
//! # Components
//! - `types.rs`: GeoLocation, GeoProfile, ThreatLocation, ThreatStats
//! - `resolver.rs`: Pluggable `GeoResolver` + the deterministic synthetic resolver
//! - `enricher.rs`: Cached lookups, threat log, on-demand stats

pub mod types;
pub mod resolver;
pub mod enricher;

pub use types::{GeoLocation, GeoProfile, ThreatLocation, ThreatStats, ThreatType};
pub use resolver::{GeoResolver, SyntheticGeoResolver, synthetic_source_ip};
pub use enricher::GeoThreatEnricher;
