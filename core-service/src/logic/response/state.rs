//! Protective State
//!
//! Blocked IPs, flagged merchants and pending escalations. Membership changes
//! are single atomic operations under one write lock, so "check then insert"
//! never races.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::RESPONSE_HISTORY_CAPACITY;
use super::types::Escalation;

#[derive(Debug, Default)]
pub struct ProtectiveState {
    blocked_ips: RwLock<BTreeSet<String>>,
    flagged_merchants: RwLock<BTreeSet<String>>,
    escalations: RwLock<VecDeque<Escalation>>,
}

/// Counts used for before/after diffs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveCounts {
    pub blocked_ips: usize,
    pub flagged_merchants: usize,
    pub escalations: usize,
}

impl ProtectiveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Self {
        Self {
            blocked_ips: RwLock::new(self.blocked_ips.read().clone()),
            flagged_merchants: RwLock::new(self.flagged_merchants.read().clone()),
            escalations: RwLock::new(self.escalations.read().clone()),
        }
    }

    /// Returns true if the IP was newly blocked
    pub fn block_ip(&self, ip: &str) -> bool {
        self.blocked_ips.write().insert(ip.to_string())
    }

    /// Returns false if the IP was not blocked
    pub fn unblock_ip(&self, ip: &str) -> bool {
        self.blocked_ips.write().remove(ip)
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked_ips.read().contains(ip)
    }

    pub fn flag_merchant(&self, merchant_id: &str) -> bool {
        self.flagged_merchants.write().insert(merchant_id.to_string())
    }

    pub fn unflag_merchant(&self, merchant_id: &str) -> bool {
        self.flagged_merchants.write().remove(merchant_id)
    }

    pub fn is_flagged(&self, merchant_id: &str) -> bool {
        self.flagged_merchants.read().contains(merchant_id)
    }

    pub fn escalate(&self, escalation: Escalation) {
        let mut log = self.escalations.write();
        log.push_back(escalation);
        while log.len() > RESPONSE_HISTORY_CAPACITY {
            log.pop_front();
        }
    }

    pub fn blocked_ips(&self) -> Vec<String> {
        self.blocked_ips.read().iter().cloned().collect()
    }

    pub fn flagged_merchants(&self) -> Vec<String> {
        self.flagged_merchants.read().iter().cloned().collect()
    }

    pub fn escalations(&self) -> Vec<Escalation> {
        self.escalations.read().iter().cloned().collect()
    }

    pub fn counts(&self) -> ProtectiveCounts {
        ProtectiveCounts {
            blocked_ips: self.blocked_ips.read().len(),
            flagged_merchants: self.flagged_merchants.read().len(),
            escalations: self.escalations.read().len(),
        }
    }
}
