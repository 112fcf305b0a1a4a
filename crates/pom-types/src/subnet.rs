//! Subnet model: a tenant with its own auditor quorum and asset whitelist.
//!
//! ```text
//!   create_subnet()          register_treasury()
//!  ───────────────▶ INACTIVE ───────────────────▶ ACTIVE
//! ```
//!
//! A subnet is immutable apart from the one-time treasury registration.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Asset, AssetId, AuditorId, SubnetId};

/// A registered subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    /// Unique auditor identities (≥ 3).
    pub auditors: BTreeSet<AuditorId>,
    /// Signatures required to commit (≥ floor(n/2)+1, ≤ n).
    pub threshold: u32,
    /// Assets this subnet may withdraw, in registration order.
    pub whitelist: Vec<Asset>,
    /// Treasury vault address on the settlement ledger. Set once.
    pub treasury: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subnet {
    /// Smallest threshold accepted for `n` auditors: a strict majority.
    #[must_use]
    pub fn min_threshold(n: usize) -> usize {
        n / 2 + 1
    }

    /// Active once the treasury vault has been registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.treasury.is_some()
    }

    #[must_use]
    pub fn is_auditor(&self, id: &AuditorId) -> bool {
        self.auditors.contains(id)
    }

    /// Number of *distinct* registered auditors among `signers`.
    /// Unregistered identities are ignored.
    #[must_use]
    pub fn count_valid_signers(&self, signers: &[AuditorId]) -> usize {
        signers
            .iter()
            .filter(|s| self.auditors.contains(*s))
            .collect::<BTreeSet<_>>()
            .len()
    }

    #[must_use]
    pub fn is_whitelisted(&self, asset: &AssetId) -> bool {
        self.whitelist.iter().any(|a| a.id() == *asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(auditors: &[AuditorId]) -> Subnet {
        Subnet {
            id: SubnetId([0u8; 32]),
            auditors: auditors.iter().copied().collect(),
            threshold: 2,
            whitelist: vec![Asset::native()],
            treasury: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn min_threshold_is_strict_majority() {
        assert_eq!(Subnet::min_threshold(3), 2);
        assert_eq!(Subnet::min_threshold(4), 3);
        assert_eq!(Subnet::min_threshold(5), 3);
    }

    #[test]
    fn counts_distinct_registered_signers_only() {
        let a = AuditorId([1u8; 32]);
        let b = AuditorId([2u8; 32]);
        let c = AuditorId([3u8; 32]);
        let outsider = AuditorId([9u8; 32]);
        let s = subnet(&[a, b, c]);
        assert_eq!(s.count_valid_signers(&[a, b]), 2);
        assert_eq!(s.count_valid_signers(&[a, a, a]), 1);
        assert_eq!(s.count_valid_signers(&[a, outsider]), 1);
        assert_eq!(s.count_valid_signers(&[]), 0);
    }

    #[test]
    fn activation_follows_treasury() {
        let mut s = subnet(&[AuditorId([1u8; 32])]);
        assert!(!s.is_active());
        s.treasury = Some("GTREASURY".into());
        assert!(s.is_active());
    }

    #[test]
    fn whitelist_lookup_by_id() {
        let s = subnet(&[]);
        assert!(s.is_whitelisted(&Asset::native().id()));
        assert!(!s.is_whitelisted(&Asset::issued("USDC", [1u8; 32]).id()));
    }
}
