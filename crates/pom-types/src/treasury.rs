//! Treasury snapshot read from the settlement ledger.
//!
//! A snapshot is read fresh before every commit or settlement decision and
//! is never cached across decisions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, AssetId, AuditorId, PomError, Result};

/// Balances and signer configuration of the treasury vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasurySnapshot {
    pub balances: BTreeMap<AssetId, Amount>,
    /// Current signer identities on the vault account.
    pub signers: Vec<AuditorId>,
    /// Current signature threshold on the vault account.
    pub threshold: u32,
    pub fetched_at: DateTime<Utc>,
}

impl TreasurySnapshot {
    /// Build a snapshot from the parallel arrays of the `commit` interface.
    ///
    /// # Errors
    /// [`PomError::InvalidTreasurySnapshot`] if the arrays differ in length,
    /// an asset id repeats, or a balance is negative.
    pub fn from_parallel(
        asset_ids: &[AssetId],
        balances: &[Amount],
        signers: &[AuditorId],
        threshold: u32,
    ) -> Result<Self> {
        if asset_ids.len() != balances.len() {
            return Err(PomError::InvalidTreasurySnapshot {
                reason: format!(
                    "{} asset ids but {} balances",
                    asset_ids.len(),
                    balances.len()
                ),
            });
        }
        let mut map = BTreeMap::new();
        for (id, bal) in asset_ids.iter().zip(balances) {
            if *bal < 0 {
                return Err(PomError::InvalidTreasurySnapshot {
                    reason: format!("negative balance {bal} for {id}"),
                });
            }
            if map.insert(*id, *bal).is_some() {
                return Err(PomError::InvalidTreasurySnapshot {
                    reason: format!("duplicate asset {id}"),
                });
            }
        }
        Ok(Self {
            balances: map,
            signers: signers.to_vec(),
            threshold,
            fetched_at: Utc::now(),
        })
    }

    /// Balance of `asset`; a missing entry counts as zero.
    #[must_use]
    pub fn balance(&self, asset: &AssetId) -> Amount {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// Whether the vault holds the asset directly (has a balance entry).
    #[must_use]
    pub fn holds(&self, asset: &AssetId) -> bool {
        self.balances.contains_key(asset)
    }

    /// Distinct signer set, for comparing authorization between snapshots.
    #[must_use]
    pub fn signer_set(&self) -> BTreeSet<AuditorId> {
        self.signers.iter().copied().collect()
    }

    /// Same signer set and threshold as `other`. Balances are ignored.
    #[must_use]
    pub fn same_authorization(&self, other: &Self) -> bool {
        self.threshold == other.threshold && self.signer_set() == other.signer_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parallel_builds_map() {
        let a = AssetId([1u8; 32]);
        let b = AssetId([2u8; 32]);
        let snap = TreasurySnapshot::from_parallel(&[a, b], &[100, 200], &[], 0).unwrap();
        assert_eq!(snap.balance(&a), 100);
        assert_eq!(snap.balance(&b), 200);
        assert_eq!(snap.balance(&AssetId([3u8; 32])), 0);
        assert!(snap.holds(&a));
        assert!(!snap.holds(&AssetId([3u8; 32])));
    }

    #[test]
    fn from_parallel_rejects_length_mismatch() {
        let err = TreasurySnapshot::from_parallel(&[AssetId([1u8; 32])], &[], &[], 0).unwrap_err();
        assert!(matches!(err, PomError::InvalidTreasurySnapshot { .. }));
    }

    #[test]
    fn from_parallel_rejects_duplicates_and_negatives() {
        let a = AssetId([1u8; 32]);
        assert!(TreasurySnapshot::from_parallel(&[a, a], &[1, 2], &[], 0).is_err());
        assert!(TreasurySnapshot::from_parallel(&[a], &[-1], &[], 0).is_err());
    }

    #[test]
    fn authorization_comparison_ignores_order_and_balances() {
        let s1 = AuditorId([1u8; 32]);
        let s2 = AuditorId([2u8; 32]);
        let a = AssetId([1u8; 32]);
        let x = TreasurySnapshot::from_parallel(&[a], &[5], &[s1, s2], 2).unwrap();
        let y = TreasurySnapshot::from_parallel(&[a], &[9], &[s2, s1], 2).unwrap();
        assert!(x.same_authorization(&y));
        let z = TreasurySnapshot::from_parallel(&[a], &[5], &[s1, s2], 1).unwrap();
        assert!(!x.same_authorization(&z));
    }
}
