//! Subnet registry.
//!
//! Creates subnets and registers their treasury vault. A subnet's id is
//! derived from its creation parameters, so registering the same auditor
//! set, threshold and whitelist twice is rejected.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use pom_types::{
    Asset, AuditorId, PomError, Result, Subnet, SubnetId, constants, is_resolvable_destination,
};
use sha2::{Digest, Sha256};

/// Derive a subnet id from its creation parameters.
///
/// Auditors are hashed in sorted order; the whitelist keeps its
/// registration order.
#[must_use]
pub fn derive_subnet_id(auditors: &BTreeSet<AuditorId>, threshold: u32, whitelist: &[Asset]) -> SubnetId {
    let mut hasher = Sha256::new();
    hasher.update(b"pom:subnet:v1:");
    hasher.update((auditors.len() as u64).to_le_bytes());
    for a in auditors {
        hasher.update(a.as_bytes());
    }
    hasher.update(threshold.to_le_bytes());
    hasher.update((whitelist.len() as u64).to_le_bytes());
    for asset in whitelist {
        hasher.update(asset.id().0);
    }
    SubnetId(hasher.finalize().into())
}

/// All registered subnets.
pub struct SubnetRegistry {
    subnets: HashMap<SubnetId, Subnet>,
}

impl SubnetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subnets: HashMap::new(),
        }
    }

    /// Register a new, inactive subnet.
    ///
    /// # Errors
    /// - `InvalidAuditorSet` with fewer than 3 auditors or duplicates
    /// - `InvalidThreshold` outside `[floor(n/2)+1, n]`
    /// - `SubnetAlreadyExists` for identical parameters
    pub fn create_subnet(
        &mut self,
        auditors: &[AuditorId],
        threshold: u32,
        whitelist: Vec<Asset>,
    ) -> Result<SubnetId> {
        let set: BTreeSet<AuditorId> = auditors.iter().copied().collect();
        if set.len() != auditors.len() {
            return Err(PomError::InvalidAuditorSet {
                reason: "duplicate auditor identity".into(),
            });
        }
        if set.len() < constants::MIN_AUDITORS {
            return Err(PomError::InvalidAuditorSet {
                reason: format!(
                    "{} auditors, need at least {}",
                    set.len(),
                    constants::MIN_AUDITORS
                ),
            });
        }
        let t = threshold as usize;
        if t < Subnet::min_threshold(set.len()) || t > set.len() {
            return Err(PomError::InvalidThreshold {
                threshold,
                auditors: set.len(),
            });
        }

        let id = derive_subnet_id(&set, threshold, &whitelist);
        if self.subnets.contains_key(&id) {
            return Err(PomError::SubnetAlreadyExists(id));
        }
        tracing::info!(subnet = %id, auditors = set.len(), threshold, "subnet created");
        self.subnets.insert(
            id,
            Subnet {
                id,
                auditors: set,
                threshold,
                whitelist,
                treasury: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Register the treasury vault, activating the subnet. Allowed once.
    ///
    /// # Errors
    /// - `SubnetNotFound`
    /// - `TreasuryAlreadyRegistered` on a second registration
    /// - `InvalidTreasuryAddress` if `address` is not a ledger address
    pub fn register_treasury(&mut self, subnet_id: &SubnetId, address: &str) -> Result<()> {
        let subnet = self
            .subnets
            .get_mut(subnet_id)
            .ok_or(PomError::SubnetNotFound(*subnet_id))?;
        if subnet.treasury.is_some() {
            return Err(PomError::TreasuryAlreadyRegistered(*subnet_id));
        }
        if !is_resolvable_destination(address) {
            return Err(PomError::InvalidTreasuryAddress(address.to_string()));
        }
        subnet.treasury = Some(address.to_string());
        tracing::info!(subnet = %subnet_id, "treasury registered, subnet active");
        Ok(())
    }

    /// # Errors
    /// `SubnetNotFound`.
    pub fn get(&self, subnet_id: &SubnetId) -> Result<&Subnet> {
        self.subnets
            .get(subnet_id)
            .ok_or(PomError::SubnetNotFound(*subnet_id))
    }

    /// Look up a subnet that has a treasury.
    ///
    /// # Errors
    /// `SubnetNotFound` or `SubnetInactive`.
    pub fn get_active(&self, subnet_id: &SubnetId) -> Result<&Subnet> {
        let subnet = self.get(subnet_id)?;
        if !subnet.is_active() {
            return Err(PomError::SubnetInactive(*subnet_id));
        }
        Ok(subnet)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

impl Default for SubnetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pom_types::dummy_address;

    use super::*;

    fn auditors(n: u8) -> Vec<AuditorId> {
        (1..=n).map(|i| AuditorId([i; 32])).collect()
    }

    #[test]
    fn create_and_activate() {
        let mut reg = SubnetRegistry::new();
        let id = reg.create_subnet(&auditors(3), 2, vec![Asset::native()]).unwrap();
        assert!(matches!(reg.get_active(&id), Err(PomError::SubnetInactive(_))));
        reg.register_treasury(&id, &dummy_address(77)).unwrap();
        assert!(reg.get_active(&id).unwrap().is_active());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn too_few_auditors() {
        let mut reg = SubnetRegistry::new();
        let err = reg.create_subnet(&auditors(2), 2, vec![]).unwrap_err();
        assert!(matches!(err, PomError::InvalidAuditorSet { .. }));
    }

    #[test]
    fn duplicate_auditors() {
        let mut reg = SubnetRegistry::new();
        let mut a = auditors(3);
        a.push(a[0]);
        let err = reg.create_subnet(&a, 3, vec![]).unwrap_err();
        assert!(matches!(err, PomError::InvalidAuditorSet { .. }));
    }

    #[test]
    fn threshold_bounds() {
        let mut reg = SubnetRegistry::new();
        assert!(matches!(
            reg.create_subnet(&auditors(3), 1, vec![]),
            Err(PomError::InvalidThreshold { threshold: 1, auditors: 3 })
        ));
        assert!(matches!(
            reg.create_subnet(&auditors(3), 4, vec![]),
            Err(PomError::InvalidThreshold { .. })
        ));
        assert!(reg.create_subnet(&auditors(4), 3, vec![]).is_ok());
        assert!(reg.create_subnet(&auditors(3), 3, vec![]).is_ok());
    }

    #[test]
    fn identical_parameters_rejected() {
        let mut reg = SubnetRegistry::new();
        let id = reg.create_subnet(&auditors(3), 2, vec![Asset::native()]).unwrap();
        // Auditor order does not matter.
        let mut reversed = auditors(3);
        reversed.reverse();
        let err = reg
            .create_subnet(&reversed, 2, vec![Asset::native()])
            .unwrap_err();
        assert!(matches!(err, PomError::SubnetAlreadyExists(dup) if dup == id));
        // A different threshold is a different subnet.
        assert!(reg.create_subnet(&auditors(3), 3, vec![Asset::native()]).is_ok());
    }

    #[test]
    fn treasury_registered_once() {
        let mut reg = SubnetRegistry::new();
        let id = reg.create_subnet(&auditors(3), 2, vec![]).unwrap();
        reg.register_treasury(&id, &dummy_address(1)).unwrap();
        assert!(matches!(
            reg.register_treasury(&id, &dummy_address(2)),
            Err(PomError::TreasuryAlreadyRegistered(_))
        ));
    }

    #[test]
    fn treasury_address_must_resolve() {
        let mut reg = SubnetRegistry::new();
        let id = reg.create_subnet(&auditors(3), 2, vec![]).unwrap();
        assert!(matches!(
            reg.register_treasury(&id, "not-an-address"),
            Err(PomError::InvalidTreasuryAddress(_))
        ));
        assert!(!reg.get(&id).unwrap().is_active());
    }

    #[test]
    fn unknown_subnet() {
        let mut reg = SubnetRegistry::new();
        let ghost = SubnetId([9u8; 32]);
        assert!(matches!(reg.get(&ghost), Err(PomError::SubnetNotFound(_))));
        assert!(matches!(
            reg.register_treasury(&ghost, &dummy_address(1)),
            Err(PomError::SubnetNotFound(_))
        ));
    }
}
