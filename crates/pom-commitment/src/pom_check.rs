//! Proof-of-Money validation at commit time.
//!
//! A commitment is accepted only if the treasury snapshot proves the
//! period's withdrawals are payable:
//!
//! 1. **Constructibility**: every withdrawal maps to a valid payment.
//! 2. **Solvency**: the vault covers the authorized outflow per asset.
//! 3. **Authorization**: the vault's signer configuration is controlled by
//!    the subnet's auditors at least as strictly as the subnet requires.
//!
//! Checks are fail-closed: the first violation rejects the commit.

use pom_types::{
    PomDelta, PomError, Result, Subnet, TreasurySnapshot, WithdrawalIntent,
    is_resolvable_destination,
};

/// Every withdrawal has a positive amount, a resolvable destination and a
/// whitelisted asset.
///
/// # Errors
/// `NotConstructible` naming the first offending withdrawal.
pub fn check_constructible(subnet: &Subnet, withdrawals: &[WithdrawalIntent]) -> Result<()> {
    for w in withdrawals {
        let reason = if w.amount <= 0 {
            format!("non-positive amount {}", w.amount)
        } else if !is_resolvable_destination(&w.destination) {
            format!("unresolvable destination {:?}", w.destination)
        } else if !subnet.is_whitelisted(&w.asset_id()) {
            format!("asset {} not whitelisted", w.asset)
        } else {
            continue;
        };
        return Err(PomError::NotConstructible {
            withdrawal: w.id,
            reason,
        });
    }
    Ok(())
}

/// Treasury balance ≥ outflow for every asset. A missing balance is zero.
///
/// # Errors
/// `Insolvent` for the first under-funded asset.
pub fn check_solvency(authorized: &PomDelta, treasury: &TreasurySnapshot) -> Result<()> {
    for (asset, required) in authorized.iter() {
        let available = treasury.balance(asset);
        if available < *required {
            return Err(PomError::Insolvent {
                asset: *asset,
                required: *required,
                available,
            });
        }
    }
    Ok(())
}

/// The vault's threshold is at least 1, at least the subnet threshold and
/// reachable by its signers; enough of those signers are subnet auditors to
/// meet it.
///
/// # Errors
/// `Unauthorized`.
pub fn check_authorization(subnet: &Subnet, treasury: &TreasurySnapshot) -> Result<()> {
    let threshold = treasury.threshold;
    let signers = treasury.signer_set();
    if threshold == 0 {
        return Err(PomError::Unauthorized {
            reason: "treasury threshold is zero".into(),
        });
    }
    if threshold < subnet.threshold {
        return Err(PomError::Unauthorized {
            reason: format!(
                "treasury threshold {threshold} below subnet threshold {}",
                subnet.threshold
            ),
        });
    }
    if threshold as usize > signers.len() {
        return Err(PomError::Unauthorized {
            reason: format!(
                "treasury threshold {threshold} exceeds {} signers",
                signers.len()
            ),
        });
    }
    let auditors = signers.iter().filter(|s| subnet.is_auditor(s)).count();
    if auditors < threshold as usize {
        return Err(PomError::Unauthorized {
            reason: format!("{auditors} auditor signers on vault, threshold {threshold}"),
        });
    }
    Ok(())
}

/// Run all three checks in order.
///
/// # Errors
/// The first failing check's error.
pub fn validate_pom(
    subnet: &Subnet,
    withdrawals: &[WithdrawalIntent],
    authorized: &PomDelta,
    treasury: &TreasurySnapshot,
) -> Result<()> {
    check_constructible(subnet, withdrawals)?;
    check_solvency(authorized, treasury)?;
    check_authorization(subnet, treasury)
}
