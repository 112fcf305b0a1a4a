//! PoM delta computation and verification.
//!
//! ```text
//! compute_net_outflow(&[WithdrawalIntent]) -> PomDelta
//! verify_delta_match(planned, authorized) -> Result<()>
//! ```
//!
//! Both sides of the bridge run `compute_net_outflow` independently; the
//! result depends only on the multiset of withdrawals, never on their order.
//! `verify_delta_match` is the single check that stops a buggy or
//! compromised planner from moving more than the execution layer sanctioned.

use pom_types::{PomDelta, PomError, Result, WithdrawalIntent};

/// Total outflow per asset id. Empty queue → empty delta.
///
/// # Errors
/// - [`PomError::NotConstructible`] for a non-positive amount
/// - [`PomError::AmountOverflow`] if any per-asset sum exceeds `i128`
pub fn compute_net_outflow(withdrawals: &[WithdrawalIntent]) -> Result<PomDelta> {
    let mut delta = PomDelta::new();
    for w in withdrawals {
        if w.amount <= 0 {
            return Err(PomError::NotConstructible {
                withdrawal: w.id,
                reason: format!("amount must be positive, got {}", w.amount),
            });
        }
        delta.add(w.asset_id(), w.amount)?;
    }
    Ok(delta)
}

/// Exact equality of planned and authorized outflow over the union of keys.
///
/// # Errors
/// [`PomError::PomMismatch`] naming every asset that differs. An asset absent
/// on one side is reported as `missing`; no tolerance is applied.
pub fn verify_delta_match(planned: &PomDelta, authorized: &PomDelta) -> Result<()> {
    let mut diffs = Vec::new();
    for asset in planned.union_keys(authorized) {
        match (planned.get(asset), authorized.get(asset)) {
            (Some(p), Some(a)) if p == a => {}
            (Some(p), Some(a)) => diffs.push(format!("{asset}: planned {p} != authorized {a}")),
            (Some(p), None) => diffs.push(format!("{asset}: planned {p}, authorized missing")),
            (None, Some(a)) => diffs.push(format!("{asset}: planned missing, authorized {a}")),
            (None, None) => {}
        }
    }
    if diffs.is_empty() {
        Ok(())
    } else {
        tracing::error!(mismatches = diffs.len(), "PoM delta mismatch");
        Err(PomError::PomMismatch {
            reason: diffs.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use pom_types::{Amount, Asset, AssetId};
    use rand::seq::SliceRandom;

    use super::*;

    fn usdc() -> Asset {
        Asset::issued("USDC", [1u8; 32])
    }

    fn queue() -> Vec<WithdrawalIntent> {
        vec![
            WithdrawalIntent::dummy(1, Asset::native(), 100),
            WithdrawalIntent::dummy(2, usdc(), 250),
            WithdrawalIntent::dummy(3, Asset::native(), 50),
            WithdrawalIntent::dummy(4, usdc(), 1),
        ]
    }

    #[test]
    fn empty_queue_empty_delta() {
        let delta = compute_net_outflow(&[]).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn sums_per_asset() {
        let q = queue();
        let delta = compute_net_outflow(&q).unwrap();
        assert_eq!(delta.len(), 2);
        for asset in [Asset::native(), usdc()] {
            let expected: Amount = q
                .iter()
                .filter(|w| w.asset == asset)
                .map(|w| w.amount)
                .sum();
            assert_eq!(delta.amount(&asset.id()), expected);
        }
    }

    #[test]
    fn order_independent() {
        let mut q = queue();
        let reference = compute_net_outflow(&q).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            q.shuffle(&mut rng);
            assert_eq!(compute_net_outflow(&q).unwrap(), reference);
        }
    }

    #[test]
    fn overflow_is_reported() {
        let q = vec![
            WithdrawalIntent::dummy(1, Asset::native(), Amount::MAX),
            WithdrawalIntent::dummy(2, Asset::native(), 1),
        ];
        assert!(matches!(
            compute_net_outflow(&q),
            Err(PomError::AmountOverflow)
        ));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        for amount in [0, -40] {
            let mut q = queue();
            q.push(WithdrawalIntent::dummy(9, Asset::native(), amount));
            let err = compute_net_outflow(&q).unwrap_err();
            assert!(
                matches!(err, PomError::NotConstructible { .. }),
                "amount {amount}: {err}"
            );
        }
    }

    #[test]
    fn verify_is_reflexive() {
        let delta = compute_net_outflow(&queue()).unwrap();
        assert!(verify_delta_match(&delta, &delta).is_ok());
        assert!(verify_delta_match(&PomDelta::new(), &PomDelta::new()).is_ok());
    }

    #[test]
    fn verify_rejects_value_difference() {
        let authorized = compute_net_outflow(&queue()).unwrap();
        let mut planned = authorized.clone();
        planned.add(Asset::native().id(), 1).unwrap();
        let err = verify_delta_match(&planned, &authorized).unwrap_err();
        assert!(matches!(err, PomError::PomMismatch { .. }));

        // Less than authorized is a mismatch too.
        let smaller = compute_net_outflow(&queue()[..3]).unwrap();
        assert!(verify_delta_match(&smaller, &authorized).is_err());
    }

    #[test]
    fn verify_rejects_missing_keys_either_side() {
        let authorized = compute_net_outflow(&queue()).unwrap();
        let mut planned = authorized.clone();
        planned.add(AssetId([0xee; 32]), 5).unwrap();
        assert!(verify_delta_match(&planned, &authorized).is_err());
        assert!(verify_delta_match(&authorized, &planned).is_err());

        let only_native =
            compute_net_outflow(&[WithdrawalIntent::dummy(1, Asset::native(), 150)]).unwrap();
        let err = verify_delta_match(&only_native, &authorized).unwrap_err();
        let PomError::PomMismatch { reason } = err else {
            panic!("expected PomMismatch");
        };
        assert!(reason.contains("planned missing"), "{reason}");
    }

    #[test]
    fn zero_entry_is_not_absence() {
        let a = Asset::native().id();
        let authorized: PomDelta = [(a, 0)].into_iter().collect();
        assert!(verify_delta_match(&PomDelta::new(), &authorized).is_err());
    }
}
