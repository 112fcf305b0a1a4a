//! Withdrawal intents emitted by the execution layer.
//!
//! An intent is immutable once emitted. The settlement engine consumes it
//! read-only and must be able to turn it into exactly one payment on the
//! settlement ledger; [`WithdrawalIntent::is_constructible`] captures the
//! structural part of that requirement.

use serde::{Deserialize, Serialize};

use crate::{Amount, Asset, AssetId, UserId, WithdrawalId, constants};

/// A request to move `amount` of `asset` from the treasury to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalIntent {
    pub id: WithdrawalId,
    /// Execution-layer account that burned/locked the funds.
    pub source_user: UserId,
    pub asset: Asset,
    /// Amount in the asset's smallest unit. Must be > 0 at emission.
    pub amount: Amount,
    /// Settlement-ledger account that receives the funds.
    pub destination: String,
}

impl WithdrawalIntent {
    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        self.asset.id()
    }

    /// Positive amount and a resolvable destination.
    #[must_use]
    pub fn is_constructible(&self) -> bool {
        self.amount > 0 && is_resolvable_destination(&self.destination)
    }
}

/// A destination is resolvable when it has the shape of a settlement-ledger
/// address: 56 characters of RFC 4648 base32, starting with `G` (account)
/// or `C` (contract).
#[must_use]
pub fn is_resolvable_destination(destination: &str) -> bool {
    destination.len() == constants::ADDRESS_LEN
        && destination.starts_with(['G', 'C'])
        && destination
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

#[cfg(any(test, feature = "test-helpers"))]
impl WithdrawalIntent {
    /// A constructible intent with a deterministic id and destination.
    #[must_use]
    pub fn dummy(seq: u128, asset: Asset, amount: Amount) -> Self {
        Self {
            id: WithdrawalId::from_u128(seq),
            source_user: UserId::new(),
            asset,
            amount,
            destination: dummy_address(seq),
        }
    }
}

/// A well-formed account address derived from `seed`.
#[cfg(any(test, feature = "test-helpers"))]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn dummy_address(seed: u128) -> String {
    const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut out = String::with_capacity(constants::ADDRESS_LEN);
    out.push('G');
    let mut x = seed;
    for _ in 1..constants::ADDRESS_LEN {
        out.push(ALPHABET[(x % 32) as usize] as char);
        x /= 32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_intent_is_constructible() {
        let w = WithdrawalIntent::dummy(1, Asset::native(), 10);
        assert!(w.is_constructible());
        assert_eq!(w.asset_id(), Asset::native().id());
    }

    #[test]
    fn zero_or_negative_amount_not_constructible() {
        let mut w = WithdrawalIntent::dummy(1, Asset::native(), 0);
        assert!(!w.is_constructible());
        w.amount = -5;
        assert!(!w.is_constructible());
    }

    #[test]
    fn destination_shape() {
        assert!(is_resolvable_destination(&dummy_address(77)));
        let contract = format!("C{}", "A".repeat(55));
        assert!(is_resolvable_destination(&contract));

        assert!(!is_resolvable_destination(""));
        assert!(!is_resolvable_destination("GABC"));
        assert!(!is_resolvable_destination(&format!("X{}", "A".repeat(55))));
        assert!(!is_resolvable_destination(&format!("G{}", "a".repeat(55))));
        assert!(!is_resolvable_destination(&format!("G{}1", "A".repeat(54))));
    }

    #[test]
    fn serde_roundtrip_keeps_i128_amount() {
        let w = WithdrawalIntent::dummy(3, Asset::issued("USDC", [4u8; 32]), i128::from(u64::MAX) * 4);
        let json = serde_json::to_string(&w).unwrap();
        let back: WithdrawalIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(w, back);
    }
}
