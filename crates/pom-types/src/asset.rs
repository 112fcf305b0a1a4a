//! Asset model and canonical asset identifiers.
//!
//! An asset is a `(code, issuer)` pair where the issuer is either a 32-byte
//! settlement-ledger account key or the native-asset sentinel. Both sides of
//! the bridge key balances and deltas by [`AssetId`], so the preimage below
//! must be reproduced byte-for-byte by every implementation:
//!
//! ```text
//! SHA-256( code (UTF-8) || 0x00 || issuer (32 raw bytes) | "native" )
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AssetId, PomError, Result, constants};

/// Signed 128-bit amount in the asset's smallest unit.
///
/// All arithmetic on amounts must be checked; see [`checked_sum`].
pub type Amount = i128;

/// Who issues an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AssetIssuer {
    /// The settlement ledger's native asset.
    Native,
    /// A credit asset issued by the given account key.
    Issued(#[serde(with = "crate::ids::hex_bytes")] [u8; 32]),
}

/// A settlement-ledger asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Asset {
    /// Asset code (e.g., "USDC"). The native asset uses [`constants::NATIVE_ASSET_CODE`].
    pub code: String,
    pub issuer: AssetIssuer,
}

impl Asset {
    /// The settlement ledger's native asset.
    #[must_use]
    pub fn native() -> Self {
        Self {
            code: constants::NATIVE_ASSET_CODE.to_string(),
            issuer: AssetIssuer::Native,
        }
    }

    /// A credit asset with the given code and issuer key.
    #[must_use]
    pub fn issued(code: impl Into<String>, issuer: [u8; 32]) -> Self {
        Self {
            code: code.into(),
            issuer: AssetIssuer::Issued(issuer),
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.issuer == AssetIssuer::Native
    }

    /// Canonical identifier. Deterministic across implementations.
    #[must_use]
    pub fn id(&self) -> AssetId {
        let mut hasher = Sha256::new();
        hasher.update(self.code.as_bytes());
        hasher.update([0u8]);
        match &self.issuer {
            AssetIssuer::Native => hasher.update(constants::NATIVE_ISSUER_SENTINEL),
            AssetIssuer::Issued(key) => hasher.update(key),
        }
        AssetId(hasher.finalize().into())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issuer {
            AssetIssuer::Native => write!(f, "{}:native", self.code),
            AssetIssuer::Issued(key) => write!(f, "{}:{}", self.code, hex::encode(&key[..4])),
        }
    }
}

/// Checked addition that reports overflow as [`PomError::AmountOverflow`].
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(PomError::AmountOverflow)
}

/// Checked subtraction that reports underflow as [`PomError::AmountOverflow`].
pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(PomError::AmountOverflow)
}

/// Checked sum over an iterator of amounts.
pub fn checked_sum(amounts: impl IntoIterator<Item = Amount>) -> Result<Amount> {
    amounts.into_iter().try_fold(0, checked_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIVE_ID_HEX: &str = "3c42ac91b12e9778c1e2391988d0e110ae89e987a381dfc284541965f8a40bec";

    #[test]
    fn native_asset_id_vector() {
        let id = Asset::native().id();
        assert_eq!(id.to_hex(), NATIVE_ID_HEX);
        assert_eq!(id.to_hex().len(), 64);
        assert!(id.to_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn asset_id_changes_with_code_or_issuer() {
        let usdc_a = Asset::issued("USDC", [1u8; 32]);
        let usdc_b = Asset::issued("USDC", [2u8; 32]);
        let eurc_a = Asset::issued("EURC", [1u8; 32]);
        assert_ne!(usdc_a.id(), usdc_b.id());
        assert_ne!(usdc_a.id(), eurc_a.id());
        assert_ne!(usdc_a.id(), Asset::native().id());

        let renamed_native = Asset {
            code: "XLM2".into(),
            issuer: AssetIssuer::Native,
        };
        assert_ne!(renamed_native.id(), Asset::native().id());
    }

    #[test]
    fn asset_id_matches_manual_preimage() {
        let issuer = [9u8; 32];
        let mut preimage = b"USDC".to_vec();
        preimage.push(0);
        preimage.extend_from_slice(&issuer);
        let expected: [u8; 32] = Sha256::digest(&preimage).into();
        assert_eq!(Asset::issued("USDC", issuer).id(), AssetId(expected));
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        assert_eq!(checked_add(1, 2).unwrap(), 3);
        assert!(matches!(
            checked_add(Amount::MAX, 1),
            Err(PomError::AmountOverflow)
        ));
        assert!(matches!(
            checked_sub(Amount::MIN, 1),
            Err(PomError::AmountOverflow)
        ));
        assert_eq!(checked_sum([1, 2, 3]).unwrap(), 6);
        assert!(checked_sum([Amount::MAX, 1]).is_err());
    }

    #[test]
    fn display_formats() {
        assert_eq!(Asset::native().to_string(), "XLM:native");
        assert_eq!(Asset::issued("USDC", [0xaa; 32]).to_string(), "USDC:aaaaaaaa");
    }
}
