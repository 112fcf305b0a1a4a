//! Identifiers used on both sides of the bridge.
//!
//! Fixed-width hash identifiers (`SubnetId`, `AssetId`, `StateRoot`,
//! `IdempotencyTag`, `TxHash`) serialize as lowercase hex so they can be used
//! as JSON map keys and appear verbatim in confirmation payloads. Entity IDs
//! emitted by the execution layer use UUIDv7 for time-ordered sorting.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{PomError, Result, constants};

/// Serde adapter: `[u8; N]` <-> lowercase hex string.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(D::Error::custom)?;
        <[u8; N]>::try_from(raw.as_slice())
            .map_err(|_| D::Error::custom(format!("expected {N} bytes, got {}", raw.len())))
    }
}

fn decode_fixed<const N: usize>(what: &str, s: &str) -> Result<[u8; N]> {
    let raw = hex::decode(s).map_err(|e| PomError::Serialization(format!("{what}: {e}")))?;
    <[u8; N]>::try_from(raw.as_slice()).map_err(|_| {
        PomError::Serialization(format!("{what}: expected {N} bytes, got {}", raw.len()))
    })
}

// ---------------------------------------------------------------------------
// SubnetId
// ---------------------------------------------------------------------------

/// Identifier of a subnet: the SHA-256 of its creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SubnetId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl SubnetId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed("subnet id", s).map(Self)
    }
}

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subnet:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AuditorId
// ---------------------------------------------------------------------------

/// Identity of an auditor / treasury signer: the raw ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AuditorId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl AuditorId {
    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn from_verifying_key(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Decode the identity back into an ed25519 verifying key.
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).map_err(|e| {
            PomError::InvalidSignature {
                reason: format!("{self} is not a valid ed25519 key: {e}"),
            }
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AuditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auditor:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// WithdrawalId / UserId
// ---------------------------------------------------------------------------

/// Unique withdrawal identifier. The settlement planner sorts by this value,
/// so it must be a total order that every node reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct WithdrawalId(pub Uuid);

impl WithdrawalId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }
}

impl Default for WithdrawalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

/// Execution-layer account that requested a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Execution-layer settlement checkpoint. Strictly increasing per subnet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Period(pub u64);

impl Period {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StateRoot
// ---------------------------------------------------------------------------

/// 32-byte execution-layer state summary committed each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRoot(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl StateRoot {
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Canonical asset identifier: SHA-256 over (code, issuer-or-native).
/// See [`crate::Asset::id`] for the exact preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl AssetId {
    /// 64 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed("asset id", s).map(Self)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// IdempotencyTag
// ---------------------------------------------------------------------------

/// Deterministic per-(subnet, period) tag attached to every settlement
/// transaction as its memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyTag(#[serde(with = "hex_bytes")] pub [u8; constants::IDEMPOTENCY_TAG_LEN]);

impl IdempotencyTag {
    /// First 28 bytes of `SHA-256(subnet_id || period_be_u64)`.
    #[must_use]
    pub fn derive(subnet_id: &SubnetId, period: Period) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subnet_id.as_bytes());
        hasher.update(period.to_be_bytes());
        let digest = hasher.finalize();
        let mut tag = [0u8; constants::IDEMPOTENCY_TAG_LEN];
        tag.copy_from_slice(&digest[..constants::IDEMPOTENCY_TAG_LEN]);
        Self(tag)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed("idempotency tag", s).map(Self)
    }
}

impl fmt::Display for IdempotencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// Hash of a settlement-ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TxHash(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl TxHash {
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl AuditorId {
    /// Random identity. Not a valid signing key pair; use
    /// `ed25519_dalek::SigningKey` when signatures are needed.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl SubnetId {
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_tag_is_pure() {
        let subnet = SubnetId([7u8; 32]);
        let a = IdempotencyTag::derive(&subnet, Period(42));
        let b = IdempotencyTag::derive(&subnet, Period(42));
        assert_eq!(a, b);
    }

    #[test]
    fn idempotency_tag_changes_with_inputs() {
        let subnet = SubnetId([7u8; 32]);
        let other = SubnetId([8u8; 32]);
        let base = IdempotencyTag::derive(&subnet, Period(42));
        assert_ne!(base, IdempotencyTag::derive(&subnet, Period(43)));
        assert_ne!(base, IdempotencyTag::derive(&other, Period(42)));
    }

    #[test]
    fn idempotency_tag_no_collisions_over_many_periods() {
        let subnet = SubnetId::random();
        let tags: std::collections::HashSet<_> = (0..5_000u64)
            .map(|p| IdempotencyTag::derive(&subnet, Period(p)))
            .collect();
        assert_eq!(tags.len(), 5_000);
    }

    #[test]
    fn idempotency_tag_matches_manual_digest() {
        let subnet = SubnetId([1u8; 32]);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&[1u8; 32]);
        preimage.extend_from_slice(&9u64.to_be_bytes());
        let digest = Sha256::digest(&preimage);
        let tag = IdempotencyTag::derive(&subnet, Period(9));
        assert_eq!(&tag.0[..], &digest[..28]);
        assert_eq!(tag.to_hex().len(), 56);
    }

    #[test]
    fn state_root_zero_detection() {
        assert!(StateRoot::ZERO.is_zero());
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        assert!(!StateRoot(bytes).is_zero());
    }

    #[test]
    fn period_next_and_order() {
        assert_eq!(Period(1).next(), Period(2));
        assert!(Period(1) < Period(2));
        assert_eq!(Period::default(), Period(0));
    }

    #[test]
    fn withdrawal_id_ordering_is_total() {
        let a = WithdrawalId::from_u128(1);
        let b = WithdrawalId::from_u128(2);
        assert!(a < b);
        let x = WithdrawalId::new();
        let y = WithdrawalId::new();
        assert!(x < y);
    }

    #[test]
    fn hex_ids_serialize_as_strings() {
        let asset = AssetId([0xab; 32]);
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(asset, back);
    }

    #[test]
    fn hex_ids_reject_wrong_length() {
        assert!(AssetId::from_hex("abcd").is_err());
        assert!(serde_json::from_str::<SubnetId>("\"abcd\"").is_err());
        assert!(IdempotencyTag::from_hex(&"00".repeat(28)).is_ok());
    }
}
