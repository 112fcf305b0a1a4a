//! Settlement-ledger transaction model.
//!
//! A settlement is a single transaction from the treasury account carrying
//! one operation per withdrawal and the idempotency tag as memo. Its hash is
//! domain-separated by the network passphrase, so a transaction signed for
//! one network is invalid on any other.

use std::collections::BTreeSet;

use ed25519_dalek::{Signature, Verifier};
use pom_planner::{SettlementPlan, TransferInstruction};
use pom_types::{Amount, Asset, AuditorId, IdempotencyTag, PomError, Result, TxHash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One payment inside a settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Payment {
        destination: String,
        asset: Asset,
        amount: Amount,
    },
    /// Deliver exactly `dest_amount`, spending at most `send_max`.
    PathPayment {
        destination: String,
        send_asset: Asset,
        send_max: Amount,
        dest_asset: Asset,
        dest_amount: Amount,
        path: Vec<Asset>,
    },
}

impl Operation {
    /// # Errors
    /// `Internal` if the instruction still waits for a conversion quote.
    pub fn from_instruction(instr: &TransferInstruction) -> Result<Self> {
        match (&instr.conversion, instr.requires_conversion) {
            (None, false) => Ok(Self::Payment {
                destination: instr.destination.clone(),
                asset: instr.asset.clone(),
                amount: instr.amount,
            }),
            (Some(leg), _) => Ok(Self::PathPayment {
                destination: instr.destination.clone(),
                send_asset: leg.send_asset.clone(),
                send_max: leg.send_max,
                dest_asset: instr.asset.clone(),
                dest_amount: instr.amount,
                path: leg.path.clone(),
            }),
            (None, true) => Err(PomError::Internal(format!(
                "withdrawal {} has no conversion leg",
                instr.withdrawal_id
            ))),
        }
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            Self::Payment {
                destination,
                asset,
                amount,
            } => {
                hasher.update([0u8]);
                hash_str(hasher, destination);
                hasher.update(asset.id().0);
                hasher.update(amount.to_le_bytes());
            }
            Self::PathPayment {
                destination,
                send_asset,
                send_max,
                dest_asset,
                dest_amount,
                path,
            } => {
                hasher.update([1u8]);
                hash_str(hasher, destination);
                hasher.update(send_asset.id().0);
                hasher.update(send_max.to_le_bytes());
                hasher.update(dest_asset.id().0);
                hasher.update(dest_amount.to_le_bytes());
                hasher.update((path.len() as u64).to_le_bytes());
                for hop in path {
                    hasher.update(hop.id().0);
                }
            }
        }
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// A transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Treasury account the operations pay from.
    pub source: String,
    pub sequence: u64,
    pub memo: IdempotencyTag,
    pub operations: Vec<Operation>,
}

impl UnsignedTransaction {
    /// Build from a plan whose conversions have all been resolved.
    ///
    /// # Errors
    /// `Internal` if the plan is empty or still has pending conversions.
    pub fn from_plan(
        source: &str,
        sequence: u64,
        memo: IdempotencyTag,
        plan: &SettlementPlan,
    ) -> Result<Self> {
        if plan.is_empty() {
            return Err(PomError::Internal("cannot build a transaction from an empty plan".into()));
        }
        let operations = plan
            .instructions
            .iter()
            .map(Operation::from_instruction)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            source: source.to_string(),
            sequence,
            memo,
            operations,
        })
    }

    /// `SHA-256(SHA-256(passphrase) || body)`.
    #[must_use]
    pub fn hash(&self, network_passphrase: &str) -> TxHash {
        let network_id: [u8; 32] = Sha256::digest(network_passphrase.as_bytes()).into();
        let mut hasher = Sha256::new();
        hasher.update(network_id);
        hasher.update(b"pom:tx:v1:");
        hash_str(&mut hasher, &self.source);
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.memo.0);
        hasher.update((self.operations.len() as u64).to_le_bytes());
        for op in &self.operations {
            op.hash_into(&mut hasher);
        }
        TxHash(hasher.finalize().into())
    }
}

/// A signature together with the signer it claims to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub signer: AuditorId,
    pub signature: Signature,
}

impl DecoratedSignature {
    /// # Errors
    /// `InvalidSignature` if the key is malformed or the signature does not
    /// verify over `hash`.
    pub fn verify(&self, hash: &TxHash) -> Result<()> {
        let key = self.signer.verifying_key()?;
        key.verify(&hash.0, &self.signature)
            .map_err(|e| PomError::InvalidSignature {
                reason: format!("signer {}: {e}", self.signer.short()),
            })
    }
}

/// A transaction with attached signatures, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub hash: TxHash,
    pub signatures: Vec<DecoratedSignature>,
}

impl SignedTransaction {
    /// Distinct signers.
    #[must_use]
    pub fn signers(&self) -> BTreeSet<AuditorId> {
        self.signatures.iter().map(|s| s.signer).collect()
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.tx.operations.len()
    }

    /// Check the recorded hash against `network_passphrase` and every
    /// signature against the hash.
    ///
    /// # Errors
    /// `InvalidSignature` on a hash mismatch or a bad signature.
    pub fn verify(&self, network_passphrase: &str) -> Result<()> {
        if self.tx.hash(network_passphrase) != self.hash {
            return Err(PomError::InvalidSignature {
                reason: "transaction hash does not match body".into(),
            });
        }
        for sig in &self.signatures {
            sig.verify(&self.hash)?;
        }
        Ok(())
    }
}
