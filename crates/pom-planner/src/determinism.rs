//! Plan root for cross-node consistency checks.
//!
//! Every node planning the same `(subnet, period)` from the same withdrawal
//! multiset must produce the same instructions. The `plan_root` is a hash
//! over the nominal instructions that lets nodes compare plans without
//! exchanging them. Conversion legs are excluded: they depend on live quotes.

use pom_types::constants;
use sha2::{Digest, Sha256};

use crate::TransferInstruction;

/// Hash over instructions, in the order given.
#[must_use]
pub fn compute_plan_root(instructions: &[TransferInstruction]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"pom:plan_root:v1:");
    hasher.update((instructions.len() as u64).to_le_bytes());

    for instr in instructions {
        hasher.update(instr.withdrawal_id.0.as_bytes());
        hasher.update(instr.asset.id().0);
        hasher.update(instr.amount.to_le_bytes());
        // Fixed-width field so destination bytes cannot bleed into the next entry.
        let mut dest = [0u8; constants::ADDRESS_LEN];
        let bytes = instr.destination.as_bytes();
        let n = bytes.len().min(constants::ADDRESS_LEN);
        dest[..n].copy_from_slice(&bytes[..n]);
        hasher.update(dest);
    }

    hasher.finalize().into()
}

/// Recompute and compare.
#[must_use]
pub fn verify_plan_root(instructions: &[TransferInstruction], expected_root: &[u8; 32]) -> bool {
    compute_plan_root(instructions) == *expected_root
}
