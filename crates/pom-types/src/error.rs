//! Error types for the Proof-of-Money bridge.
//!
//! All errors use the `POM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Commitment errors (rejected synchronously, no partial effect)
//! - 2xx: Subnet registry / withdrawal queue errors
//! - 3xx: Arithmetic and delta errors
//! - 6xx: Settlement errors
//! - 7xx: Ledger / collaborator errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{Amount, AssetId, FailureKind, Period, SubnetId, WithdrawalId};

/// Central error enum for all bridge operations.
#[derive(Debug, Error)]
pub enum PomError {
    // =================================================================
    // Commitment Errors (1xx)
    // =================================================================
    /// The period does not strictly exceed the last committed period.
    #[error("POM_ERR_100: Invalid period {period}: last committed is {last}")]
    InvalidPeriod { period: Period, last: Period },

    /// The state root is all-zero.
    #[error("POM_ERR_101: Invalid state root: must be non-zero")]
    InvalidRoot,

    /// Not enough registered auditors signed the commitment.
    #[error("POM_ERR_102: Insufficient auditor signatures: {valid} valid, threshold {threshold}")]
    InsufficientSignatures { valid: usize, threshold: u32 },

    /// The treasury cannot cover the authorized outflow.
    #[error("POM_ERR_103: Insolvent: {asset} outflow {required} exceeds treasury balance {available}")]
    Insolvent {
        asset: AssetId,
        required: Amount,
        available: Amount,
    },

    /// A withdrawal cannot be turned into a settlement payment.
    #[error("POM_ERR_104: Withdrawal {withdrawal} not constructible: {reason}")]
    NotConstructible {
        withdrawal: WithdrawalId,
        reason: String,
    },

    /// The treasury snapshot's signer configuration does not authorize payment.
    #[error("POM_ERR_105: Treasury not authorized: {reason}")]
    Unauthorized { reason: String },

    /// The treasury snapshot arrays are malformed.
    #[error("POM_ERR_106: Invalid treasury snapshot: {reason}")]
    InvalidTreasurySnapshot { reason: String },

    // =================================================================
    // Registry / Queue Errors (2xx)
    // =================================================================
    /// Subnet does not exist.
    #[error("POM_ERR_200: Subnet not found: {0}")]
    SubnetNotFound(SubnetId),

    /// Subnet has no treasury registered yet.
    #[error("POM_ERR_201: Subnet inactive (no treasury registered): {0}")]
    SubnetInactive(SubnetId),

    /// A subnet with the same creation parameters already exists.
    #[error("POM_ERR_202: Subnet already exists: {0}")]
    SubnetAlreadyExists(SubnetId),

    /// Auditor set too small or contains duplicates.
    #[error("POM_ERR_203: Invalid auditor set: {reason}")]
    InvalidAuditorSet { reason: String },

    /// Threshold outside [floor(n/2)+1, n].
    #[error("POM_ERR_204: Invalid threshold {threshold} for {auditors} auditors")]
    InvalidThreshold { threshold: u32, auditors: usize },

    /// The treasury was already registered for this subnet.
    #[error("POM_ERR_205: Treasury already registered for {0}")]
    TreasuryAlreadyRegistered(SubnetId),

    /// The asset is not on the subnet whitelist.
    #[error("POM_ERR_206: Asset not whitelisted: {0}")]
    AssetNotWhitelisted(AssetId),

    /// The withdrawal was rejected at enqueue time.
    #[error("POM_ERR_207: Invalid withdrawal {withdrawal}: {reason}")]
    InvalidWithdrawal {
        withdrawal: WithdrawalId,
        reason: String,
    },

    /// No commitment for the requested (subnet, period).
    #[error("POM_ERR_208: No commitment for {subnet} at {period}")]
    CommitmentNotFound { subnet: SubnetId, period: Period },

    /// The treasury vault address is not a settlement-ledger address.
    #[error("POM_ERR_209: Invalid treasury address: {0:?}")]
    InvalidTreasuryAddress(String),

    // =================================================================
    // Arithmetic / Delta Errors (3xx)
    // =================================================================
    /// Checked 128-bit arithmetic overflowed.
    #[error("POM_ERR_300: Amount overflow")]
    AmountOverflow,

    /// The planned outflow does not equal the authorized PoM delta.
    #[error("POM_ERR_301: PoM mismatch: {reason}")]
    PomMismatch { reason: String },

    /// An outflow amount is negative.
    #[error("POM_ERR_302: Negative outflow {amount} for {asset}")]
    NegativeAmount { asset: AssetId, amount: Amount },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// Only part of a submitted transaction was applied.
    #[error("POM_ERR_600: Partial submission: {applied} of {expected} operations applied")]
    PartialSubmission { applied: usize, expected: usize },

    /// Fewer authorized signatures than the treasury threshold, or the
    /// signer set changed between snapshot and submission.
    #[error("POM_ERR_601: Threshold not met: {reason}")]
    ThresholdNotMet { reason: String },

    /// The settlement-time treasury balance cannot cover the plan.
    #[error("POM_ERR_602: Insufficient treasury balance for {asset}: need {needed}, have {available}")]
    InsufficientBalance {
        asset: AssetId,
        needed: Amount,
        available: Amount,
    },

    /// No conversion path for a non-held asset.
    #[error("POM_ERR_603: Conversion path not found: {reason}")]
    ConversionPathNotFound { reason: String },

    /// Conversion quote exceeds the slippage bound.
    #[error("POM_ERR_604: Slippage exceeded: send {quoted} > max {max_allowed}")]
    SlippageExceeded { quoted: Amount, max_allowed: Amount },

    /// Another attempt is already settling this (subnet, period).
    #[error("POM_ERR_605: Settlement already in flight for {subnet} at {period}")]
    SettlementInFlight { subnet: SubnetId, period: Period },

    /// Illegal settlement record transition.
    #[error("POM_ERR_606: Invalid settlement record transition: {reason}")]
    InvalidRecordTransition { reason: String },

    /// A signature failed to verify or a key was malformed.
    #[error("POM_ERR_607: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    // =================================================================
    // Ledger / Collaborator Errors (7xx)
    // =================================================================
    /// A settlement-ledger call did not complete in time.
    #[error("POM_ERR_700: Ledger timeout during {operation}")]
    LedgerTimeout { operation: String },

    /// The settlement ledger rejected a call.
    #[error("POM_ERR_701: Ledger error: {reason}")]
    Ledger { reason: String },

    /// The execution layer rejected or failed a call.
    #[error("POM_ERR_702: Execution layer error: {reason}")]
    ExecutionLayer { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("POM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("POM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid value, missing fields, etc.).
    #[error("POM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// The engine halted after a critical failure; no more work is accepted.
    #[error("POM_ERR_903: Engine halted: {reason}")]
    Halted { reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PomError>;

impl PomError {
    /// Map this error onto the settlement failure taxonomy.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::PomMismatch { .. } => FailureKind::PomMismatch,
            Self::PartialSubmission { .. } => FailureKind::PartialSubmission,
            Self::ThresholdNotMet { .. } => FailureKind::ThresholdNotMet,
            Self::InsufficientBalance { .. } | Self::Insolvent { .. } => {
                FailureKind::InsufficientBalance
            }
            Self::LedgerTimeout { .. } => FailureKind::LedgerTimeout,
            Self::ConversionPathNotFound { .. } => FailureKind::ConversionPathNotFound,
            Self::SlippageExceeded { .. } => FailureKind::SlippageExceeded,
            Self::SettlementInFlight { .. } => FailureKind::AlreadyInFlight,
            _ => FailureKind::Unclassified,
        }
    }
}

impl From<serde_json::Error> for PomError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = PomError::InvalidPeriod {
            period: Period(1),
            last: Period(1),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("POM_ERR_100"), "Got: {msg}");
        assert!(msg.contains("period:1"));
    }

    #[test]
    fn insolvent_display() {
        let err = PomError::Insolvent {
            asset: AssetId([0u8; 32]),
            required: 500_000,
            available: 100_000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("POM_ERR_103"));
        assert!(msg.contains("500000"));
        assert!(msg.contains("100000"));
    }

    #[test]
    fn all_errors_have_pom_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(PomError::InvalidRoot),
            Box::new(PomError::AmountOverflow),
            Box::new(PomError::NegativeAmount {
                asset: AssetId([0u8; 32]),
                amount: -1,
            }),
            Box::new(PomError::Internal("test".into())),
            Box::new(PomError::PartialSubmission {
                applied: 1,
                expected: 2,
            }),
            Box::new(PomError::LedgerTimeout {
                operation: "submit".into(),
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("POM_ERR_"),
                "Error missing POM_ERR_ prefix: {msg}"
            );
        }
    }

    #[test]
    fn failure_kind_mapping() {
        assert_eq!(
            PomError::PomMismatch { reason: String::new() }.failure_kind(),
            FailureKind::PomMismatch
        );
        assert_eq!(
            PomError::LedgerTimeout { operation: String::new() }.failure_kind(),
            FailureKind::LedgerTimeout
        );
        assert_eq!(
            PomError::SlippageExceeded { quoted: 2, max_allowed: 1 }.failure_kind(),
            FailureKind::SlippageExceeded
        );
        assert_eq!(
            PomError::Ledger { reason: String::new() }.failure_kind(),
            FailureKind::Unclassified
        );
        assert_eq!(
            PomError::SettlementInFlight {
                subnet: SubnetId([0u8; 32]),
                period: Period(1)
            }
            .failure_kind(),
            FailureKind::AlreadyInFlight
        );
    }
}
