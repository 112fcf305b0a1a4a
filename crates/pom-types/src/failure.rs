//! Failure taxonomy for the settlement engine.
//!
//! Every failure maps to exactly one [`FailurePolicy`]. Any condition that
//! could indicate fund-loss risk halts the engine; transient conditions are
//! retried with bounded exponential backoff.
//!
//! | Kind                   | Severity | Action | Retryable |
//! |------------------------|----------|--------|-----------|
//! | PomMismatch            | Critical | Halt   | no        |
//! | PartialSubmission      | Critical | Halt   | no        |
//! | ThresholdNotMet        | Critical | Halt   | no        |
//! | InsufficientBalance    | Critical | Halt   | no        |
//! | LedgerTimeout          | Error    | Retry  | bounded   |
//! | ConversionPathNotFound | Error    | Retry  | bounded   |
//! | SlippageExceeded       | Warning  | Retry  | bounded   |
//! | AlreadyInFlight        | Warning  | Skip   | no        |
//! | Unclassified           | Error    | Manual | no        |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PomMismatch,
    PartialSubmission,
    ThresholdNotMet,
    InsufficientBalance,
    LedgerTimeout,
    ConversionPathNotFound,
    SlippageExceeded,
    /// Another attempt for the same (subnet, period) is already pending.
    AlreadyInFlight,
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Stop all automated processing pending manual review.
    Halt,
    /// Retry with exponential backoff, bounded by the kind's retry policy.
    Retry,
    /// Drop this attempt; another attempt owns the work.
    Skip,
    /// Surface as failed and wait for an operator.
    Manual,
}

/// How the engine responds to a [`FailureKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub severity: Severity,
    pub action: FailureAction,
}

impl FailurePolicy {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.action == FailureAction::Retry
    }

    #[must_use]
    pub fn is_halt(&self) -> bool {
        self.action == FailureAction::Halt
    }
}

impl FailureKind {
    /// The fixed policy table.
    #[must_use]
    pub fn policy(self) -> FailurePolicy {
        use FailureAction::{Halt, Manual, Retry, Skip};
        use Severity::{Critical, Error, Warning};
        let (severity, action) = match self {
            Self::PomMismatch
            | Self::PartialSubmission
            | Self::ThresholdNotMet
            | Self::InsufficientBalance => (Critical, Halt),
            Self::LedgerTimeout | Self::ConversionPathNotFound => (Error, Retry),
            Self::SlippageExceeded => (Warning, Retry),
            Self::AlreadyInFlight => (Warning, Skip),
            Self::Unclassified => (Error, Manual),
        };
        FailurePolicy { severity, action }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PomMismatch => "POM_MISMATCH",
            Self::PartialSubmission => "PARTIAL_SUBMISSION",
            Self::ThresholdNotMet => "THRESHOLD_NOT_MET",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::LedgerTimeout => "LEDGER_TIMEOUT",
            Self::ConversionPathNotFound => "CONVERSION_PATH_NOT_FOUND",
            Self::SlippageExceeded => "SLIPPAGE_EXCEEDED",
            Self::AlreadyInFlight => "ALREADY_IN_FLIGHT",
            Self::Unclassified => "UNCLASSIFIED",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
