//! Settlement records, confirmations and outcomes.
//!
//! ## Record lifecycle
//!
//! ```text
//!   begin()   ┌─────────┐  mark_confirmed()  ┌───────────┐
//!  ─────────▶ │ PENDING ├──────────────────▶ │ CONFIRMED │  (terminal)
//!             └────┬────┘                    └───────────┘
//!                  │ mark_failed()
//!                  ▼
//!             ┌────────┐  begin() (new attempt)
//!             │ FAILED ├──────────────────▶ PENDING
//!             └────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FailureKind, IdempotencyTag, Period, SubnetId, TxHash};

/// Status of a settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
}

impl SettlementStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Confirmed | Self::Failed) | (Self::Failed, Self::Pending)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Durable record of the settlement of one `(subnet, period)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub subnet_id: SubnetId,
    pub period: Period,
    pub idempotency_tag: IdempotencyTag,
    pub tx_hashes: Vec<TxHash>,
    /// Ledger sequence numbers at which the transactions landed.
    pub ledgers: Vec<u64>,
    pub status: SettlementStatus,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl SettlementRecord {
    /// Fresh pending record for a new attempt.
    #[must_use]
    pub fn pending(subnet_id: SubnetId, period: Period) -> Self {
        Self {
            subnet_id,
            period,
            idempotency_tag: IdempotencyTag::derive(&subnet_id, period),
            tx_hashes: Vec::new(),
            ledgers: Vec::new(),
            status: SettlementStatus::Pending,
            updated_at: Utc::now(),
            error: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> (SubnetId, Period) {
        (self.subnet_id, self.period)
    }
}

/// Payload reported back to the execution layer once funds moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfirmation {
    /// Full subnet id, lowercase hex.
    pub subnet_id: String,
    pub period: u64,
    pub tx_hashes: Vec<String>,
    /// Lowercase hex.
    pub idempotency_tag: String,
    /// RFC 3339 / ISO-8601.
    pub timestamp: DateTime<Utc>,
}

impl SettlementConfirmation {
    #[must_use]
    pub fn from_record(record: &SettlementRecord) -> Self {
        Self {
            subnet_id: record.subnet_id.to_hex(),
            period: record.period.0,
            tx_hashes: record.tx_hashes.iter().map(TxHash::to_hex).collect(),
            idempotency_tag: record.idempotency_tag.to_hex(),
            timestamp: Utc::now(),
        }
    }
}

/// Stage of the per-(subnet, period) settlement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStage {
    Idle,
    Fetching,
    Planning,
    Verifying,
    Signing,
    Submitting,
    Confirming,
    Confirmed,
    AlreadySettled,
    Failed,
    Halted,
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Fetching => "FETCHING",
            Self::Planning => "PLANNING",
            Self::Verifying => "VERIFYING",
            Self::Signing => "SIGNING",
            Self::Submitting => "SUBMITTING",
            Self::Confirming => "CONFIRMING",
            Self::Confirmed => "CONFIRMED",
            Self::AlreadySettled => "ALREADY_SETTLED",
            Self::Failed => "FAILED",
            Self::Halted => "HALTED",
        };
        f.write_str(s)
    }
}

/// What the caller is told about one commitment event. There is no
/// "maybe succeeded" variant: ambiguous submissions are resolved against
/// the ledger before an outcome is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Confirmed {
        record: SettlementRecord,
        /// Whether the execution layer acknowledged the confirmation.
        confirmation_delivered: bool,
    },
    AlreadySettled {
        tx_hashes: Vec<TxHash>,
    },
    Failed {
        kind: FailureKind,
        stage: SettlementStage,
        reason: String,
    },
    Halted {
        kind: FailureKind,
        stage: SettlementStage,
        reason: String,
    },
}

impl SettlementOutcome {
    /// `confirmed`, `already_settled`, `failed` or `halted`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::AlreadySettled { .. } => "already_settled",
            Self::Failed { .. } => "failed",
            Self::Halted { .. } => "halted",
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        use SettlementStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(Confirmed.is_terminal());
    }

    #[test]
    fn pending_record_derives_tag() {
        let subnet = SubnetId([3u8; 32]);
        let rec = SettlementRecord::pending(subnet, Period(7));
        assert_eq!(rec.idempotency_tag, IdempotencyTag::derive(&subnet, Period(7)));
        assert_eq!(rec.status, SettlementStatus::Pending);
        assert!(rec.tx_hashes.is_empty());
    }

    #[test]
    fn confirmation_json_shape() {
        let subnet = SubnetId([3u8; 32]);
        let mut rec = SettlementRecord::pending(subnet, Period(7));
        rec.tx_hashes.push(TxHash([0xee; 32]));
        let conf = SettlementConfirmation::from_record(&rec);
        let json: serde_json::Value = serde_json::to_value(&conf).unwrap();
        assert_eq!(json["subnet_id"], "03".repeat(32));
        assert_eq!(json["period"], 7);
        assert_eq!(json["tx_hashes"][0], "ee".repeat(32));
        assert_eq!(json["idempotency_tag"].as_str().unwrap().len(), 56);
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok(), "not ISO-8601: {ts}");
    }

    #[test]
    fn outcome_labels() {
        let o = SettlementOutcome::AlreadySettled { tx_hashes: vec![] };
        assert_eq!(o.label(), "already_settled");
        let f = SettlementOutcome::Halted {
            kind: FailureKind::PomMismatch,
            stage: SettlementStage::Verifying,
            reason: "x".into(),
        };
        assert_eq!(f.label(), "halted");
        assert!(!f.is_confirmed());
    }

    #[test]
    fn stage_display() {
        assert_eq!(SettlementStage::AlreadySettled.to_string(), "ALREADY_SETTLED");
        assert_eq!(SettlementStage::Submitting.to_string(), "SUBMITTING");
    }
}
