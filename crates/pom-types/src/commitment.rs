//! Commitments accepted by the execution-layer ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuditorId, Period, PomDelta, StateRoot, SubnetId};

/// A period summary that passed every commit-time check.
///
/// Created exactly once per `(subnet, period)` and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub subnet_id: SubnetId,
    pub period: Period,
    pub state_root: StateRoot,
    /// Outflow sanctioned by this commitment, computed from the withdrawal
    /// queue at commit time.
    pub authorized_delta: PomDelta,
    /// Registered auditors that were counted toward the threshold.
    pub auditor_signers: Vec<AuditorId>,
    pub committed_at: DateTime<Utc>,
}

/// Notification emitted after a successful commit. Drives the settlement
/// flow on the other side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentEvent {
    pub subnet_id: SubnetId,
    pub period: Period,
    pub state_root: StateRoot,
}

impl From<&Commitment> for CommitmentEvent {
    fn from(c: &Commitment) -> Self {
        Self {
            subnet_id: c.subnet_id,
            period: c.period,
            state_root: c.state_root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_from_commitment() {
        let c = Commitment {
            subnet_id: SubnetId([1u8; 32]),
            period: Period(4),
            state_root: StateRoot([2u8; 32]),
            authorized_delta: PomDelta::new(),
            auditor_signers: vec![],
            committed_at: Utc::now(),
        };
        let ev = CommitmentEvent::from(&c);
        assert_eq!(ev.subnet_id, c.subnet_id);
        assert_eq!(ev.period, Period(4));
        assert_eq!(ev.state_root, c.state_root);
    }
}
