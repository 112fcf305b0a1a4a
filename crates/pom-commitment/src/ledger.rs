//! Commitment ledger: the execution-layer side of the bridge.
//!
//! ```text
//! commit(CommitRequest)
//!   ├─ subnet exists and is active
//!   ├─ period > last_committed_period      (strict)
//!   ├─ state_root != 0
//!   ├─ distinct registered signers ≥ threshold
//!   ├─ treasury arrays well-formed
//!   ├─ authorized = compute_net_outflow(queue[subnet, period])
//!   ├─ constructibility / solvency / authorization
//!   └─ record Commitment, advance period, emit CommitmentEvent
//! ```
//!
//! Every check runs before any write, so a rejected commit leaves the ledger
//! untouched. Concurrent commits for one subnet are serialized by the period
//! check: the loser gets `InvalidPeriod` and must refetch.
//!
//! Periods may be skipped. Withdrawals queued for a skipped period are
//! stranded: the period can no longer be committed or enqueued into. The
//! commit that skips them logs a warning and
//! [`CommitmentLedger::stranded_withdrawals`] lists them.

use std::{collections::HashMap, ops::Bound};

use chrono::Utc;
use pom_planner::compute_net_outflow;
use pom_types::{
    Amount, Asset, AssetId, AuditorId, Commitment, CommitmentEvent, Period, PomError, Result,
    StateRoot, Subnet, SubnetId, TreasurySnapshot, WithdrawalIntent,
};

use crate::{SubnetRegistry, WithdrawalQueue, pom_check};

/// Arguments of [`CommitmentLedger::commit`].
///
/// The treasury snapshot arrives as parallel arrays, as it would over a
/// contract call boundary.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub subnet_id: SubnetId,
    pub period: Period,
    pub state_root: StateRoot,
    pub auditor_signers: Vec<AuditorId>,
    pub treasury_asset_ids: Vec<AssetId>,
    pub treasury_balances: Vec<Amount>,
    pub treasury_signers: Vec<AuditorId>,
    pub treasury_threshold: u32,
}

/// Subnets, withdrawal queues and accepted commitments.
pub struct CommitmentLedger {
    registry: SubnetRegistry,
    queue: WithdrawalQueue,
    commitments: HashMap<(SubnetId, Period), Commitment>,
    last_committed: HashMap<SubnetId, Period>,
    /// Outbound events not yet drained by the relay.
    events: Vec<CommitmentEvent>,
}

impl CommitmentLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SubnetRegistry::new(),
            queue: WithdrawalQueue::new(),
            commitments: HashMap::new(),
            last_committed: HashMap::new(),
            events: Vec::new(),
        }
    }

    // --- Registry -------------------------------------------------------

    /// See [`SubnetRegistry::create_subnet`].
    ///
    /// # Errors
    /// Registry validation errors.
    pub fn create_subnet(
        &mut self,
        auditors: &[AuditorId],
        threshold: u32,
        whitelist: Vec<Asset>,
    ) -> Result<SubnetId> {
        self.registry.create_subnet(auditors, threshold, whitelist)
    }

    /// See [`SubnetRegistry::register_treasury`].
    ///
    /// # Errors
    /// Registry validation errors.
    pub fn register_treasury(&mut self, subnet_id: &SubnetId, address: &str) -> Result<()> {
        self.registry.register_treasury(subnet_id, address)
    }

    /// # Errors
    /// `SubnetNotFound`.
    pub fn subnet(&self, subnet_id: &SubnetId) -> Result<&Subnet> {
        self.registry.get(subnet_id)
    }

    // --- Withdrawals ----------------------------------------------------

    /// Queue a withdrawal for a period that has not been committed yet.
    ///
    /// # Errors
    /// - `SubnetNotFound`
    /// - `InvalidPeriod` if `period` is already committed
    /// - queue validation errors
    pub fn enqueue_withdrawal(
        &mut self,
        subnet_id: &SubnetId,
        period: Period,
        intent: WithdrawalIntent,
    ) -> Result<()> {
        let subnet = self.registry.get(subnet_id)?;
        let last = self.get_last_committed_period(subnet_id);
        if period <= last {
            return Err(PomError::InvalidPeriod { period, last });
        }
        self.queue.enqueue(subnet, period, intent)
    }

    #[must_use]
    pub fn withdrawals(&self, subnet_id: &SubnetId, period: Period) -> &[WithdrawalIntent] {
        self.queue.withdrawals(subnet_id, period)
    }

    // --- Commit ---------------------------------------------------------

    /// Accept a period summary. All-or-nothing.
    ///
    /// # Errors
    /// `SubnetNotFound`, `SubnetInactive`, `InvalidPeriod`, `InvalidRoot`,
    /// `InsufficientSignatures`, `InvalidTreasurySnapshot`,
    /// `NotConstructible`, `Insolvent`, `Unauthorized`, `AmountOverflow`.
    pub fn commit(&mut self, req: CommitRequest) -> Result<CommitmentEvent> {
        let subnet = self.registry.get_active(&req.subnet_id)?;

        let last = self.get_last_committed_period(&req.subnet_id);
        if req.period <= last {
            return Err(PomError::InvalidPeriod {
                period: req.period,
                last,
            });
        }
        if req.state_root.is_zero() {
            return Err(PomError::InvalidRoot);
        }

        let valid = subnet.count_valid_signers(&req.auditor_signers);
        if valid < subnet.threshold as usize {
            return Err(PomError::InsufficientSignatures {
                valid,
                threshold: subnet.threshold,
            });
        }

        let treasury = TreasurySnapshot::from_parallel(
            &req.treasury_asset_ids,
            &req.treasury_balances,
            &req.treasury_signers,
            req.treasury_threshold,
        )?;

        let withdrawals = self.queue.withdrawals(&req.subnet_id, req.period);
        let authorized = compute_net_outflow(withdrawals)?;
        pom_check::validate_pom(subnet, withdrawals, &authorized, &treasury)?;

        // All checks passed; from here on only writes.
        let mut counted: Vec<AuditorId> = req
            .auditor_signers
            .iter()
            .filter(|s| subnet.is_auditor(s))
            .copied()
            .collect();
        counted.sort_unstable();
        counted.dedup();

        let commitment = Commitment {
            subnet_id: req.subnet_id,
            period: req.period,
            state_root: req.state_root,
            authorized_delta: authorized,
            auditor_signers: counted,
            committed_at: Utc::now(),
        };
        let event = CommitmentEvent::from(&commitment);

        tracing::info!(
            subnet = %req.subnet_id,
            period = req.period.0,
            withdrawals = withdrawals.len(),
            assets = commitment.authorized_delta.len(),
            signers = valid,
            "commitment accepted"
        );
        for (skipped, count) in self.queue.queued_in(
            &req.subnet_id,
            (Bound::Excluded(last), Bound::Excluded(req.period)),
        ) {
            tracing::warn!(
                subnet = %req.subnet_id,
                period = skipped.0,
                withdrawals = count,
                committed = req.period.0,
                "period skipped with queued withdrawals; they are stranded"
            );
        }

        self.commitments
            .insert((req.subnet_id, req.period), commitment);
        self.last_committed.insert(req.subnet_id, req.period);
        self.events.push(event.clone());
        Ok(event)
    }

    // --- Queries --------------------------------------------------------

    /// State root committed for `(subnet, period)`.
    #[must_use]
    pub fn get_commit(&self, subnet_id: &SubnetId, period: Period) -> Option<StateRoot> {
        self.get_commitment(subnet_id, period).map(|c| c.state_root)
    }

    #[must_use]
    pub fn get_commitment(&self, subnet_id: &SubnetId, period: Period) -> Option<&Commitment> {
        self.commitments.get(&(*subnet_id, period))
    }

    /// `Period(0)` until the first commit.
    #[must_use]
    pub fn get_last_committed_period(&self, subnet_id: &SubnetId) -> Period {
        self.last_committed
            .get(subnet_id)
            .copied()
            .unwrap_or_default()
    }

    /// `(period, count)` of queued withdrawals in periods that a later
    /// commit skipped. They will never be committed or settled.
    #[must_use]
    pub fn stranded_withdrawals(&self, subnet_id: &SubnetId) -> Vec<(Period, usize)> {
        let last = self.get_last_committed_period(subnet_id);
        self.queue
            .queued_in(subnet_id, ..=last)
            .into_iter()
            .filter(|(p, _)| !self.commitments.contains_key(&(*subnet_id, *p)))
            .collect()
    }

    /// Take all events emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<CommitmentEvent> {
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

impl Default for CommitmentLedger {
    fn default() -> Self {
        Self::new()
    }
}
