//! Integration orchestrator: one commitment event in, one outcome out.
//!
//! ```text
//! event ─▶ halted? ─▶ begin(record) ─▶ fetch subnet ─▶ memo search
//!       ─▶ fetch commitment + withdrawals ─▶ snapshot ─▶ plan
//!       ─▶ verify (planned == authorized == recomputed, solvency)
//!       ─▶ conversion ─▶ sign ─▶ submit ─▶ cross-check ─▶ confirm
//! ```
//!
//! A `(subnet, period)` pipeline is strictly sequential. Events of
//! different subnets may run concurrently via
//! [`IntegrationOrchestrator::process_concurrently`]. The outcome is always
//! one of confirmed / already settled / failed / halted.
//!
//! A period found settled on the ledger (by the memo search, or after an
//! ambiguous submission) is adopted and its confirmation is sent again: the
//! attempt that moved the funds may have stopped before confirming.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use pom_planner::{
    SettlementPlan, SettlementPlanner, check_quote, compute_net_outflow, verify_delta_match,
};
use pom_types::{
    Amount, Asset, CommitmentEvent, FailureKind, IdempotencyTag, PomDelta, PomError, Result,
    SettlementConfig, SettlementConfirmation, SettlementOutcome, SettlementRecord,
    SettlementStage, SubnetId, TreasurySnapshot, TxHash, WithdrawalId, checked_sub,
};
use serde::{Deserialize, Serialize};

use crate::{
    CommitmentEventSource, ConversionProvider, ExecutionLayer, MultisigOrchestrator,
    ReplayCheck, ReplayProtectionService, SettlementLedger, Submission, TransactionSigner,
    TreasurySnapshotProvider, UnsignedTransaction,
    failure::{FailureContext, FailureHandler, with_timeout},
    record_store::{BeginOutcome, SettlementRecordStore},
};

/// External capabilities the orchestrator is built from.
pub struct Collaborators {
    pub execution: Arc<dyn ExecutionLayer>,
    pub ledger: Arc<dyn SettlementLedger>,
    pub treasury: Arc<dyn TreasurySnapshotProvider>,
    pub signers: Vec<Arc<dyn TransactionSigner>>,
    pub conversion: Option<Arc<dyn ConversionProvider>>,
}

/// Point-in-time copy of the orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStats {
    pub events_processed: u64,
    pub successes: u64,
    pub already_settled: u64,
    /// Failed and halted outcomes.
    pub failures: u64,
    pub halts: u64,
    pub confirmations_sent: u64,
}

#[derive(Default)]
struct Counters {
    events_processed: AtomicU64,
    successes: AtomicU64,
    already_settled: AtomicU64,
    failures: AtomicU64,
    halts: AtomicU64,
    confirmations_sent: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct IntegrationOrchestrator {
    config: SettlementConfig,
    execution: Arc<dyn ExecutionLayer>,
    ledger: Arc<dyn SettlementLedger>,
    treasury: Arc<dyn TreasurySnapshotProvider>,
    conversion: Option<Arc<dyn ConversionProvider>>,
    planner: SettlementPlanner,
    replay: ReplayProtectionService,
    records: SettlementRecordStore,
    multisig: MultisigOrchestrator,
    failures: FailureHandler,
    stats: Counters,
}

impl IntegrationOrchestrator {
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(config: SettlementConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let Collaborators {
            execution,
            ledger,
            treasury,
            signers,
            conversion,
        } = collaborators;
        let multisig = MultisigOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&treasury),
            signers,
            config.network_passphrase.clone(),
            config.ledger_timeout,
        );
        Ok(Self {
            planner: SettlementPlanner::new(config.conversion.clone()),
            replay: ReplayProtectionService::new(Arc::clone(&ledger), config.ledger_timeout),
            records: SettlementRecordStore::new(config.record_cache_size),
            failures: FailureHandler::new(config.retry.clone()),
            multisig,
            execution,
            ledger,
            treasury,
            conversion,
            config,
            stats: Counters::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.failures.is_halted()
    }

    #[must_use]
    pub fn failures(&self) -> &FailureHandler {
        &self.failures
    }

    #[must_use]
    pub fn records(&self) -> &SettlementRecordStore {
        &self.records
    }

    #[must_use]
    pub fn stats(&self) -> SettlementStats {
        let s = &self.stats;
        SettlementStats {
            events_processed: s.events_processed.load(Ordering::Relaxed),
            successes: s.successes.load(Ordering::Relaxed),
            already_settled: s.already_settled.load(Ordering::Relaxed),
            failures: s.failures.load(Ordering::Relaxed),
            halts: s.halts.load(Ordering::Relaxed),
            confirmations_sent: s.confirmations_sent.load(Ordering::Relaxed),
        }
    }

    /// Consume `source` until it is exhausted or the orchestrator halts.
    pub async fn run(&self, source: &dyn CommitmentEventSource) -> Vec<SettlementOutcome> {
        let mut outcomes = Vec::new();
        while !self.is_halted() {
            let Some(event) = source.next_event().await else {
                break;
            };
            outcomes.push(self.process_event(&event).await);
        }
        if self.is_halted() {
            tracing::error!("settlement loop stopped: engine halted");
        }
        outcomes
    }

    /// Settle `events` with one task per subnet. Events of the same subnet
    /// run in order; outcomes are returned in input order.
    pub async fn process_concurrently(
        self: &Arc<Self>,
        events: Vec<CommitmentEvent>,
    ) -> Vec<SettlementOutcome> {
        let total = events.len();
        let mut by_subnet: BTreeMap<SubnetId, Vec<(usize, CommitmentEvent)>> = BTreeMap::new();
        for (i, ev) in events.into_iter().enumerate() {
            by_subnet.entry(ev.subnet_id).or_default().push((i, ev));
        }

        let mut handles = Vec::with_capacity(by_subnet.len());
        for (subnet, batch) in by_subnet {
            let this = Arc::clone(self);
            let indices: Vec<usize> = batch.iter().map(|(i, _)| *i).collect();
            let handle = tokio::spawn(async move {
                let mut out = Vec::with_capacity(batch.len());
                for (i, ev) in batch {
                    out.push((i, this.process_event(&ev).await));
                }
                out
            });
            handles.push((subnet, indices, handle));
        }

        let mut slots: Vec<Option<SettlementOutcome>> = vec![None; total];
        for (subnet, indices, handle) in handles {
            match handle.await {
                Ok(results) => {
                    for (i, outcome) in results {
                        slots[i] = Some(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(subnet = %subnet, error = %e, "settlement task aborted");
                    for i in indices {
                        slots[i] = Some(SettlementOutcome::Failed {
                            kind: FailureKind::Unclassified,
                            stage: SettlementStage::Idle,
                            reason: format!("settlement task aborted: {e}"),
                        });
                    }
                }
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Settle one commitment event.
    pub async fn process_event(&self, event: &CommitmentEvent) -> SettlementOutcome {
        bump(&self.stats.events_processed);
        let mut stage = SettlementStage::Idle;

        if let Some(outcome) = self.halted_outcome(stage).await {
            return outcome;
        }

        match self.records.begin(event.subnet_id, event.period).await {
            Ok(BeginOutcome::Started(_)) => {}
            Ok(BeginOutcome::AlreadyConfirmed(record)) => {
                tracing::info!(
                    subnet = %event.subnet_id,
                    period = event.period.0,
                    "already settled (local record)"
                );
                bump(&self.stats.already_settled);
                return SettlementOutcome::AlreadySettled {
                    tx_hashes: record.tx_hashes,
                };
            }
            Err(err) => return self.fail(event, stage, err, false).await,
        }

        match self.settle(event, &mut stage).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(event, stage, err, true).await,
        }
    }

    async fn halted_outcome(&self, stage: SettlementStage) -> Option<SettlementOutcome> {
        if !self.is_halted() {
            return None;
        }
        let (kind, reason) = self
            .failures
            .halt_info()
            .await
            .unwrap_or((FailureKind::Unclassified, "halted".into()));
        Some(SettlementOutcome::Halted {
            kind,
            stage,
            reason,
        })
    }

    fn ctx(event: &CommitmentEvent, stage: SettlementStage) -> FailureContext {
        FailureContext {
            subnet_id: event.subnet_id,
            period: event.period,
            stage,
        }
    }

    fn advance(event: &CommitmentEvent, stage: &mut SettlementStage, next: SettlementStage) {
        *stage = next;
        tracing::info!(
            subnet = %event.subnet_id,
            period = event.period.0,
            stage = %next,
            "settlement stage"
        );
    }

    async fn settle(
        &self,
        event: &CommitmentEvent,
        stage: &mut SettlementStage,
    ) -> Result<SettlementOutcome> {
        let timeout = self.config.ledger_timeout;
        let (subnet_id, period) = (event.subnet_id, event.period);
        let execution = &self.execution;
        let ledger = &self.ledger;
        let treasury_provider = &self.treasury;

        Self::advance(event, stage, SettlementStage::Fetching);
        let subnet = self
            .failures
            .retry(Self::ctx(event, *stage), || {
                with_timeout(timeout, "fetch subnet", execution.fetch_subnet(&subnet_id))
            })
            .await?;
        let account = subnet
            .treasury
            .clone()
            .ok_or(PomError::SubnetInactive(subnet_id))?;

        // Fail closed: a failed search aborts before anything is signed.
        let tag = IdempotencyTag::derive(&subnet_id, period);
        let replay = &self.replay;
        let check = self
            .failures
            .retry(Self::ctx(event, *stage), || replay.check(&account, &tag))
            .await?;
        if let ReplayCheck::AlreadySettled { tx_hashes, ledgers } = check {
            tracing::info!(subnet = %subnet_id, period = period.0, "already settled (ledger memo)");
            return self.settled_on_ledger(event, stage, tx_hashes, ledgers).await;
        }

        let commitment = self
            .failures
            .retry(Self::ctx(event, *stage), || {
                with_timeout(
                    timeout,
                    "fetch commitment",
                    execution.fetch_commitment(&subnet_id, period),
                )
            })
            .await?;
        if commitment.state_root != event.state_root {
            return Err(PomError::PomMismatch {
                reason: format!(
                    "event state root {} differs from committed root {}",
                    event.state_root, commitment.state_root
                ),
            });
        }
        let withdrawals = self
            .failures
            .retry(Self::ctx(event, *stage), || {
                with_timeout(
                    timeout,
                    "fetch withdrawals",
                    execution.fetch_withdrawals(&subnet_id, period),
                )
            })
            .await?;

        Self::advance(event, stage, SettlementStage::Planning);
        let snapshot = self
            .failures
            .retry(Self::ctx(event, *stage), || {
                with_timeout(timeout, "treasury snapshot", treasury_provider.snapshot(&account))
            })
            .await?;
        let mut plan = self.planner.plan(subnet_id, period, &withdrawals, &snapshot)?;

        Self::advance(event, stage, SettlementStage::Verifying);
        verify_delta_match(&plan.delta, &commitment.authorized_delta)?;
        let recomputed = compute_net_outflow(&withdrawals)?;
        verify_delta_match(&recomputed, &commitment.authorized_delta)?;
        check_covers(&plan.direct_outflow()?, &snapshot)?;

        if plan.pending_conversions().next().is_some() {
            Self::advance(event, stage, SettlementStage::Planning);
            self.convert(event, *stage, &mut plan).await?;
            Self::advance(event, stage, SettlementStage::Verifying);
            let mut total = plan.direct_outflow()?;
            for (asset, amount) in plan.conversion_outflow()?.iter() {
                total.add(*asset, *amount)?;
            }
            check_covers(&total, &snapshot)?;
        }

        let receipt = if plan.is_empty() {
            tracing::info!(subnet = %subnet_id, period = period.0, "empty plan, nothing to submit");
            None
        } else {
            if self.is_halted() {
                return Err(PomError::Halted {
                    reason: "engine halted before signing".into(),
                });
            }
            Self::advance(event, stage, SettlementStage::Signing);
            let sequence = self
                .failures
                .retry(Self::ctx(event, *stage), || {
                    with_timeout(timeout, "sequence", ledger.sequence(&account))
                })
                .await?;
            let tx = UnsignedTransaction::from_plan(&account, sequence, tag, &plan)?;
            let signed = self.multisig.sign(tx, &snapshot).await?;

            Self::advance(event, stage, SettlementStage::Submitting);
            let receipt = match self
                .multisig
                .submit(&signed, &snapshot, &self.failures, Self::ctx(event, *stage))
                .await?
            {
                Submission::Applied(receipt) => receipt,
                Submission::SettledElsewhere(found) => {
                    let (tx_hashes, ledgers): (Vec<_>, Vec<_>) =
                        found.iter().map(|t| (t.hash, t.ledger)).unzip();
                    return self.settled_on_ledger(event, stage, tx_hashes, ledgers).await;
                }
            };
            tracing::info!(
                subnet = %subnet_id,
                period = period.0,
                tx = %receipt.hash,
                ledger = receipt.ledger,
                operations = receipt.applied_operations,
                "settlement transaction applied"
            );
            self.cross_check(&account, &snapshot, &plan).await;
            Some(receipt)
        };

        Self::advance(event, stage, SettlementStage::Confirming);
        let (tx_hashes, ledgers) = receipt.map_or((Vec::new(), Vec::new()), |r| {
            (vec![r.hash], vec![r.ledger])
        });
        let record = self
            .records
            .mark_confirmed(subnet_id, period, tx_hashes, ledgers)
            .await?;
        let confirmation_delivered = self.deliver_confirmation(event, &record).await;
        bump(&self.stats.successes);
        Self::advance(event, stage, SettlementStage::Confirmed);
        Ok(SettlementOutcome::Confirmed {
            record,
            confirmation_delivered,
        })
    }

    async fn settled_on_ledger(
        &self,
        event: &CommitmentEvent,
        stage: &mut SettlementStage,
        tx_hashes: Vec<TxHash>,
        ledgers: Vec<u64>,
    ) -> Result<SettlementOutcome> {
        Self::advance(event, stage, SettlementStage::Confirming);
        let record = self
            .records
            .mark_confirmed(event.subnet_id, event.period, tx_hashes, ledgers)
            .await?;
        self.deliver_confirmation(event, &record).await;
        bump(&self.stats.already_settled);
        Ok(SettlementOutcome::AlreadySettled {
            tx_hashes: record.tx_hashes,
        })
    }

    /// Attach a checked quote to every instruction that needs conversion.
    async fn convert(
        &self,
        event: &CommitmentEvent,
        stage: SettlementStage,
        plan: &mut SettlementPlan,
    ) -> Result<()> {
        let config = self.planner.conversion_config();
        let provider = self
            .conversion
            .as_ref()
            .ok_or_else(|| PomError::ConversionPathNotFound {
                reason: "no conversion provider configured".into(),
            })?;
        let timeout = self.config.ledger_timeout;

        let pending: Vec<(WithdrawalId, Asset, Amount)> = plan
            .pending_conversions()
            .map(|i| (i.withdrawal_id, i.asset.clone(), i.amount))
            .collect();
        for (withdrawal_id, asset, amount) in pending {
            let asset = &asset;
            let quote = self
                .failures
                .retry(Self::ctx(event, stage), move || async move {
                    let quote = with_timeout(
                        timeout,
                        "conversion quote",
                        provider.quote(&config.source_asset, asset, amount),
                    )
                    .await?
                    .ok_or_else(|| PomError::ConversionPathNotFound {
                        reason: format!("no path from {} to {asset}", config.source_asset),
                    })?;
                    check_quote(&quote, asset, amount, config.max_slippage_percent)?;
                    Ok::<_, PomError>(quote)
                })
                .await?;
            plan.apply_conversion(withdrawal_id, &quote, config)?;
        }
        Ok(())
    }

    /// Compare post-settlement balances against the plan. Logged only.
    async fn cross_check(&self, account: &str, before: &TreasurySnapshot, plan: &SettlementPlan) {
        let after = match with_timeout(
            self.config.ledger_timeout,
            "balances",
            self.ledger.balances(account),
        )
        .await
        {
            Ok(after) => after,
            Err(e) => {
                tracing::warn!(error = %e, "post-settlement cross-check skipped");
                return;
            }
        };
        let (Ok(direct), Ok(converted)) = (plan.direct_outflow(), plan.conversion_outflow()) else {
            return;
        };
        for (asset, expected) in direct.iter() {
            let now = after.get(asset).copied().unwrap_or(0);
            match checked_sub(before.balance(asset), now) {
                Ok(spent) if spent == *expected => {}
                Ok(spent) => tracing::warn!(
                    asset = %asset,
                    expected = %expected,
                    spent = %spent,
                    "post-settlement balance diverges from plan"
                ),
                Err(_) => tracing::warn!(asset = %asset, "post-settlement balance overflow"),
            }
        }
        for (asset, bound) in converted.iter() {
            let now = after.get(asset).copied().unwrap_or(0);
            let spent = before.balance(asset).saturating_sub(now);
            if spent > bound.saturating_add(direct.amount(asset)) {
                tracing::warn!(
                    asset = %asset,
                    bound = %bound,
                    spent = %spent,
                    "conversion spent more than its bound"
                );
            }
        }
    }

    async fn deliver_confirmation(&self, event: &CommitmentEvent, record: &SettlementRecord) -> bool {
        let confirmation = SettlementConfirmation::from_record(record);
        match with_timeout(
            self.config.ledger_timeout,
            "send confirmation",
            self.execution.send_confirmation(&confirmation),
        )
        .await
        {
            Ok(()) => {
                bump(&self.stats.confirmations_sent);
                true
            }
            Err(e) => {
                // Funds moved and the record is confirmed. A restarted engine
                // re-sends it when the memo search finds the settlement.
                self.failures
                    .record(Self::ctx(event, SettlementStage::Confirming), &e, 0)
                    .await;
                false
            }
        }
    }

    async fn fail(
        &self,
        event: &CommitmentEvent,
        stage: SettlementStage,
        err: PomError,
        owns_record: bool,
    ) -> SettlementOutcome {
        bump(&self.stats.failures);
        if owns_record {
            if let Err(e) = self
                .records
                .mark_failed(event.subnet_id, event.period, err.to_string())
                .await
            {
                tracing::warn!(error = %e, "could not mark settlement record failed");
            }
        }

        if matches!(err, PomError::Halted { .. }) {
            if let Some(outcome) = self.halted_outcome(stage).await {
                return outcome;
            }
        }

        let policy = self.failures.record(Self::ctx(event, stage), &err, 0).await;
        let kind = err.failure_kind();
        if policy.is_halt() {
            bump(&self.stats.halts);
            SettlementOutcome::Halted {
                kind,
                stage,
                reason: err.to_string(),
            }
        } else {
            SettlementOutcome::Failed {
                kind,
                stage,
                reason: err.to_string(),
            }
        }
    }
}

/// Every asset in `outflow` is covered by the snapshot balance.
fn check_covers(outflow: &PomDelta, snapshot: &TreasurySnapshot) -> Result<()> {
    for (asset, needed) in outflow.iter() {
        let available = snapshot.balance(asset);
        if available < *needed {
            return Err(PomError::InsufficientBalance {
                asset: *asset,
                needed: *needed,
                available,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pom_commitment::CommitmentLedger;
    use pom_types::{AssetId, Period, StateRoot};
    use tokio::sync::Mutex;

    use super::*;
    use crate::{InMemoryExecutionLayer, InMemoryLedger};

    fn collaborators() -> Collaborators {
        let ledger = Arc::new(InMemoryLedger::new(&pom_types::dummy_address(1)));
        Collaborators {
            execution: Arc::new(InMemoryExecutionLayer::new(Arc::new(Mutex::new(
                CommitmentLedger::new(),
            )))),
            ledger: ledger.clone(),
            treasury: ledger,
            signers: Vec::new(),
            conversion: None,
        }
    }

    fn event() -> CommitmentEvent {
        CommitmentEvent {
            subnet_id: SubnetId([1u8; 32]),
            period: Period(1),
            state_root: StateRoot([2u8; 32]),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SettlementConfig {
            record_cache_size: 0,
            ..SettlementConfig::default()
        };
        assert!(matches!(
            IntegrationOrchestrator::new(config, collaborators()),
            Err(PomError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn unknown_subnet_fails_at_fetch() {
        let orch = IntegrationOrchestrator::new(SettlementConfig::default(), collaborators()).unwrap();
        let outcome = orch.process_event(&event()).await;
        let SettlementOutcome::Failed { kind, stage, .. } = outcome else {
            panic!("expected failed, got {outcome:?}");
        };
        assert_eq!(kind, FailureKind::Unclassified);
        assert_eq!(stage, SettlementStage::Fetching);
        assert!(!orch.is_halted());
        assert_eq!(orch.stats().failures, 1);
    }

    #[tokio::test]
    async fn halted_engine_refuses_events() {
        let orch = IntegrationOrchestrator::new(SettlementConfig::default(), collaborators()).unwrap();
        let ctx = FailureContext {
            subnet_id: SubnetId([9u8; 32]),
            period: Period(3),
            stage: SettlementStage::Verifying,
        };
        let err = PomError::PomMismatch {
            reason: "test".into(),
        };
        orch.failures().record(ctx, &err, 0).await;

        let outcome = orch.process_event(&event()).await;
        assert!(matches!(
            outcome,
            SettlementOutcome::Halted {
                kind: FailureKind::PomMismatch,
                stage: SettlementStage::Idle,
                ..
            }
        ));
        // Nothing was claimed for the refused event.
        assert!(orch.records().get(SubnetId([1u8; 32]), Period(1)).await.is_none());
    }

    #[test]
    fn coverage_check_reports_shortfall() {
        let asset = AssetId([3u8; 32]);
        let snapshot = TreasurySnapshot {
            balances: [(asset, 100)].into_iter().collect(),
            signers: Vec::new(),
            threshold: 1,
            fetched_at: Utc::now(),
        };
        let fits: PomDelta = [(asset, 100)].into_iter().collect();
        assert!(check_covers(&fits, &snapshot).is_ok());

        let too_much: PomDelta = [(asset, 101)].into_iter().collect();
        assert!(matches!(
            check_covers(&too_much, &snapshot),
            Err(PomError::InsufficientBalance {
                needed: 101,
                available: 100,
                ..
            })
        ));
        let missing: PomDelta = [(AssetId([4u8; 32]), 1)].into_iter().collect();
        assert!(check_covers(&missing, &snapshot).is_err());
    }
}
