//! In-memory collaborators for local networks and tests.
//!
//! - [`InMemoryLedger`]: settlement ledger and treasury snapshot provider,
//!   with scripted faults
//! - [`InMemoryExecutionLayer`]: serves a shared [`CommitmentLedger`]
//! - [`ChannelEventSource`]: commitment events over a tokio channel
//! - [`InMemoryConversion`]: fixed-premium path quotes

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use pom_commitment::CommitmentLedger;
use pom_planner::ConversionQuote;
use pom_types::{
    Amount, Asset, AssetId, AuditorId, Commitment, CommitmentEvent, IdempotencyTag, Period,
    PomError, Result, SettlementConfirmation, Subnet, SubnetId, TreasurySnapshot, TxHash,
    WithdrawalIntent, checked_add, checked_sub, constants,
};
use tokio::sync::{Mutex, mpsc};

use crate::{
    CommitmentEventSource, ConversionProvider, ExecutionLayer, LedgerTransaction, Operation,
    SettlementLedger, SignedTransaction, SubmissionReceipt, TreasurySnapshotProvider,
};

/// How long a "hanging" call sleeps. Callers always time out first.
const HANG: Duration = Duration::from_secs(3600);

/// A scripted misbehaviour, consumed by the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    /// The next memo search fails.
    MemoSearchError,
    /// The next submit hangs; `applied` decides whether it landed first.
    SubmitTimeout { applied: bool },
    /// The next submit hangs without landing while another transaction,
    /// `hash`, carrying the same memo lands.
    SubmitTimeoutRaced { hash: TxHash },
    /// The next submit applies only the first `n` operations.
    PartialApply(usize),
    /// The next snapshot is served, then the signer configuration changes.
    RotateSignersAfterSnapshot { signers: Vec<AuditorId>, threshold: u32 },
    /// The next balances query fails.
    BalancesError,
}

struct LedgerState {
    account: String,
    network_passphrase: String,
    sequence: u64,
    ledger_seq: u64,
    balances: BTreeMap<AssetId, Amount>,
    signers: Vec<AuditorId>,
    threshold: u32,
    history: Vec<LedgerTransaction>,
    submit_calls: usize,
    faults: VecDeque<LedgerFault>,
}

impl LedgerState {
    fn take_fault(&mut self, pred: impl Fn(&LedgerFault) -> bool) -> Option<LedgerFault> {
        let pos = self.faults.iter().position(pred)?;
        self.faults.remove(pos)
    }

    fn check_account(&self, account: &str) -> Result<()> {
        if account == self.account {
            Ok(())
        } else {
            Err(PomError::Ledger {
                reason: format!("unknown account {account}"),
            })
        }
    }

    /// Validate and apply up to `limit` operations of `tx`.
    fn apply(&mut self, tx: &SignedTransaction, limit: usize) -> Result<SubmissionReceipt> {
        self.check_account(&tx.tx.source)?;
        if tx.tx.sequence != self.sequence + 1 {
            return Err(PomError::Ledger {
                reason: format!("tx_bad_seq: got {}, expected {}", tx.tx.sequence, self.sequence + 1),
            });
        }
        tx.verify(&self.network_passphrase)?;
        let authorized = tx
            .signers()
            .iter()
            .filter(|s| self.signers.contains(s))
            .count();
        if authorized < self.threshold as usize {
            return Err(PomError::Ledger {
                reason: format!("tx_bad_auth: {authorized} of {} signatures", self.threshold),
            });
        }

        let mut balances = self.balances.clone();
        let applied = tx.tx.operations.len().min(limit);
        for op in &tx.tx.operations[..applied] {
            let (asset, amount) = match op {
                Operation::Payment { asset, amount, .. } => (asset.id(), *amount),
                Operation::PathPayment {
                    send_asset,
                    send_max,
                    ..
                } => (send_asset.id(), *send_max),
            };
            let current = balances.get(&asset).copied().unwrap_or(0);
            if current < amount {
                return Err(PomError::Ledger {
                    reason: format!("op_underfunded: {asset} has {current}, needs {amount}"),
                });
            }
            // Path payments are charged their full send bound.
            balances.insert(asset, checked_sub(current, amount)?);
        }

        self.balances = balances;
        self.sequence += 1;
        self.ledger_seq += 1;
        self.history.push(LedgerTransaction {
            hash: tx.hash,
            ledger: self.ledger_seq,
            memo: tx.tx.memo,
            applied_operations: applied,
        });
        Ok(SubmissionReceipt {
            hash: tx.hash,
            ledger: self.ledger_seq,
            applied_operations: applied,
        })
    }
}

/// Single-account settlement ledger.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Empty treasury `account` on the default network.
    #[must_use]
    pub fn new(account: &str) -> Self {
        Self::with_network(account, constants::DEFAULT_NETWORK_PASSPHRASE)
    }

    #[must_use]
    pub fn with_network(account: &str, network_passphrase: &str) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                account: account.to_string(),
                network_passphrase: network_passphrase.to_string(),
                sequence: 0,
                ledger_seq: 1,
                balances: BTreeMap::new(),
                signers: Vec::new(),
                threshold: 0,
                history: Vec::new(),
                submit_calls: 0,
                faults: VecDeque::new(),
            }),
        }
    }

    pub async fn set_balance(&self, asset: AssetId, amount: Amount) {
        self.state.lock().await.balances.insert(asset, amount);
    }

    /// Add to a balance, creating the entry if needed.
    ///
    /// # Errors
    /// `AmountOverflow`.
    pub async fn credit(&self, asset: AssetId, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().await;
        let current = state.balances.get(&asset).copied().unwrap_or(0);
        state.balances.insert(asset, checked_add(current, amount)?);
        Ok(())
    }

    pub async fn set_signers(&self, signers: Vec<AuditorId>, threshold: u32) {
        let mut state = self.state.lock().await;
        state.signers = signers;
        state.threshold = threshold;
    }

    pub async fn inject(&self, fault: LedgerFault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// Pretend another process already landed a transaction with `memo`.
    pub async fn record_external(&self, memo: IdempotencyTag, hash: TxHash) {
        let mut state = self.state.lock().await;
        state.ledger_seq += 1;
        let ledger = state.ledger_seq;
        state.history.push(LedgerTransaction {
            hash,
            ledger,
            memo,
            applied_operations: 1,
        });
    }

    pub async fn balance(&self, asset: &AssetId) -> Amount {
        self.state
            .lock()
            .await
            .balances
            .get(asset)
            .copied()
            .unwrap_or(0)
    }

    /// Every call to `submit`, including ones that hung or failed.
    pub async fn submit_calls(&self) -> usize {
        self.state.lock().await.submit_calls
    }

    pub async fn history(&self) -> Vec<LedgerTransaction> {
        self.state.lock().await.history.clone()
    }
}

#[async_trait]
impl SettlementLedger for InMemoryLedger {
    async fn sequence(&self, account: &str) -> Result<u64> {
        let state = self.state.lock().await;
        state.check_account(account)?;
        Ok(state.sequence + 1)
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<SubmissionReceipt> {
        {
            let mut state = self.state.lock().await;
            state.submit_calls += 1;
            match state.take_fault(|f| {
                matches!(
                    f,
                    LedgerFault::SubmitTimeout { .. }
                        | LedgerFault::SubmitTimeoutRaced { .. }
                        | LedgerFault::PartialApply(_)
                )
            }) {
                Some(LedgerFault::SubmitTimeout { applied }) => {
                    if applied {
                        state.apply(tx, usize::MAX)?;
                    }
                }
                Some(LedgerFault::SubmitTimeoutRaced { hash }) => {
                    state.ledger_seq += 1;
                    let ledger = state.ledger_seq;
                    state.history.push(LedgerTransaction {
                        hash,
                        ledger,
                        memo: tx.tx.memo,
                        applied_operations: tx.operation_count(),
                    });
                }
                Some(LedgerFault::PartialApply(n)) => return state.apply(tx, n),
                _ => return state.apply(tx, usize::MAX),
            }
        }
        tokio::time::sleep(HANG).await;
        Err(PomError::LedgerTimeout {
            operation: "submit".into(),
        })
    }

    async fn find_by_memo(
        &self,
        account: &str,
        tag: &IdempotencyTag,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut state = self.state.lock().await;
        state.check_account(account)?;
        if state
            .take_fault(|f| *f == LedgerFault::MemoSearchError)
            .is_some()
        {
            return Err(PomError::Ledger {
                reason: "history service unavailable".into(),
            });
        }
        Ok(state
            .history
            .iter()
            .filter(|t| t.memo == *tag)
            .cloned()
            .collect())
    }

    async fn balances(&self, account: &str) -> Result<BTreeMap<AssetId, Amount>> {
        let mut state = self.state.lock().await;
        state.check_account(account)?;
        if state
            .take_fault(|f| *f == LedgerFault::BalancesError)
            .is_some()
        {
            return Err(PomError::Ledger {
                reason: "balances unavailable".into(),
            });
        }
        Ok(state.balances.clone())
    }
}

#[async_trait]
impl TreasurySnapshotProvider for InMemoryLedger {
    async fn snapshot(&self, treasury: &str) -> Result<TreasurySnapshot> {
        let mut state = self.state.lock().await;
        state.check_account(treasury)?;
        let snapshot = TreasurySnapshot {
            balances: state.balances.clone(),
            signers: state.signers.clone(),
            threshold: state.threshold,
            fetched_at: Utc::now(),
        };
        if let Some(LedgerFault::RotateSignersAfterSnapshot { signers, threshold }) = state
            .take_fault(|f| matches!(f, LedgerFault::RotateSignersAfterSnapshot { .. }))
        {
            state.signers = signers;
            state.threshold = threshold;
        }
        Ok(snapshot)
    }
}

/// Execution layer backed by a shared [`CommitmentLedger`].
pub struct InMemoryExecutionLayer {
    ledger: Arc<Mutex<CommitmentLedger>>,
    confirmations: Mutex<Vec<SettlementConfirmation>>,
    reject_confirmations: Mutex<bool>,
    /// Withdrawal lists served instead of the ledger's, per (subnet, period).
    overrides: Mutex<HashMap<(SubnetId, Period), Vec<WithdrawalIntent>>>,
}

impl InMemoryExecutionLayer {
    #[must_use]
    pub fn new(ledger: Arc<Mutex<CommitmentLedger>>) -> Self {
        Self {
            ledger,
            confirmations: Mutex::new(Vec::new()),
            reject_confirmations: Mutex::new(false),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Mutex<CommitmentLedger>> {
        &self.ledger
    }

    /// Serve `withdrawals` for `(subnet_id, period)` instead of the
    /// committed queue, as a faulty relay would.
    pub async fn override_withdrawals(
        &self,
        subnet_id: SubnetId,
        period: Period,
        withdrawals: Vec<WithdrawalIntent>,
    ) {
        self.overrides
            .lock()
            .await
            .insert((subnet_id, period), withdrawals);
    }

    pub async fn set_reject_confirmations(&self, reject: bool) {
        *self.reject_confirmations.lock().await = reject;
    }

    pub async fn confirmations(&self) -> Vec<SettlementConfirmation> {
        self.confirmations.lock().await.clone()
    }

    /// Drain the commitment ledger's event log.
    pub async fn drain_events(&self) -> Vec<CommitmentEvent> {
        self.ledger.lock().await.drain_events()
    }
}

#[async_trait]
impl ExecutionLayer for InMemoryExecutionLayer {
    async fn fetch_subnet(&self, subnet_id: &SubnetId) -> Result<Subnet> {
        self.ledger.lock().await.subnet(subnet_id).cloned()
    }

    async fn fetch_commitment(&self, subnet_id: &SubnetId, period: Period) -> Result<Commitment> {
        self.ledger
            .lock()
            .await
            .get_commitment(subnet_id, period)
            .cloned()
            .ok_or(PomError::CommitmentNotFound {
                subnet: *subnet_id,
                period,
            })
    }

    async fn fetch_withdrawals(
        &self,
        subnet_id: &SubnetId,
        period: Period,
    ) -> Result<Vec<WithdrawalIntent>> {
        if let Some(w) = self.overrides.lock().await.get(&(*subnet_id, period)) {
            return Ok(w.clone());
        }
        Ok(self
            .ledger
            .lock()
            .await
            .withdrawals(subnet_id, period)
            .to_vec())
    }

    async fn send_confirmation(&self, confirmation: &SettlementConfirmation) -> Result<()> {
        if *self.reject_confirmations.lock().await {
            return Err(PomError::ExecutionLayer {
                reason: "confirmation endpoint unavailable".into(),
            });
        }
        self.confirmations.lock().await.push(confirmation.clone());
        Ok(())
    }
}

/// Commitment events delivered over an unbounded tokio channel.
pub struct ChannelEventSource {
    rx: Mutex<mpsc::UnboundedReceiver<CommitmentEvent>>,
}

impl ChannelEventSource {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<CommitmentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Mutex::new(rx) }, tx)
    }

    /// A source that yields `events` and is then exhausted.
    #[must_use]
    pub fn from_events(events: Vec<CommitmentEvent>) -> Self {
        let (source, tx) = Self::new();
        for ev in events {
            // The receiver is alive in `source`, so this cannot fail.
            let _ = tx.send(ev);
        }
        source
    }
}

#[async_trait]
impl CommitmentEventSource for ChannelEventSource {
    async fn next_event(&self) -> Option<CommitmentEvent> {
        self.rx.lock().await.recv().await
    }
}

struct ConversionState {
    premium_bps: i128,
    missing_paths: u32,
    calls: u32,
}

/// Quotes `dest_amount × (1 + premium_bps / 10 000)` of the send asset,
/// rounded up. The first `missing_paths` requests find no path.
pub struct InMemoryConversion {
    state: Mutex<ConversionState>,
}

impl InMemoryConversion {
    #[must_use]
    pub fn new(premium_bps: i128) -> Self {
        Self {
            state: Mutex::new(ConversionState {
                premium_bps,
                missing_paths: 0,
                calls: 0,
            }),
        }
    }

    #[must_use]
    pub fn with_missing_paths(mut self, n: u32) -> Self {
        self.state.get_mut().missing_paths = n;
        self
    }

    pub async fn set_premium_bps(&self, premium_bps: i128) {
        self.state.lock().await.premium_bps = premium_bps;
    }

    pub async fn calls(&self) -> u32 {
        self.state.lock().await.calls
    }
}

#[async_trait]
impl ConversionProvider for InMemoryConversion {
    async fn quote(
        &self,
        send_asset: &Asset,
        dest_asset: &Asset,
        dest_amount: Amount,
    ) -> Result<Option<ConversionQuote>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        if state.missing_paths > 0 {
            state.missing_paths -= 1;
            return Ok(None);
        }
        let scaled = dest_amount
            .checked_mul(constants::BPS_DENOMINATOR + state.premium_bps)
            .ok_or(PomError::AmountOverflow)?;
        let send_amount = checked_add(scaled, constants::BPS_DENOMINATOR - 1)? / constants::BPS_DENOMINATOR;
        Ok(Some(ConversionQuote {
            send_asset: send_asset.clone(),
            send_amount,
            dest_asset: dest_asset.clone(),
            dest_amount,
            path: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversion_quotes_round_up() {
        let conv = InMemoryConversion::new(50);
        let q = conv
            .quote(&Asset::native(), &Asset::issued("EURC", [5u8; 32]), 999)
            .await
            .unwrap()
            .unwrap();
        // 999 * 1.005 = 1003.995 -> 1004
        assert_eq!(q.send_amount, 1_004);
        assert_eq!(q.dest_amount, 999);
    }

    #[tokio::test]
    async fn missing_paths_then_quote() {
        let conv = InMemoryConversion::new(0).with_missing_paths(1);
        let dest = Asset::issued("EURC", [5u8; 32]);
        assert!(conv.quote(&Asset::native(), &dest, 10).await.unwrap().is_none());
        assert!(conv.quote(&Asset::native(), &dest, 10).await.unwrap().is_some());
        assert_eq!(conv.calls().await, 2);
    }

    #[tokio::test]
    async fn channel_source_exhausts() {
        let ev = CommitmentEvent {
            subnet_id: SubnetId([1u8; 32]),
            period: Period(1),
            state_root: pom_types::StateRoot([1u8; 32]),
        };
        let source = ChannelEventSource::from_events(vec![ev.clone()]);
        assert_eq!(source.next_event().await, Some(ev));
        assert_eq!(source.next_event().await, None);
    }

    #[tokio::test]
    async fn snapshot_rotation_fault_applies_after_read() {
        let account = pom_types::dummy_address(1);
        let ledger = InMemoryLedger::new(&account);
        ledger.set_signers(vec![AuditorId([1u8; 32])], 1).await;
        ledger
            .inject(LedgerFault::RotateSignersAfterSnapshot {
                signers: vec![AuditorId([2u8; 32])],
                threshold: 1,
            })
            .await;
        let first = ledger.snapshot(&account).await.unwrap();
        let second = ledger.snapshot(&account).await.unwrap();
        assert_eq!(first.signers, vec![AuditorId([1u8; 32])]);
        assert_eq!(second.signers, vec![AuditorId([2u8; 32])]);
        assert!(!first.same_authorization(&second));
    }

    #[tokio::test]
    async fn unknown_account_rejected() {
        let ledger = InMemoryLedger::new(&pom_types::dummy_address(1));
        assert!(ledger.sequence("GNOPE").await.is_err());
    }
}
