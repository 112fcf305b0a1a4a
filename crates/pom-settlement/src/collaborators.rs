//! Capability traits for everything outside the settlement engine.
//!
//! The orchestrator holds each collaborator as an `Arc<dyn Trait>` chosen at
//! construction. [`crate::in_memory`] provides implementations for local use
//! and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ed25519_dalek::Signature;
use pom_planner::ConversionQuote;
use pom_types::{
    Amount, Asset, AssetId, AuditorId, Commitment, CommitmentEvent, IdempotencyTag, Period,
    Result, SettlementConfirmation, Subnet, SubnetId, TreasurySnapshot, TxHash,
    WithdrawalIntent,
};
use serde::{Deserialize, Serialize};

use crate::SignedTransaction;

/// Stream of commitment events from the execution layer.
#[async_trait]
pub trait CommitmentEventSource: Send + Sync {
    /// Next event, or `None` once the source is exhausted.
    async fn next_event(&self) -> Option<CommitmentEvent>;
}

/// Read access to committed execution-layer state plus the confirmation
/// channel back to it.
#[async_trait]
pub trait ExecutionLayer: Send + Sync {
    async fn fetch_subnet(&self, subnet_id: &SubnetId) -> Result<Subnet>;

    async fn fetch_commitment(&self, subnet_id: &SubnetId, period: Period) -> Result<Commitment>;

    async fn fetch_withdrawals(
        &self,
        subnet_id: &SubnetId,
        period: Period,
    ) -> Result<Vec<WithdrawalIntent>>;

    async fn send_confirmation(&self, confirmation: &SettlementConfirmation) -> Result<()>;
}

/// Fresh treasury balances and signer configuration.
#[async_trait]
pub trait TreasurySnapshotProvider: Send + Sync {
    async fn snapshot(&self, treasury: &str) -> Result<TreasurySnapshot>;
}

/// Result of a submission accepted by the settlement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub hash: TxHash,
    pub ledger: u64,
    /// Operations the ledger reports as applied.
    pub applied_operations: usize,
}

/// A transaction found in the treasury account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub hash: TxHash,
    pub ledger: u64,
    pub memo: IdempotencyTag,
    pub applied_operations: usize,
}

/// The asset-custodying settlement ledger.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Next sequence number for `account`.
    async fn sequence(&self, account: &str) -> Result<u64>;

    async fn submit(&self, tx: &SignedTransaction) -> Result<SubmissionReceipt>;

    /// Transactions of `account` whose memo equals `tag`.
    async fn find_by_memo(&self, account: &str, tag: &IdempotencyTag)
    -> Result<Vec<LedgerTransaction>>;

    async fn balances(&self, account: &str) -> Result<BTreeMap<AssetId, Amount>>;
}

/// Opaque signing capability for one treasury signer.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn id(&self) -> AuditorId;

    async fn sign(&self, hash: &TxHash) -> Result<Signature>;
}

/// Best-effort path discovery for assets the treasury does not hold.
#[async_trait]
pub trait ConversionProvider: Send + Sync {
    /// A path delivering exactly `dest_amount` of `dest_asset`, or `None`.
    async fn quote(
        &self,
        send_asset: &Asset,
        dest_asset: &Asset,
        dest_amount: Amount,
    ) -> Result<Option<ConversionQuote>>;
}
