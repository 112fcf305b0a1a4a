//! # pom-settlement
//!
//! **Finality plane** of the Proof-of-Money bridge: turns committed
//! withdrawals into exactly one multisig transaction per `(subnet, period)`
//! on the settlement ledger.
//!
//! ## Architecture
//!
//! The [`IntegrationOrchestrator`] receives a [`CommitmentEvent`] from the
//! execution layer and:
//! 1. Claims the `(subnet, period)` in the [`SettlementRecordStore`]
//! 2. Searches the treasury history for the idempotency memo (fail closed)
//! 3. Plans payments and verifies them against the authorized PoM delta
//! 4. Resolves conversions for assets the treasury does not hold
//! 5. Collects threshold signatures and submits ([`MultisigOrchestrator`])
//! 6. Sends a [`SettlementConfirmation`] back to the execution layer
//!
//! Every failure is classified by the [`FailureHandler`]: retried with
//! backoff, skipped, or latched into a global halt.
//!
//! [`CommitmentEvent`]: pom_types::CommitmentEvent
//! [`SettlementConfirmation`]: pom_types::SettlementConfirmation

pub mod collaborators;
pub mod failure;
pub mod in_memory;
pub mod multisig;
pub mod orchestrator;
pub mod record_store;
pub mod replay;
pub mod signer;
pub mod telemetry;
pub mod transaction;

pub use collaborators::{
    CommitmentEventSource, ConversionProvider, ExecutionLayer, LedgerTransaction,
    SettlementLedger, SubmissionReceipt, TransactionSigner, TreasurySnapshotProvider,
};
pub use failure::{FailureContext, FailureHandler, FailureRecord, with_timeout};
pub use in_memory::{
    ChannelEventSource, InMemoryConversion, InMemoryExecutionLayer, InMemoryLedger, LedgerFault,
};
pub use multisig::{MultisigOrchestrator, Submission};
pub use orchestrator::{Collaborators, IntegrationOrchestrator, SettlementStats};
pub use record_store::{BeginOutcome, SettlementRecordStore};
pub use replay::{ReplayCheck, ReplayProtectionService};
pub use signer::Ed25519Signer;
pub use telemetry::{LogFormat, init_tracing};
pub use transaction::{DecoratedSignature, Operation, SignedTransaction, UnsignedTransaction};
