//! # pom-commitment
//!
//! **Execution-layer plane**: subnet registry, withdrawal queue, PoM
//! validation and the commitment ledger.
//!
//! ## Architecture
//!
//! 1. **SubnetRegistry**: auditor quorum, threshold and asset whitelist per subnet
//! 2. **WithdrawalQueue**: intents per `(subnet, period)`
//! 3. **pom_check**: constructibility, solvency and authorization of a treasury snapshot
//! 4. **CommitmentLedger**: accepts period summaries, all-or-nothing
//!
//! ## Commit Flow
//!
//! ```text
//! create_subnet → register_treasury → enqueue_withdrawal*
//!     → commit(CommitRequest) → Commitment + CommitmentEvent → settlement
//! ```
//!
//! A commitment exists only if the treasury could pay every withdrawal it
//! authorizes at the time it was accepted.

pub mod ledger;
pub mod pom_check;
pub mod registry;
pub mod withdrawal_queue;

pub use ledger::{CommitRequest, CommitmentLedger};
pub use pom_check::{check_authorization, check_constructible, check_solvency, validate_pom};
pub use registry::{SubnetRegistry, derive_subnet_id};
pub use withdrawal_queue::WithdrawalQueue;
