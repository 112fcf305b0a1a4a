//! # pom-types
//!
//! Shared types, errors, and configuration for the **Proof-of-Money**
//! commit-and-settle bridge.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`SubnetId`], [`AuditorId`], [`WithdrawalId`], [`UserId`], [`Period`], [`StateRoot`], [`AssetId`], [`IdempotencyTag`], [`TxHash`]
//! - **Assets**: [`Asset`], [`AssetIssuer`], [`Amount`] with checked arithmetic
//! - **Execution layer model**: [`Subnet`], [`WithdrawalIntent`], [`Commitment`], [`CommitmentEvent`]
//! - **PoM model**: [`PomDelta`], [`TreasurySnapshot`]
//! - **Settlement model**: [`SettlementRecord`], [`SettlementStatus`], [`SettlementConfirmation`], [`SettlementOutcome`], [`SettlementStage`]
//! - **Failure taxonomy**: [`FailureKind`], [`Severity`], [`FailureAction`], [`FailurePolicy`]
//! - **Configuration**: [`SettlementConfig`], [`RetryConfig`], [`RetryPolicy`], [`ConversionConfig`]
//! - **Errors**: [`PomError`] with `POM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod asset;
pub mod commitment;
pub mod config;
pub mod constants;
pub mod delta;
pub mod error;
pub mod failure;
pub mod ids;
pub mod settlement;
pub mod subnet;
pub mod treasury;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use pom_types::{SubnetId, Period, PomDelta, ...};

pub use asset::*;
pub use commitment::*;
pub use config::*;
pub use delta::*;
pub use error::*;
pub use failure::*;
pub use ids::*;
pub use settlement::*;
pub use subnet::*;
pub use treasury::*;
pub use withdrawal::*;

// Constants are accessed via `pom_types::constants::FOO`
// (not re-exported to avoid name collisions).
