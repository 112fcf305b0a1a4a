//! # pom-planner
//!
//! **Pure deterministic planning for the Proof-of-Money bridge.**
//!
//! The planner is the compute plane between commitment and settlement. It
//! takes a committed withdrawal queue and a treasury snapshot and produces
//! the exact payments to make. It has:
//!
//! - **Zero side effects**: no ledger calls, no signing, no persistence
//! - **Deterministic output**: same withdrawal multiset -> same plan on every node
//! - **Exact verification**: the planned delta must equal the authorized delta
//! - **Bounded conversion**: path payments never exceed the slippage cap

pub mod conversion;
pub mod delta;
pub mod determinism;
pub mod planner;

pub use conversion::{ConversionQuote, check_quote, max_send_amount, slippage_bps};
pub use delta::{compute_net_outflow, verify_delta_match};
pub use determinism::{compute_plan_root, verify_plan_root};
pub use planner::{AssetGroup, ConversionLeg, SettlementPlan, SettlementPlanner, TransferInstruction};
