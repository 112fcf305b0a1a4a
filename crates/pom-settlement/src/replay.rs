//! Replay protection: a `(subnet, period)` is settled at most once.
//!
//! The idempotency tag is carried as the settlement transaction's memo.
//! Before anything is submitted the treasury account's history is searched
//! for that memo. The search is fail-closed: if the ledger cannot be queried,
//! the error propagates and nothing is submitted.

use std::{sync::Arc, time::Duration};

use pom_types::{IdempotencyTag, Period, Result, SubnetId, TxHash};

use crate::{SettlementLedger, failure::with_timeout};

/// Result of a ledger history check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCheck {
    NotSettled,
    AlreadySettled {
        tx_hashes: Vec<TxHash>,
        ledgers: Vec<u64>,
    },
}

pub struct ReplayProtectionService {
    ledger: Arc<dyn SettlementLedger>,
    timeout: Duration,
}

impl ReplayProtectionService {
    #[must_use]
    pub fn new(ledger: Arc<dyn SettlementLedger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    #[must_use]
    pub fn tag(subnet_id: &SubnetId, period: Period) -> IdempotencyTag {
        IdempotencyTag::derive(subnet_id, period)
    }

    /// Search `treasury`'s history for transactions carrying `tag`.
    ///
    /// # Errors
    /// Any ledger error, including `LedgerTimeout`.
    pub async fn check(&self, treasury: &str, tag: &IdempotencyTag) -> Result<ReplayCheck> {
        let found = with_timeout(
            self.timeout,
            "memo search",
            self.ledger.find_by_memo(treasury, tag),
        )
        .await?;
        if found.is_empty() {
            return Ok(ReplayCheck::NotSettled);
        }
        tracing::info!(
            tag = %tag,
            transactions = found.len(),
            "idempotency tag already on ledger"
        );
        Ok(ReplayCheck::AlreadySettled {
            tx_hashes: found.iter().map(|t| t.hash).collect(),
            ledgers: found.iter().map(|t| t.ledger).collect(),
        })
    }
}
