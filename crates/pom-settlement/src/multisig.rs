//! Multisignature signing and submission.
//!
//! Signatures are collected only from signers in the treasury's current
//! signer set, stopping at its threshold. Each one is verified before it is
//! attached. Right before submission the signer configuration is read again;
//! any change since signing halts the settlement.
//!
//! A submission that times out is ambiguous: it may or may not have landed.
//! The ledger is searched for the memo before the identical transaction is
//! resubmitted, so an ambiguous submission is resolved, never blindly sent
//! twice. Any transaction carrying the memo settles the period, even one
//! with a different hash (an earlier instance or another replica signed
//! it); ours is then never resubmitted. Submissions are never cancelled.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use pom_types::{PomError, Result, TreasurySnapshot};

use crate::{
    DecoratedSignature, LedgerTransaction, SettlementLedger, SignedTransaction, SubmissionReceipt,
    TransactionSigner, TreasurySnapshotProvider, UnsignedTransaction,
    failure::{FailureContext, FailureHandler, with_timeout},
};

/// How a submission resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Our transaction applied in full.
    Applied(SubmissionReceipt),
    /// Other transactions carrying the memo are on the ledger; ours was
    /// not resubmitted.
    SettledElsewhere(Vec<LedgerTransaction>),
}

pub struct MultisigOrchestrator {
    ledger: Arc<dyn SettlementLedger>,
    treasury: Arc<dyn TreasurySnapshotProvider>,
    signers: Vec<Arc<dyn TransactionSigner>>,
    network_passphrase: String,
    timeout: Duration,
}

impl MultisigOrchestrator {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn SettlementLedger>,
        treasury: Arc<dyn TreasurySnapshotProvider>,
        signers: Vec<Arc<dyn TransactionSigner>>,
        network_passphrase: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            treasury,
            signers,
            network_passphrase: network_passphrase.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    /// Collect `snapshot.threshold` verified signatures over `tx`.
    ///
    /// # Errors
    /// `ThresholdNotMet` if fewer authorized signers produce a valid
    /// signature than the threshold requires.
    pub async fn sign(
        &self,
        tx: UnsignedTransaction,
        snapshot: &TreasurySnapshot,
    ) -> Result<SignedTransaction> {
        let threshold = snapshot.threshold as usize;
        if threshold == 0 {
            return Err(PomError::ThresholdNotMet {
                reason: "treasury threshold is zero".into(),
            });
        }
        let allowed = snapshot.signer_set();
        let hash = tx.hash(&self.network_passphrase);

        let mut used = BTreeSet::new();
        let mut signatures = Vec::with_capacity(threshold);
        for signer in &self.signers {
            if signatures.len() >= threshold {
                break;
            }
            let id = signer.id();
            if !allowed.contains(&id) || !used.insert(id) {
                continue;
            }
            let signature = match with_timeout(self.timeout, "sign", signer.sign(&hash)).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(signer = %id.short(), error = %e, "signer failed");
                    continue;
                }
            };
            let decorated = DecoratedSignature {
                signer: id,
                signature,
            };
            if let Err(e) = decorated.verify(&hash) {
                tracing::warn!(signer = %id.short(), error = %e, "discarding invalid signature");
                continue;
            }
            signatures.push(decorated);
        }

        if signatures.len() < threshold {
            return Err(PomError::ThresholdNotMet {
                reason: format!(
                    "{} valid signatures from authorized signers, threshold {threshold}",
                    signatures.len()
                ),
            });
        }
        tracing::debug!(tx = %hash, signatures = signatures.len(), "transaction signed");
        Ok(SignedTransaction {
            tx,
            hash,
            signatures,
        })
    }

    /// Submit `signed`, resolving timeouts against the ledger.
    ///
    /// # Errors
    /// - `ThresholdNotMet` if the signer set or threshold changed since signing
    /// - `PartialSubmission` if fewer operations applied than were sent
    /// - `LedgerTimeout` once the timeout retry policy is exhausted
    /// - any ledger error, including from the memo search (fail closed)
    pub async fn submit(
        &self,
        signed: &SignedTransaction,
        signing_snapshot: &TreasurySnapshot,
        failures: &FailureHandler,
        ctx: FailureContext,
    ) -> Result<Submission> {
        let account = signed.tx.source.as_str();
        let current = with_timeout(
            self.timeout,
            "treasury snapshot",
            self.treasury.snapshot(account),
        )
        .await?;
        if !current.same_authorization(signing_snapshot) {
            return Err(PomError::ThresholdNotMet {
                reason: format!(
                    "treasury signers changed since signing ({} signers / threshold {} -> {} / {})",
                    signing_snapshot.signer_set().len(),
                    signing_snapshot.threshold,
                    current.signer_set().len(),
                    current.threshold
                ),
            });
        }

        let policy = failures.retry_config().ledger_timeout.clone();
        let mut attempt: u32 = 0;
        loop {
            let err = match with_timeout(self.timeout, "submit", self.ledger.submit(signed)).await {
                Ok(receipt) => return check_receipt(signed, receipt).map(Submission::Applied),
                Err(e @ PomError::LedgerTimeout { .. }) => e,
                Err(e) => return Err(e),
            };

            // Ambiguous: the transaction may have landed.
            let found = with_timeout(
                self.timeout,
                "memo search",
                self.ledger.find_by_memo(account, &signed.tx.memo),
            )
            .await?;
            if let Some(landed) = found.iter().find(|t| t.hash == signed.hash) {
                tracing::info!(tx = %landed.hash, ledger = landed.ledger, "timed-out submission had landed");
                return check_receipt(
                    signed,
                    SubmissionReceipt {
                        hash: landed.hash,
                        ledger: landed.ledger,
                        applied_operations: landed.applied_operations,
                    },
                )
                .map(Submission::Applied);
            }
            if !found.is_empty() {
                tracing::warn!(
                    tx = %signed.hash,
                    found = found.len(),
                    memo = %signed.tx.memo,
                    "memo settled by another transaction, not resubmitting"
                );
                return Ok(Submission::SettledElsewhere(found));
            }

            if attempt + 1 >= policy.max_attempts {
                return Err(err);
            }
            failures.record(ctx, &err, attempt).await;
            tokio::time::sleep(policy.delay_for(attempt)).await;
            attempt += 1;
            tracing::warn!(tx = %signed.hash, attempt, "resubmitting identical transaction");
        }
    }
}

fn check_receipt(signed: &SignedTransaction, receipt: SubmissionReceipt) -> Result<SubmissionReceipt> {
    if receipt.hash != signed.hash {
        return Err(PomError::Ledger {
            reason: format!("receipt for {} but submitted {}", receipt.hash, signed.hash),
        });
    }
    let expected = signed.operation_count();
    if receipt.applied_operations < expected {
        return Err(PomError::PartialSubmission {
            applied: receipt.applied_operations,
            expected,
        });
    }
    Ok(receipt)
}
