//! Failure handling: classification, bounded retry and the halt latch.
//!
//! Every failure is classified through [`PomError::failure_kind`] and the
//! fixed policy table, then appended to an append-only audit log. A `Halt`
//! action latches the process-wide halted flag; once set, the orchestrator
//! refuses all further events until an operator restarts it.

use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use pom_types::{
    FailureAction, FailureKind, FailurePolicy, Period, PomError, Result, RetryConfig,
    SettlementStage, Severity, SubnetId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureContext {
    pub subnet_id: SubnetId,
    pub period: Period,
    pub stage: SettlementStage,
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub severity: Severity,
    pub action: FailureAction,
    pub subnet_id: SubnetId,
    pub period: Period,
    pub stage: SettlementStage,
    pub message: String,
    /// 0-based attempt number of the failed operation.
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// Run `fut` with a deadline, mapping expiry to `LedgerTimeout`.
///
/// # Errors
/// `LedgerTimeout { operation }` on expiry, otherwise the future's own error.
pub async fn with_timeout<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PomError::LedgerTimeout {
            operation: operation.to_string(),
        })?
}

pub struct FailureHandler {
    retry: RetryConfig,
    halted: AtomicBool,
    /// Kind and description of the failure that latched the halt.
    halt: Mutex<Option<(FailureKind, String)>>,
    log: Mutex<Vec<FailureRecord>>,
}

impl FailureHandler {
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            halted: AtomicBool::new(false),
            halt: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn halt_info(&self) -> Option<(FailureKind, String)> {
        self.halt.lock().await.clone()
    }

    /// Classify `err`, append it to the audit log and latch the halt flag
    /// for critical kinds.
    pub async fn record(&self, ctx: FailureContext, err: &PomError, attempt: u32) -> FailurePolicy {
        let kind = err.failure_kind();
        let policy = kind.policy();
        let message = err.to_string();

        match policy.severity {
            Severity::Critical => tracing::error!(
                subnet = %ctx.subnet_id,
                period = ctx.period.0,
                stage = %ctx.stage,
                kind = %kind,
                error = %message,
                "critical settlement failure"
            ),
            Severity::Error => tracing::warn!(
                subnet = %ctx.subnet_id,
                period = ctx.period.0,
                stage = %ctx.stage,
                kind = %kind,
                attempt,
                error = %message,
                "settlement failure"
            ),
            Severity::Warning => tracing::info!(
                subnet = %ctx.subnet_id,
                period = ctx.period.0,
                stage = %ctx.stage,
                kind = %kind,
                attempt,
                "settlement warning"
            ),
        }

        if policy.is_halt() && !self.halted.swap(true, Ordering::SeqCst) {
            *self.halt.lock().await = Some((
                kind,
                format!("{kind} at {} for {} period {}", ctx.stage, ctx.subnet_id, ctx.period),
            ));
            tracing::error!(kind = %kind, "settlement engine halted; manual review required");
        }

        self.log.lock().await.push(FailureRecord {
            kind,
            severity: policy.severity,
            action: policy.action,
            subnet_id: ctx.subnet_id,
            period: ctx.period,
            stage: ctx.stage,
            message,
            attempt,
            at: Utc::now(),
        });
        policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable kind, or the
    /// kind's attempts are used up. Retried failures are logged here; the
    /// final error is returned for the caller to record.
    ///
    /// # Errors
    /// The last error returned by `op`.
    pub async fn retry<T, F, Fut>(&self, ctx: FailureContext, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            let Some(policy) = self.retry.policy_for(err.failure_kind()) else {
                return Err(err);
            };
            if attempt + 1 >= policy.max_attempts {
                return Err(err);
            }
            let delay = policy.delay_for(attempt);
            self.record(ctx, &err, attempt).await;
            tracing::debug!(attempt, delay_ms = delay.as_millis(), "backing off before retry");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Snapshot of the audit log, oldest first.
    pub async fn audit_log(&self) -> Vec<FailureRecord> {
        self.log.lock().await.clone()
    }
}
