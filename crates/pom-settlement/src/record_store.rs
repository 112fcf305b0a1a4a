//! Settlement record store: prevents two attempts at one `(subnet, period)`.
//!
//! [`SettlementRecordStore::begin`] is an atomic check-and-set under a
//! `tokio::sync::Mutex`, taken before any network call. A pending record
//! blocks a second attempt; a confirmed record short-circuits to "already
//! settled"; a failed record is reopened.
//!
//! The store is bounded: once `max_size` keys are tracked, the oldest
//! non-pending record is evicted. Eviction is safe because replay protection
//! falls back to the ledger memo search.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use pom_types::{
    Period, PomError, Result, SettlementRecord, SettlementStatus, SubnetId, TxHash,
};
use tokio::sync::Mutex;

type Key = (SubnetId, Period);

/// Result of [`SettlementRecordStore::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new pending record; this caller owns the attempt.
    Started(SettlementRecord),
    /// Settled before; nothing to do.
    AlreadyConfirmed(SettlementRecord),
}

struct Inner {
    records: HashMap<Key, SettlementRecord>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<Key>,
    max_size: usize,
}

impl Inner {
    fn evict_one(&mut self) {
        let Some(pos) = self.order.iter().position(|k| {
            self.records
                .get(k)
                .is_some_and(|r| r.status != SettlementStatus::Pending)
        }) else {
            return;
        };
        if let Some(key) = self.order.remove(pos) {
            self.records.remove(&key);
        }
    }

    fn transition(&mut self, key: Key, target: SettlementStatus) -> Result<&mut SettlementRecord> {
        let record = self
            .records
            .get_mut(&key)
            .ok_or_else(|| PomError::InvalidRecordTransition {
                reason: format!("no record for {} at {}", key.0, key.1),
            })?;
        if !record.status.can_transition_to(target) {
            return Err(PomError::InvalidRecordTransition {
                reason: format!("{} -> {target} for {} at {}", record.status, key.0, key.1),
            });
        }
        record.status = target;
        record.updated_at = Utc::now();
        Ok(record)
    }
}

/// Bounded, concurrency-safe map of settlement records.
pub struct SettlementRecordStore {
    inner: Mutex<Inner>,
}

impl SettlementRecordStore {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "SettlementRecordStore max_size must be > 0");
        Self {
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
                max_size,
            }),
        }
    }

    /// Claim `(subnet_id, period)` for a new attempt.
    ///
    /// # Errors
    /// `SettlementInFlight` if another attempt holds a pending record.
    pub async fn begin(&self, subnet_id: SubnetId, period: Period) -> Result<BeginOutcome> {
        let mut inner = self.inner.lock().await;
        let key = (subnet_id, period);
        if let Some(existing) = inner.records.get(&key).cloned() {
            match existing.status {
                SettlementStatus::Confirmed => {
                    return Ok(BeginOutcome::AlreadyConfirmed(existing));
                }
                SettlementStatus::Pending => {
                    return Err(PomError::SettlementInFlight {
                        subnet: subnet_id,
                        period,
                    });
                }
                SettlementStatus::Failed => {
                    let record = inner.transition(key, SettlementStatus::Pending)?;
                    record.error = None;
                    record.tx_hashes.clear();
                    record.ledgers.clear();
                    return Ok(BeginOutcome::Started(record.clone()));
                }
            }
        }

        if inner.records.len() >= inner.max_size {
            inner.evict_one();
        }
        let record = SettlementRecord::pending(subnet_id, period);
        inner.records.insert(key, record.clone());
        inner.order.push_back(key);
        Ok(BeginOutcome::Started(record))
    }

    /// Pending → confirmed with the landed transactions.
    ///
    /// # Errors
    /// `InvalidRecordTransition` unless the record is pending.
    pub async fn mark_confirmed(
        &self,
        subnet_id: SubnetId,
        period: Period,
        tx_hashes: Vec<TxHash>,
        ledgers: Vec<u64>,
    ) -> Result<SettlementRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.transition((subnet_id, period), SettlementStatus::Confirmed)?;
        record.tx_hashes = tx_hashes;
        record.ledgers = ledgers;
        record.error = None;
        Ok(record.clone())
    }

    /// Pending → failed.
    ///
    /// # Errors
    /// `InvalidRecordTransition` unless the record is pending.
    pub async fn mark_failed(
        &self,
        subnet_id: SubnetId,
        period: Period,
        error: String,
    ) -> Result<SettlementRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.transition((subnet_id, period), SettlementStatus::Failed)?;
        record.error = Some(error);
        Ok(record.clone())
    }

    pub async fn get(&self, subnet_id: SubnetId, period: Period) -> Option<SettlementRecord> {
        self.inner.lock().await.records.get(&(subnet_id, period)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn subnet(i: u8) -> SubnetId {
        SubnetId([i; 32])
    }

    #[tokio::test]
    async fn first_begin_starts() {
        let store = SettlementRecordStore::new(10);
        let out = store.begin(subnet(1), Period(1)).await.unwrap();
        let BeginOutcome::Started(rec) = out else {
            panic!("expected Started");
        };
        assert_eq!(rec.status, SettlementStatus::Pending);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn second_begin_while_pending_is_in_flight() {
        let store = SettlementRecordStore::new(10);
        store.begin(subnet(1), Period(1)).await.unwrap();
        let err = store.begin(subnet(1), Period(1)).await.unwrap_err();
        assert!(matches!(err, PomError::SettlementInFlight { .. }));
    }

    #[tokio::test]
    async fn confirmed_short_circuits() {
        let store = SettlementRecordStore::new(10);
        store.begin(subnet(1), Period(1)).await.unwrap();
        store
            .mark_confirmed(subnet(1), Period(1), vec![TxHash([9u8; 32])], vec![100])
            .await
            .unwrap();
        let out = store.begin(subnet(1), Period(1)).await.unwrap();
        let BeginOutcome::AlreadyConfirmed(rec) = out else {
            panic!("expected AlreadyConfirmed");
        };
        assert_eq!(rec.tx_hashes, vec![TxHash([9u8; 32])]);
    }

    #[tokio::test]
    async fn failed_is_reopened() {
        let store = SettlementRecordStore::new(10);
        store.begin(subnet(1), Period(1)).await.unwrap();
        store
            .mark_failed(subnet(1), Period(1), "timeout".into())
            .await
            .unwrap();
        let out = store.begin(subnet(1), Period(1)).await.unwrap();
        let BeginOutcome::Started(rec) = out else {
            panic!("expected Started");
        };
        assert_eq!(rec.error, None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn confirmed_never_changes() {
        let store = SettlementRecordStore::new(10);
        store.begin(subnet(1), Period(1)).await.unwrap();
        store
            .mark_confirmed(subnet(1), Period(1), vec![], vec![])
            .await
            .unwrap();
        assert!(matches!(
            store.mark_failed(subnet(1), Period(1), "late".into()).await,
            Err(PomError::InvalidRecordTransition { .. })
        ));
        assert!(matches!(
            store.mark_confirmed(subnet(1), Period(1), vec![], vec![]).await,
            Err(PomError::InvalidRecordTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_key_cannot_be_marked() {
        let store = SettlementRecordStore::new(10);
        assert!(
            store
                .mark_confirmed(subnet(1), Period(1), vec![], vec![])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn evicts_oldest_terminal() {
        let store = SettlementRecordStore::new(3);
        // p1 stays pending, p2 and p3 are confirmed.
        store.begin(subnet(1), Period(1)).await.unwrap();
        for p in 2..=3 {
            store.begin(subnet(1), Period(p)).await.unwrap();
            store
                .mark_confirmed(subnet(1), Period(p), vec![], vec![])
                .await
                .unwrap();
        }
        store.begin(subnet(1), Period(4)).await.unwrap();
        assert_eq!(store.len().await, 3);
        assert!(store.get(subnet(1), Period(1)).await.is_some(), "pending is never evicted");
        assert!(store.get(subnet(1), Period(2)).await.is_none(), "oldest terminal evicted");
        assert!(store.get(subnet(1), Period(3)).await.is_some());
    }

    #[tokio::test]
    async fn concurrent_begin_has_one_winner() {
        let store = Arc::new(SettlementRecordStore::new(10));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.begin(subnet(1), Period(1)).await
            }));
        }
        let mut started = 0;
        let mut in_flight = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(BeginOutcome::Started(_)) => started += 1,
                Err(PomError::SettlementInFlight { .. }) => in_flight += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(in_flight, 15);
    }

    #[test]
    #[should_panic(expected = "max_size must be > 0")]
    fn zero_max_size_panics() {
        let _ = SettlementRecordStore::new(0);
    }
}
