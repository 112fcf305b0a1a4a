//! Withdrawal queue: per-(subnet, period) collection of withdrawal intents.
//!
//! Intents are kept in arrival order. Arrival order carries no meaning: the
//! delta computation is order-independent and the planner sorts by id.

use std::{
    collections::{HashMap, HashSet},
    ops::RangeBounds,
};

use pom_types::{Period, PomError, Result, Subnet, SubnetId, WithdrawalId, WithdrawalIntent};

/// Pending withdrawals keyed by `(subnet, period)`.
pub struct WithdrawalQueue {
    queues: HashMap<(SubnetId, Period), Vec<WithdrawalIntent>>,
    /// Every id ever enqueued; ids are globally unique.
    seen: HashSet<WithdrawalId>,
}

impl WithdrawalQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Append an intent to the queue of `(subnet.id, period)`.
    ///
    /// # Errors
    /// - `InvalidWithdrawal` for a non-positive amount or a reused id
    /// - `AssetNotWhitelisted` if the subnet does not allow the asset
    pub fn enqueue(&mut self, subnet: &Subnet, period: Period, intent: WithdrawalIntent) -> Result<()> {
        if intent.amount <= 0 {
            return Err(PomError::InvalidWithdrawal {
                withdrawal: intent.id,
                reason: format!("amount must be positive, got {}", intent.amount),
            });
        }
        let asset_id = intent.asset_id();
        if !subnet.is_whitelisted(&asset_id) {
            return Err(PomError::AssetNotWhitelisted(asset_id));
        }
        if !self.seen.insert(intent.id) {
            return Err(PomError::InvalidWithdrawal {
                withdrawal: intent.id,
                reason: "duplicate withdrawal id".into(),
            });
        }
        self.queues
            .entry((subnet.id, period))
            .or_default()
            .push(intent);
        Ok(())
    }

    /// Intents for `(subnet, period)`, in arrival order. Empty if none.
    #[must_use]
    pub fn withdrawals(&self, subnet_id: &SubnetId, period: Period) -> &[WithdrawalIntent] {
        self.queues
            .get(&(*subnet_id, period))
            .map_or(&[], Vec::as_slice)
    }

    /// `(period, count)` of every non-empty queue of `subnet_id` whose
    /// period falls in `periods`, ascending.
    #[must_use]
    pub fn queued_in(
        &self,
        subnet_id: &SubnetId,
        periods: impl RangeBounds<Period>,
    ) -> Vec<(Period, usize)> {
        let mut out: Vec<(Period, usize)> = self
            .queues
            .iter()
            .filter(|((s, p), q)| s == subnet_id && periods.contains(p) && !q.is_empty())
            .map(|((_, p), q)| (*p, q.len()))
            .collect();
        out.sort_unstable();
        out
    }

    #[must_use]
    pub fn len(&self, subnet_id: &SubnetId, period: Period) -> usize {
        self.withdrawals(subnet_id, period).len()
    }

    #[must_use]
    pub fn is_empty(&self, subnet_id: &SubnetId, period: Period) -> bool {
        self.len(subnet_id, period) == 0
    }
}

impl Default for WithdrawalQueue {
    fn default() -> Self {
        Self::new()
    }
}
