//! The Proof-of-Money delta: total outflow per asset for one period.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Amount, AssetId, PomError, Result, checked_add};

/// Mapping asset id → non-negative total outflow.
///
/// Equality is structural: identical key sets with identical values. An
/// asset present with amount zero is *not* equal to the asset being absent;
/// [`PomDelta::add`] therefore never inserts zero entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomDelta(BTreeMap<AssetId, Amount>);

impl PomDelta {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Accumulate `amount` for `asset` with overflow checking.
    ///
    /// # Errors
    /// `NegativeAmount` if `amount < 0`; `AmountOverflow` on overflow.
    pub fn add(&mut self, asset: AssetId, amount: Amount) -> Result<()> {
        if amount < 0 {
            return Err(PomError::NegativeAmount { asset, amount });
        }
        if amount == 0 {
            return Ok(());
        }
        let slot = self.0.entry(asset).or_insert(0);
        *slot = checked_add(*slot, amount)?;
        Ok(())
    }

    /// Outflow for `asset`, `None` if the asset is absent.
    #[must_use]
    pub fn get(&self, asset: &AssetId) -> Option<Amount> {
        self.0.get(asset).copied()
    }

    /// Outflow for `asset`, zero if absent.
    #[must_use]
    pub fn amount(&self, asset: &AssetId) -> Amount {
        self.get(asset).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &Amount)> {
        self.0.iter()
    }

    /// Union of the asset keys of both deltas, in canonical order.
    #[must_use]
    pub fn union_keys<'a>(&'a self, other: &'a Self) -> BTreeSet<&'a AssetId> {
        self.0.keys().chain(other.0.keys()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AssetId, Amount)> for PomDelta {
    /// Builds a delta verbatim (zero entries included). Intended for
    /// deltas received from the other side, which must be compared as-is.
    fn from_iter<T: IntoIterator<Item = (AssetId, Amount)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
