//! Deterministic settlement planner.
//!
//! ```text
//! SettlementPlanner::plan(withdrawals, treasury) -> SettlementPlan
//! ```
//!
//! The planner sorts withdrawals by id (a total order every node
//! reproduces, regardless of fetch order), emits one transfer instruction per
//! withdrawal and groups them by asset. The plan's nominal delta is what
//! [`crate::verify_delta_match`] compares against the commitment.
//!
//! Instructions for assets the treasury holds no balance entry for are
//! flagged for conversion. Conversion quotes may only be attached after the
//! nominal delta matched; [`SettlementPlan::apply_conversion`] enforces the
//! slippage bound and never changes the nominal amounts.

use std::collections::{BTreeMap, BTreeSet};

use pom_types::{
    Amount, Asset, AssetId, ConversionConfig, Period, PomDelta, PomError, Result, SubnetId,
    TreasurySnapshot, WithdrawalId, WithdrawalIntent, checked_add,
};
use serde::{Deserialize, Serialize};

use crate::{
    conversion::{ConversionQuote, check_quote},
    determinism::compute_plan_root,
};

/// Path-payment leg attached to an instruction after conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionLeg {
    pub send_asset: Asset,
    /// Upper bound on the amount of `send_asset` spent.
    pub send_max: Amount,
    pub path: Vec<Asset>,
}

/// One payment from the treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub withdrawal_id: WithdrawalId,
    pub destination: String,
    pub asset: Asset,
    /// Nominal amount delivered to `destination`.
    pub amount: Amount,
    /// Set when the treasury does not hold `asset` and conversion is enabled.
    pub requires_conversion: bool,
    pub conversion: Option<ConversionLeg>,
}

impl TransferInstruction {
    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        self.asset.id()
    }
}

/// Instructions sharing one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    pub asset: Asset,
    pub total: Amount,
    pub withdrawals: Vec<WithdrawalId>,
}

/// Concrete, deterministic instruction set for one `(subnet, period)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub subnet_id: SubnetId,
    pub period: Period,
    /// Sorted by withdrawal id.
    pub instructions: Vec<TransferInstruction>,
    /// Keyed by asset id, in canonical order.
    pub groups: BTreeMap<AssetId, AssetGroup>,
    /// Nominal outflow of this plan.
    pub delta: PomDelta,
    /// Hash over the sorted nominal instructions.
    pub plan_root: [u8; 32],
}

impl SettlementPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions still waiting for a conversion quote.
    pub fn pending_conversions(&self) -> impl Iterator<Item = &TransferInstruction> {
        self.instructions
            .iter()
            .filter(|i| i.requires_conversion && i.conversion.is_none())
    }

    /// Assets paid directly from treasury balances.
    pub fn direct_outflow(&self) -> Result<PomDelta> {
        let mut delta = PomDelta::new();
        for i in self.instructions.iter().filter(|i| !i.requires_conversion) {
            delta.add(i.asset_id(), i.amount)?;
        }
        Ok(delta)
    }

    /// Worst-case spend of each conversion source asset.
    pub fn conversion_outflow(&self) -> Result<PomDelta> {
        let mut delta = PomDelta::new();
        for leg in self.instructions.iter().filter_map(|i| i.conversion.as_ref()) {
            delta.add(leg.send_asset.id(), leg.send_max)?;
        }
        Ok(delta)
    }

    /// Attach a checked conversion quote to the instruction for `withdrawal_id`.
    ///
    /// # Errors
    /// - [`PomError::Internal`] if no such instruction requires conversion
    /// - errors from [`check_quote`] (slippage / unusable path)
    pub fn apply_conversion(
        &mut self,
        withdrawal_id: WithdrawalId,
        quote: &ConversionQuote,
        config: &ConversionConfig,
    ) -> Result<()> {
        let instr = self
            .instructions
            .iter_mut()
            .find(|i| i.withdrawal_id == withdrawal_id && i.requires_conversion)
            .ok_or_else(|| {
                PomError::Internal(format!("no conversion instruction for {withdrawal_id}"))
            })?;
        if quote.send_asset != config.source_asset {
            return Err(PomError::ConversionPathNotFound {
                reason: format!(
                    "quote spends {}, treasury converts from {}",
                    quote.send_asset, config.source_asset
                ),
            });
        }
        check_quote(quote, &instr.asset, instr.amount, config.max_slippage_percent)?;
        instr.conversion = Some(ConversionLeg {
            send_asset: quote.send_asset.clone(),
            send_max: quote.send_amount,
            path: quote.path.clone(),
        });
        Ok(())
    }
}

/// Builds settlement plans. Pure: same inputs, same plan.
#[derive(Debug, Clone, Default)]
pub struct SettlementPlanner {
    conversion: ConversionConfig,
}

impl SettlementPlanner {
    #[must_use]
    pub fn new(conversion: ConversionConfig) -> Self {
        Self { conversion }
    }

    #[must_use]
    pub fn conversion_config(&self) -> &ConversionConfig {
        &self.conversion
    }

    /// Plan the settlement of `withdrawals` against `treasury`.
    ///
    /// # Errors
    /// - [`PomError::InvalidWithdrawal`] on duplicate withdrawal ids
    /// - [`PomError::NotConstructible`] on non-positive amounts or
    ///   unresolvable destinations
    /// - [`PomError::AmountOverflow`] on checked-sum overflow
    pub fn plan(
        &self,
        subnet_id: SubnetId,
        period: Period,
        withdrawals: &[WithdrawalIntent],
        treasury: &TreasurySnapshot,
    ) -> Result<SettlementPlan> {
        let mut sorted: Vec<&WithdrawalIntent> = withdrawals.iter().collect();
        sorted.sort_by_key(|w| w.id);

        let mut seen = BTreeSet::new();
        let mut instructions = Vec::with_capacity(sorted.len());
        let mut groups: BTreeMap<AssetId, AssetGroup> = BTreeMap::new();
        let mut delta = PomDelta::new();

        for w in sorted {
            if !seen.insert(w.id) {
                return Err(PomError::InvalidWithdrawal {
                    withdrawal: w.id,
                    reason: "duplicate withdrawal id in queue".into(),
                });
            }
            if !w.is_constructible() {
                return Err(PomError::NotConstructible {
                    withdrawal: w.id,
                    reason: format!(
                        "amount {} / destination {:?} cannot be paid",
                        w.amount, w.destination
                    ),
                });
            }
            let asset_id = w.asset_id();
            let requires_conversion = self.conversion.enabled && !treasury.holds(&asset_id);

            let group = groups.entry(asset_id).or_insert_with(|| AssetGroup {
                asset: w.asset.clone(),
                total: 0,
                withdrawals: Vec::new(),
            });
            group.total = checked_add(group.total, w.amount)?;
            group.withdrawals.push(w.id);
            delta.add(asset_id, w.amount)?;

            instructions.push(TransferInstruction {
                withdrawal_id: w.id,
                destination: w.destination.clone(),
                asset: w.asset.clone(),
                amount: w.amount,
                requires_conversion,
                conversion: None,
            });
        }

        let plan_root = compute_plan_root(&instructions);
        tracing::debug!(
            subnet = %subnet_id,
            period = period.0,
            instructions = instructions.len(),
            assets = groups.len(),
            plan_root = %hex::encode(&plan_root[..8]),
            "settlement plan built"
        );

        Ok(SettlementPlan {
            subnet_id,
            period,
            instructions,
            groups,
            delta,
            plan_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use pom_types::Asset;
    use rand::seq::SliceRandom;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{compute_net_outflow, verify_delta_match};

    fn eurc() -> Asset {
        Asset::issued("EURC", [5u8; 32])
    }

    fn treasury_holding(assets: &[Asset]) -> TreasurySnapshot {
        let ids: Vec<_> = assets.iter().map(Asset::id).collect();
        let bals = vec![1_000_000; ids.len()];
        TreasurySnapshot::from_parallel(&ids, &bals, &[], 0).unwrap()
    }

    fn queue() -> Vec<WithdrawalIntent> {
        vec![
            WithdrawalIntent::dummy(3, Asset::native(), 30),
            WithdrawalIntent::dummy(1, eurc(), 10),
            WithdrawalIntent::dummy(2, Asset::native(), 20),
        ]
    }

    #[test]
    fn sorted_by_withdrawal_id() {
        let plan = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &queue(), &treasury_holding(&[]))
            .unwrap();
        let ids: Vec<_> = plan.instructions.iter().map(|i| i.withdrawal_id).collect();
        assert_eq!(
            ids,
            vec![
                WithdrawalId::from_u128(1),
                WithdrawalId::from_u128(2),
                WithdrawalId::from_u128(3)
            ]
        );
    }

    #[test]
    fn plan_is_fetch_order_independent() {
        let planner = SettlementPlanner::default();
        let treasury = treasury_holding(&[Asset::native(), eurc()]);
        let mut q = queue();
        let reference = planner
            .plan(SubnetId([0u8; 32]), Period(1), &q, &treasury)
            .unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            q.shuffle(&mut rng);
            let plan = planner
                .plan(SubnetId([0u8; 32]), Period(1), &q, &treasury)
                .unwrap();
            assert_eq!(plan.plan_root, reference.plan_root);
            assert_eq!(plan.instructions, reference.instructions);
        }
    }

    #[test]
    fn groups_and_delta_match_computer() {
        let q = queue();
        let plan = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &q, &treasury_holding(&[]))
            .unwrap();
        assert_eq!(plan.groups.len(), 2);
        let native = &plan.groups[&Asset::native().id()];
        assert_eq!(native.total, 50);
        assert_eq!(native.withdrawals.len(), 2);
        let authorized = compute_net_outflow(&q).unwrap();
        assert!(verify_delta_match(&plan.delta, &authorized).is_ok());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut q = queue();
        q.push(q[0].clone());
        let err = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &q, &treasury_holding(&[]))
            .unwrap_err();
        assert!(matches!(err, PomError::InvalidWithdrawal { .. }));
    }

    #[test]
    fn unconstructible_rejected() {
        let mut q = queue();
        q[1].destination = "nowhere".into();
        let err = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &q, &treasury_holding(&[]))
            .unwrap_err();
        assert!(matches!(err, PomError::NotConstructible { .. }));
    }

    #[test]
    fn conversion_flag_only_when_enabled_and_not_held() {
        let treasury = treasury_holding(&[Asset::native()]);
        let disabled = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &queue(), &treasury)
            .unwrap();
        assert_eq!(disabled.pending_conversions().count(), 0);

        let enabled = SettlementPlanner::new(ConversionConfig {
            enabled: true,
            ..ConversionConfig::default()
        })
        .plan(SubnetId([0u8; 32]), Period(1), &queue(), &treasury)
        .unwrap();
        let pending: Vec<_> = enabled.pending_conversions().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].asset, eurc());
        // Nominal delta still carries the converted asset.
        assert_eq!(enabled.delta.amount(&eurc().id()), 10);
    }

    #[test]
    fn apply_conversion_enforces_bound_and_keeps_nominal() {
        let config = ConversionConfig {
            enabled: true,
            max_slippage_percent: Decimal::ONE,
            source_asset: Asset::native(),
        };
        let treasury = treasury_holding(&[Asset::native()]);
        let mut plan = SettlementPlanner::new(config.clone())
            .plan(SubnetId([0u8; 32]), Period(1), &queue(), &treasury)
            .unwrap();
        let nominal = plan.delta.clone();
        let wid = WithdrawalId::from_u128(1);

        let too_expensive = ConversionQuote {
            send_asset: Asset::native(),
            send_amount: 11,
            dest_asset: eurc(),
            dest_amount: 10,
            path: vec![],
        };
        // 10 * 1% = 0.1 -> floor 0, so max send is 10.
        assert!(matches!(
            plan.apply_conversion(wid, &too_expensive, &config),
            Err(PomError::SlippageExceeded { .. })
        ));

        let fine = ConversionQuote {
            send_amount: 10,
            ..too_expensive
        };
        plan.apply_conversion(wid, &fine, &config).unwrap();
        assert_eq!(plan.pending_conversions().count(), 0);
        assert_eq!(plan.delta, nominal);
        assert_eq!(plan.conversion_outflow().unwrap().amount(&Asset::native().id()), 10);
        assert_eq!(plan.direct_outflow().unwrap().amount(&eurc().id()), 0);
    }

    #[test]
    fn apply_conversion_rejects_wrong_source_asset() {
        let config = ConversionConfig {
            enabled: true,
            ..ConversionConfig::default()
        };
        let mut plan = SettlementPlanner::new(config.clone())
            .plan(
                SubnetId([0u8; 32]),
                Period(1),
                &queue(),
                &treasury_holding(&[Asset::native()]),
            )
            .unwrap();
        let quote = ConversionQuote {
            send_asset: Asset::issued("USDC", [1u8; 32]),
            send_amount: 10,
            dest_asset: eurc(),
            dest_amount: 10,
            path: vec![],
        };
        assert!(matches!(
            plan.apply_conversion(WithdrawalId::from_u128(1), &quote, &config),
            Err(PomError::ConversionPathNotFound { .. })
        ));
    }

    #[test]
    fn empty_queue_empty_plan() {
        let plan = SettlementPlanner::default()
            .plan(SubnetId([0u8; 32]), Period(1), &[], &treasury_holding(&[]))
            .unwrap();
        assert!(plan.is_empty());
        assert!(plan.delta.is_empty());
    }
}
