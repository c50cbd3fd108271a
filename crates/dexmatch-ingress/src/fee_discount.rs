//! Fee discount provider.
//!
//! Resolves the fee rates each subaccount pays in a market from the
//! discount schedule and the block's staking snapshot. Resolution is pure:
//! the snapshot is borrowed immutably for the whole matching pass.

use std::collections::BTreeMap;

use dexmatch_types::{
    parse_decimal, DecimalExt, DerivativeMarket, FeeDiscountSchedule, FeeDiscountStakingInfo,
    FeeDiscountTierInfo, MarketId, Result, StakerInfo, SubaccountId,
};
use rust_decimal::Decimal;

/// Rates one subaccount pays on one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRates {
    pub taker_fee_rate: Decimal,
    /// Negative values are rebates and are never discounted.
    pub maker_fee_rate: Decimal,
}

/// Fee rates of one market for one matching pass.
#[derive(Debug, Clone)]
pub struct FeeDiscountConfig<'a> {
    market_id: MarketId,
    base: FeeRates,
    /// `None` when the market is not eligible for discounts and rewards.
    tiers: Option<&'a [FeeDiscountTierInfo]>,
    snapshot: &'a FeeDiscountStakingInfo,
}

impl<'a> FeeDiscountConfig<'a> {
    /// A config that applies the market's rates to everyone and earns no
    /// reward points.
    #[must_use]
    pub fn undiscounted(market: &DerivativeMarket, snapshot: &'a FeeDiscountStakingInfo) -> Self {
        Self {
            market_id: market.market_id,
            base: FeeRates {
                taker_fee_rate: market.taker_fee_rate,
                maker_fee_rate: market.maker_fee_rate,
            },
            tiers: None,
            snapshot,
        }
    }

    #[must_use]
    pub fn market_id(&self) -> MarketId {
        self.market_id
    }

    /// Undiscounted market rates.
    #[must_use]
    pub fn base_rates(&self) -> FeeRates {
        self.base
    }

    /// Whether fills in this market earn trading reward points.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.tiers.is_some()
    }

    /// Highest tier `subaccount_id` qualifies for.
    #[must_use]
    pub fn tier_for(&self, subaccount_id: &SubaccountId) -> Option<&'a FeeDiscountTierInfo> {
        let staker = self.snapshot.staker(subaccount_id);
        self.tiers?
            .iter()
            .rev()
            .find(|tier| qualifies(&staker, tier))
    }

    /// Discounted rates for `subaccount_id`.
    pub fn fee_rates_for(&self, subaccount_id: &SubaccountId) -> Result<FeeRates> {
        let Some(tier) = self.tier_for(subaccount_id) else {
            return Ok(self.base);
        };
        let taker_fee_rate = self
            .base
            .taker_fee_rate
            .mul_trunc(Decimal::ONE - tier.taker_discount_rate)?;
        let maker_fee_rate = if self.base.maker_fee_rate.is_positive_strict() {
            self.base
                .maker_fee_rate
                .mul_trunc(Decimal::ONE - tier.maker_discount_rate)?
        } else {
            self.base.maker_fee_rate
        };
        Ok(FeeRates {
            taker_fee_rate,
            maker_fee_rate,
        })
    }
}

fn qualifies(staker: &StakerInfo, tier: &FeeDiscountTierInfo) -> bool {
    staker.staked_amount >= tier.staked_amount && staker.volume >= tier.volume
}

/// Resolve the fee config of `market` for this pass.
///
/// Markets that are disqualified, or not quoted in a listed denom, get the
/// plain market rates and no reward points.
#[must_use]
pub fn effective_fee_rates<'a>(
    market: &DerivativeMarket,
    schedule: Option<&'a FeeDiscountSchedule>,
    snapshot: &'a FeeDiscountStakingInfo,
) -> FeeDiscountConfig<'a> {
    let mut config = FeeDiscountConfig::undiscounted(market, snapshot);
    config.tiers = schedule
        .filter(|s| s.is_market_qualified(&market.market_id, &market.quote_denom))
        .map(|s| s.tier_infos.as_slice());
    config
}

/// Builds a [`FeeDiscountStakingInfo`] from raw staking records.
#[derive(Debug, Default)]
pub struct StakingSnapshotBuilder {
    stakers: BTreeMap<SubaccountId, StakerInfo>,
    skipped: usize,
}

impl StakingSnapshotBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record. Malformed records are logged and skipped; returns
    /// whether the record was accepted. Repeated subaccounts accumulate.
    pub fn add_raw(&mut self, subaccount_id: &str, staked_amount: &str, volume: &str) -> bool {
        let decoded = SubaccountId::from_hex(subaccount_id).and_then(|sub| {
            Ok((sub, parse_decimal(staked_amount)?, parse_decimal(volume)?))
        });
        let accumulated = decoded.and_then(|(sub, staked, vol)| {
            let current = self.stakers.get(&sub).copied().unwrap_or_default();
            let next = StakerInfo {
                staked_amount: current.staked_amount.add_checked(staked)?,
                volume: current.volume.add_checked(vol)?,
            };
            Ok((sub, staked, vol, next))
        });
        match accumulated {
            Ok((sub, staked, vol, next)) if !staked.is_sign_negative() && !vol.is_sign_negative() => {
                self.stakers.insert(sub, next);
                true
            }
            Ok(_) => {
                tracing::warn!(subaccount = subaccount_id, "Skipping negative staking record");
                self.skipped += 1;
                false
            }
            Err(error) => {
                tracing::warn!(
                    subaccount = subaccount_id,
                    error = %error,
                    "Skipping malformed staking record"
                );
                self.skipped += 1;
                false
            }
        }
    }

    /// Number of records skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn build(self, block_height: u64) -> FeeDiscountStakingInfo {
        tracing::debug!(
            block_height,
            stakers = self.stakers.len(),
            skipped = self.skipped,
            "Staking snapshot built"
        );
        FeeDiscountStakingInfo::new(block_height, self.stakers)
    }
}
