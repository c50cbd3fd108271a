//! Fee discount schedule and staking snapshot types.
//!
//! The snapshot is taken once per block and never mutated while a
//! matching pass runs, so every order in a batch sees the same tier.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Denom, MarketId, SubaccountId};

/// One step of the discount schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDiscountTierInfo {
    pub maker_discount_rate: Decimal,
    pub taker_discount_rate: Decimal,
    /// Minimum staked amount to qualify.
    pub staked_amount: Decimal,
    /// Minimum trailing trading volume to qualify.
    pub volume: Decimal,
}

/// The discount schedule, ordered from lowest to highest tier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeDiscountSchedule {
    pub tier_infos: Vec<FeeDiscountTierInfo>,
    /// Only markets quoted in one of these denoms are discounted.
    pub quote_denoms: Vec<Denom>,
    pub disqualified_market_ids: Vec<MarketId>,
}

impl FeeDiscountSchedule {
    /// Whether fills in this market are discounted and earn reward points.
    #[must_use]
    pub fn is_market_qualified(&self, market_id: &MarketId, quote_denom: &str) -> bool {
        !self.disqualified_market_ids.contains(market_id)
            && self.quote_denoms.iter().any(|d| d == quote_denom)
    }
}

/// Staking and volume figures for one subaccount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StakerInfo {
    pub staked_amount: Decimal,
    pub volume: Decimal,
}

/// Read-only staking snapshot for one block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeDiscountStakingInfo {
    pub block_height: u64,
    stakers: BTreeMap<SubaccountId, StakerInfo>,
}

impl FeeDiscountStakingInfo {
    #[must_use]
    pub fn new(block_height: u64, stakers: BTreeMap<SubaccountId, StakerInfo>) -> Self {
        Self {
            block_height,
            stakers,
        }
    }

    /// Figures for `subaccount_id`; unknown subaccounts have none staked.
    #[must_use]
    pub fn staker(&self, subaccount_id: &SubaccountId) -> StakerInfo {
        self.stakers.get(subaccount_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stakers.is_empty()
    }
}
