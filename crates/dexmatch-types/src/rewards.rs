//! Trading reward point accounting.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::SubaccountId;

/// Accumulated reward score per subaccount. Ordered so iteration (and
/// therefore hashing) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingRewardPoints(BTreeMap<SubaccountId, Decimal>);

impl TradingRewardPoints {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add `points` to `subaccount_id`. Zero points are not recorded.
    /// Points are a score, so a sum past `Decimal::MAX` saturates.
    pub fn add(&mut self, subaccount_id: SubaccountId, points: Decimal) {
        if points.is_zero() {
            return;
        }
        let entry = self.0.entry(subaccount_id).or_insert(Decimal::ZERO);
        *entry = entry.saturating_add(points);
    }

    #[must_use]
    pub fn get(&self, subaccount_id: &SubaccountId) -> Decimal {
        self.0.get(subaccount_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubaccountId, &Decimal)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.0.values().fold(Decimal::ZERO, |acc, p| acc.saturating_add(*p))
    }
}

impl FromIterator<(SubaccountId, Decimal)> for TradingRewardPoints {
    fn from_iter<I: IntoIterator<Item = (SubaccountId, Decimal)>>(iter: I) -> Self {
        let mut points = Self::new();
        for (sub, p) in iter {
            points.add(sub, p);
        }
        points
    }
}

/// Merge `new_points` into `accumulator`, summing per subaccount.
#[must_use]
pub fn merge_trading_reward_points(
    mut accumulator: TradingRewardPoints,
    new_points: &TradingRewardPoints,
) -> TradingRewardPoints {
    for (sub, points) in new_points.iter() {
        accumulator.add(*sub, *points);
    }
    accumulator
}
