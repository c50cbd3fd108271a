//! Positions modified during a block, mirrored for downstream consumers
//! (e.g. the end-blocker that re-checks liquidations).

use std::collections::BTreeMap;

use dexmatch_types::{MarketId, Position, SubaccountId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedPositionCache {
    positions: BTreeMap<(MarketId, SubaccountId), Position>,
}

impl ModifiedPositionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest value; a later write for the same key wins.
    pub fn set_position(&mut self, market_id: MarketId, subaccount_id: SubaccountId, position: Position) {
        self.positions.insert((market_id, subaccount_id), position);
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<&Position> {
        self.positions.get(&(*market_id, *subaccount_id))
    }

    /// Modified positions of one market, ascending by subaccount.
    pub fn market_positions(&self, market_id: MarketId) -> impl Iterator<Item = &Position> {
        self.positions
            .range((market_id, SubaccountId([0u8; 32]))..=(market_id, SubaccountId([0xff; 32])))
            .map(|(_, p)| p)
    }

    /// Distinct markets with at least one modified position.
    #[must_use]
    pub fn market_ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<_> = self.positions.keys().map(|(m, _)| *m).collect();
        ids.dedup();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
