//! Block-scoped scratch copies of positions.
//!
//! The matcher never writes positions directly. It loads them here on
//! first touch (settling pending funding on the copy), mutates the copy
//! while matching, and hands the final values to the settlement stage via
//! the batch execution.

use std::collections::BTreeMap;

use dexmatch_types::{
    ExchangeReader, MarketId, PerpetualMarketFunding, Position, Result, SubaccountId,
};
use rust_decimal::Decimal;

use crate::margin::apply_funding;

/// Positions touched during one block, keyed by market then subaccount.
#[derive(Debug, Default, Clone)]
pub struct PositionStates {
    positions: BTreeMap<(MarketId, SubaccountId), Position>,
}

impl PositionStates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The working copy of a position, loading it through `reader` (or
    /// starting flat) on first touch. Pending funding is settled into the
    /// copy every time, which is a no-op once it is up to date.
    pub fn get_or_load<R: ExchangeReader + ?Sized>(
        &mut self,
        reader: &R,
        market_id: &MarketId,
        subaccount_id: &SubaccountId,
        funding: Option<&PerpetualMarketFunding>,
    ) -> Result<&mut Position> {
        let position = self
            .positions
            .entry((*market_id, *subaccount_id))
            .or_insert_with(|| {
                reader.position(market_id, subaccount_id).unwrap_or_else(|| {
                    Position::empty(
                        *market_id,
                        *subaccount_id,
                        funding.map_or(Decimal::ZERO, |f| f.cumulative_funding),
                    )
                })
            });
        apply_funding(position, funding)?;
        Ok(position)
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<&Position> {
        self.positions.get(&(*market_id, *subaccount_id))
    }

    /// Positions of one market, ordered by subaccount id.
    pub fn market_positions(&self, market_id: &MarketId) -> impl Iterator<Item = &Position> {
        let market_id = *market_id;
        self.positions
            .range((market_id, SubaccountId([0u8; 32]))..=(market_id, SubaccountId([0xff; 32])))
            .map(|(_, p)| p)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use dexmatch_types::*;

    use super::*;

    /// Reader that only knows one position.
    struct OnePosition(Position);

    impl ExchangeReader for OnePosition {
        fn block_info(&self) -> BlockInfo {
            BlockInfo::new(1, chrono::DateTime::from_timestamp(0, 0).unwrap())
        }
        fn market_with_mark_price(&self, _: &MarketId, _: bool) -> (Option<DerivativeMarket>, Option<Decimal>) {
            (None, None)
        }
        fn perpetual_funding(&self, _: &MarketId) -> Option<PerpetualMarketFunding> {
            None
        }
        fn transient_orders(&self, _: &MarketId, _: bool) -> Vec<DerivativeMarketOrder> {
            vec![]
        }
        fn transient_market_ids(&self) -> Vec<MarketId> {
            vec![]
        }
        fn resting_limit_orders(&self, _: &MarketId, _: bool) -> Vec<DerivativeLimitOrder> {
            vec![]
        }
        fn position(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<Position> {
            (self.0.market_id == *market_id && self.0.subaccount_id == *subaccount_id)
                .then(|| self.0.clone())
        }
        fn fee_discount_staking_info(&self) -> FeeDiscountStakingInfo {
            FeeDiscountStakingInfo::default()
        }
        fn fee_discount_schedule(&self) -> Option<FeeDiscountSchedule> {
            None
        }
    }

    fn stored() -> Position {
        Position {
            subaccount_id: SubaccountId::from_byte(1),
            market_id: MarketId::from_byte(1),
            quantity: Decimal::new(2, 0),
            entry_price: Decimal::new(100, 0),
            margin: Decimal::new(20, 0),
            cumulative_funding_entry: Decimal::ZERO,
        }
    }

    #[test]
    fn loads_once_and_keeps_mutations() {
        let reader = OnePosition(stored());
        let mut states = PositionStates::new();
        let (m, s) = (MarketId::from_byte(1), SubaccountId::from_byte(1));

        states.get_or_load(&reader, &m, &s, None).unwrap().margin = Decimal::new(5, 0);
        let again = states.get_or_load(&reader, &m, &s, None).unwrap();
        assert_eq!(again.margin, Decimal::new(5, 0));
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn unknown_position_starts_flat_at_current_funding() {
        let reader = OnePosition(stored());
        let mut states = PositionStates::new();
        let funding = PerpetualMarketFunding {
            cumulative_funding: Decimal::new(7, 0),
            ..PerpetualMarketFunding::zero()
        };
        let p = states
            .get_or_load(&reader, &MarketId::from_byte(1), &SubaccountId::from_byte(9), Some(&funding))
            .unwrap();
        assert!(p.is_flat());
        assert_eq!(p.cumulative_funding_entry, Decimal::new(7, 0));
        assert_eq!(p.margin, Decimal::ZERO);
    }

    #[test]
    fn funding_settled_on_load() {
        let reader = OnePosition(stored());
        let mut states = PositionStates::new();
        let funding = PerpetualMarketFunding {
            cumulative_funding: Decimal::ONE,
            ..PerpetualMarketFunding::zero()
        };
        let p = states
            .get_or_load(&reader, &MarketId::from_byte(1), &SubaccountId::from_byte(1), Some(&funding))
            .unwrap();
        assert_eq!(p.margin, Decimal::new(18, 0));
    }

    #[test]
    fn market_positions_are_scoped() {
        let reader = OnePosition(stored());
        let mut states = PositionStates::new();
        for (m, s) in [(1u8, 3u8), (2, 1), (1, 2)] {
            states
                .get_or_load(&reader, &MarketId::from_byte(m), &SubaccountId::from_byte(s), None)
                .unwrap();
        }
        let subs: Vec<_> = states
            .market_positions(&MarketId::from_byte(1))
            .map(|p| p.subaccount_id)
            .collect();
        assert_eq!(subs, vec![SubaccountId::from_byte(2), SubaccountId::from_byte(3)]);
    }
}
