//! Shared fixtures for the matchcore integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use dexmatch_types::*;
use rust_decimal::Decimal;

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub fn market_id() -> MarketId {
    MarketId::from_byte(1)
}

pub fn sub(b: u8) -> SubaccountId {
    SubaccountId::from_byte(b)
}

#[derive(Default, Clone)]
pub struct StaticReader {
    pub markets: BTreeMap<MarketId, (DerivativeMarket, Option<Decimal>)>,
    pub funding: BTreeMap<MarketId, PerpetualMarketFunding>,
    pub transient: Vec<DerivativeMarketOrder>,
    pub resting: Vec<DerivativeLimitOrder>,
    pub positions: BTreeMap<(MarketId, SubaccountId), Position>,
    pub schedule: Option<FeeDiscountSchedule>,
}

impl StaticReader {
    pub fn with_market(market: DerivativeMarket, mark_price: Option<Decimal>) -> Self {
        let mut reader = Self::default();
        reader.markets.insert(market.market_id, (market, mark_price));
        reader
    }

    pub fn position(mut self, subaccount: u8, quantity: i64, entry: i64, margin: i64) -> Self {
        self.positions.insert(
            (market_id(), sub(subaccount)),
            Position {
                subaccount_id: sub(subaccount),
                market_id: market_id(),
                quantity: dec(quantity),
                entry_price: dec(entry),
                margin: dec(margin),
                cumulative_funding_entry: Decimal::ZERO,
            },
        );
        self
    }
}

impl ExchangeReader for StaticReader {
    fn block_info(&self) -> BlockInfo {
        BlockInfo::new(42, chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    fn market_with_mark_price(
        &self,
        market_id: &MarketId,
        include_mark_price: bool,
    ) -> (Option<DerivativeMarket>, Option<Decimal>) {
        match self.markets.get(market_id) {
            Some((m, mark)) => (Some(m.clone()), mark.filter(|_| include_mark_price)),
            None => (None, None),
        }
    }

    fn perpetual_funding(&self, market_id: &MarketId) -> Option<PerpetualMarketFunding> {
        self.funding.get(market_id).copied()
    }

    fn transient_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeMarketOrder> {
        self.transient
            .iter()
            .filter(|o| o.market_id == *market_id && o.order.is_buy == is_buy)
            .cloned()
            .collect()
    }

    fn transient_market_ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<_> = self.transient.iter().map(|o| o.market_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn resting_limit_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeLimitOrder> {
        self.resting
            .iter()
            .filter(|o| o.market_id == *market_id && o.order.is_buy == is_buy)
            .cloned()
            .collect()
    }

    fn position(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<Position> {
        self.positions.get(&(*market_id, *subaccount_id)).cloned()
    }

    fn fee_discount_staking_info(&self) -> FeeDiscountStakingInfo {
        FeeDiscountStakingInfo::default()
    }

    fn fee_discount_schedule(&self) -> Option<FeeDiscountSchedule> {
        self.schedule.clone()
    }
}

pub fn market_order(subaccount: u8, is_buy: bool, price: i64, qty: i64, margin: i64, index: u64) -> DerivativeMarketOrder {
    DerivativeMarketOrder::dummy(market_id(), sub(subaccount), is_buy, dec(price), dec(qty), dec(margin), index)
}

pub fn limit_order(subaccount: u8, is_buy: bool, price: i64, qty: i64, margin: i64, index: u64) -> DerivativeLimitOrder {
    DerivativeLimitOrder::dummy(market_id(), sub(subaccount), is_buy, dec(price), dec(qty), dec(margin), index)
}
