//! The output of one market's matching pass.
//!
//! A [`BatchExecutionData`] is a transient value: the builder produces it,
//! the settlement stage consumes it, and it is never stored. Everything a
//! validator needs to agree on (deltas, positions, events) is in here, in
//! the order it will be applied.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    DepositDelta, DerivativeLimitOrder, DerivativeMarket, EventBatchDerivativeExecution,
    EventCancelDerivativeOrder, ExchangeEvent, MarketId, MarketType, OrderHash,
    PerpetualMarketFunding, Position, SubaccountId, TradingRewardPoints,
};

/// One volume-weighted price sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VwapData {
    pub price: Decimal,
    pub quantity: Decimal,
    pub market_type: MarketType,
}

impl VwapData {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.price.is_zero() || self.quantity.is_zero()
    }
}

/// What happened to one resting limit order in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeLimitOrderDelta {
    /// The order as it was before this batch.
    pub order: DerivativeLimitOrder,
    pub fill_quantity: Decimal,
    pub cancel_quantity: Decimal,
}

impl DerivativeLimitOrderDelta {
    #[must_use]
    pub fn order_hash(&self) -> OrderHash {
        self.order.order.order_hash
    }

    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.order.order.is_buy
    }

    /// Quantity left resting once this delta is applied.
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        (self.order.fillable - self.fill_quantity - self.cancel_quantity).max(Decimal::ZERO)
    }
}

/// Everything one market's matching pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutionData {
    pub market: DerivativeMarket,
    pub mark_price: Option<Decimal>,
    /// Present for perpetual markets only.
    pub funding: Option<PerpetualMarketFunding>,

    /// Net balance change per subaccount, ordered by subaccount id.
    pub deposit_deltas: BTreeMap<SubaccountId, DepositDelta>,
    /// Final position of every touched subaccount, ordered by subaccount id.
    pub positions: BTreeMap<SubaccountId, Position>,

    pub resting_limit_order_filled_deltas: Vec<DerivativeLimitOrderDelta>,
    pub resting_limit_order_cancelled_deltas: Vec<DerivativeLimitOrderDelta>,

    pub market_buy_order_execution_event: Option<EventBatchDerivativeExecution>,
    pub resting_limit_sell_order_execution_event: Option<EventBatchDerivativeExecution>,
    pub market_sell_order_execution_event: Option<EventBatchDerivativeExecution>,
    pub resting_limit_buy_order_execution_event: Option<EventBatchDerivativeExecution>,
    pub cancel_limit_order_events: Vec<EventCancelDerivativeOrder>,
    pub cancel_market_order_events: Vec<EventCancelDerivativeOrder>,

    pub vwap_data: Option<VwapData>,
    pub trading_reward_points: TradingRewardPoints,
    /// Fees not paid out to relayers, destined for the fee auction.
    pub auction_fee_reward: Decimal,
    pub is_liquidation: bool,
}

impl BatchExecutionData {
    /// An execution that touched nothing.
    #[must_use]
    pub fn empty(
        market: DerivativeMarket,
        mark_price: Option<Decimal>,
        funding: Option<PerpetualMarketFunding>,
        is_liquidation: bool,
    ) -> Self {
        Self {
            market,
            mark_price,
            funding,
            deposit_deltas: BTreeMap::new(),
            positions: BTreeMap::new(),
            resting_limit_order_filled_deltas: Vec::new(),
            resting_limit_order_cancelled_deltas: Vec::new(),
            market_buy_order_execution_event: None,
            resting_limit_sell_order_execution_event: None,
            market_sell_order_execution_event: None,
            resting_limit_buy_order_execution_event: None,
            cancel_limit_order_events: Vec::new(),
            cancel_market_order_events: Vec::new(),
            vwap_data: None,
            trading_reward_points: TradingRewardPoints::new(),
            auction_fee_reward: Decimal::ZERO,
            is_liquidation,
        }
    }

    #[must_use]
    pub fn market_id(&self) -> MarketId {
        self.market.market_id
    }

    /// True when nothing matched and nothing was cancelled.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.deposit_deltas.is_empty()
            && self.positions.is_empty()
            && self.resting_limit_order_filled_deltas.is_empty()
            && self.resting_limit_order_cancelled_deltas.is_empty()
            && self.cancel_limit_order_events.is_empty()
            && self.cancel_market_order_events.is_empty()
    }

    /// Events in the order they must be emitted: market buys, resting
    /// sells, market sells, resting buys, limit cancels, market cancels.
    #[must_use]
    pub fn events_in_emission_order(&self) -> Vec<ExchangeEvent> {
        let executions = [
            &self.market_buy_order_execution_event,
            &self.resting_limit_sell_order_execution_event,
            &self.market_sell_order_execution_event,
            &self.resting_limit_buy_order_execution_event,
        ];
        executions
            .into_iter()
            .flatten()
            .cloned()
            .map(ExchangeEvent::from)
            .chain(self.cancel_limit_order_events.iter().cloned().map(ExchangeEvent::from))
            .chain(self.cancel_market_order_events.iter().cloned().map(ExchangeEvent::from))
            .collect()
    }
}
