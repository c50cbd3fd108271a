//! Narrow interfaces to the exchange module's state.
//!
//! The matching core never touches storage directly. It reads through an
//! [`ExchangeReader`] and writes through an [`ExchangeWriter`], both scoped
//! to the current block.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    DepositDelta, DerivativeLimitOrder, DerivativeLimitOrderDelta, DerivativeMarket,
    DerivativeMarketOrder, ExchangeEvent, FeeDiscountSchedule, FeeDiscountStakingInfo, MarketId,
    PerpetualMarketFunding, Position, Result, SubaccountId,
};

/// Header of the block being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockInfo {
    #[must_use]
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self { height, time }
    }
}

/// Read access to exchange state.
pub trait ExchangeReader {
    fn block_info(&self) -> BlockInfo;

    /// The market and, when asked for, its mark price. Either may be
    /// absent (delisted market, oracle outage).
    fn market_with_mark_price(
        &self,
        market_id: &MarketId,
        include_mark_price: bool,
    ) -> (Option<DerivativeMarket>, Option<Decimal>);

    fn perpetual_funding(&self, market_id: &MarketId) -> Option<PerpetualMarketFunding>;

    /// Market orders staged this block for one market and direction, in
    /// price priority.
    fn transient_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeMarketOrder>;

    /// Market ids with staged orders, ascending.
    fn transient_market_ids(&self) -> Vec<MarketId>;

    /// Resting limit orders of one side, best price first, FIFO within a
    /// price.
    fn resting_limit_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeLimitOrder>;

    fn position(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<Position>;

    fn fee_discount_staking_info(&self) -> FeeDiscountStakingInfo;

    fn fee_discount_schedule(&self) -> Option<FeeDiscountSchedule>;
}

/// Write access to exchange state.
pub trait ExchangeWriter {
    /// Apply a deposit delta. A shortfall in the deposit is drawn from the
    /// owner's bank balance, which can fail.
    fn update_deposit(
        &mut self,
        subaccount_id: &SubaccountId,
        denom: &str,
        delta: &DepositDelta,
    ) -> Result<()>;

    /// Check that [`update_deposit`](Self::update_deposit) would succeed for
    /// every delta in `deltas`, applied in order, without changing anything.
    fn check_deposit_updates(&self, denom: &str, deltas: &BTreeMap<SubaccountId, DepositDelta>) -> Result<()>;

    /// Apply a deposit delta without ever touching the bank, even if the
    /// deposit goes negative. Used only for liquidations.
    fn update_deposit_without_bank_charge(
        &mut self,
        subaccount_id: &SubaccountId,
        denom: &str,
        delta: &DepositDelta,
    ) -> Result<()>;

    fn set_position(&mut self, market_id: &MarketId, subaccount_id: &SubaccountId, position: &Position);

    /// Reduce resting orders by their filled and cancelled quantities,
    /// removing any that reach zero.
    fn update_limit_orders_from_filled_deltas(
        &mut self,
        market_id: &MarketId,
        is_buy: bool,
        deltas: &[DerivativeLimitOrderDelta],
    ) -> Result<()>;

    fn emit_typed_event(&mut self, event: ExchangeEvent);

    /// Drop every staged market order. Called once at the end of a block.
    fn clear_transient_orders(&mut self);
}
