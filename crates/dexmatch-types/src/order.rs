//! Order types for the exchange core.
//!
//! Orders are immutable once matched against: fills are tracked out-of-band
//! by the matchers, never by mutating the order itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::DecimalExt;
use crate::{MarketId, OrderHash, Result, SubaccountId};

/// The next available slice of liquidity exposed by a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Anything a matcher can walk: a price and a total quantity.
pub trait MatchableOrder {
    fn price(&self) -> Decimal;
    fn quantity(&self) -> Decimal;
}

/// Common order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub subaccount_id: SubaccountId,
    /// Limit price for resting orders, worst acceptable price for market orders.
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_buy: bool,
    pub order_hash: OrderHash,
    /// Client-supplied order id.
    pub cid: String,
    /// Relayer that receives a share of the trading fee.
    pub fee_recipient: Option<SubaccountId>,
}

impl Order {
    #[must_use]
    pub fn side_label(&self) -> &'static str {
        if self.is_buy { "BUY" } else { "SELL" }
    }

    /// `price * quantity`, truncated.
    pub fn notional(&self) -> Result<Decimal> {
        self.price.mul_trunc(self.quantity)
    }
}

impl MatchableOrder for Order {
    fn price(&self) -> Decimal {
        self.price
    }
    fn quantity(&self) -> Decimal {
        self.quantity
    }
}

/// A spot market order staged for this block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotMarketOrder {
    pub market_id: MarketId,
    pub order: Order,
}

impl MatchableOrder for SpotMarketOrder {
    fn price(&self) -> Decimal {
        self.order.price
    }
    fn quantity(&self) -> Decimal {
        self.order.quantity
    }
}

/// A derivative market order staged for this block.
///
/// `margin + fee_hold` was removed from the trader's available balance
/// when the order was placed; whatever the execution does not consume is
/// refunded by the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeMarketOrder {
    pub market_id: MarketId,
    pub order: Order,
    /// Collateral for the whole quantity. Zero means reduce-only.
    pub margin: Decimal,
    /// Fee reserved at placement at the undiscounted taker rate.
    pub fee_hold: Decimal,
}

impl DerivativeMarketOrder {
    #[must_use]
    pub fn is_reduce_only(&self) -> bool {
        self.margin.is_zero()
    }

    #[must_use]
    pub fn subaccount_id(&self) -> SubaccountId {
        self.order.subaccount_id
    }

    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.order.is_buy
    }

    /// Margin attributable to `qty` of this order.
    pub fn margin_for(&self, qty: Decimal) -> Result<Decimal> {
        if self.order.quantity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.margin.mul_trunc(qty)?.quo_trunc(self.order.quantity)
    }

    /// Fee hold attributable to `qty` of this order.
    pub fn fee_hold_for(&self, qty: Decimal) -> Result<Decimal> {
        if self.order.quantity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.fee_hold.mul_trunc(qty)?.quo_trunc(self.order.quantity)
    }
}

impl MatchableOrder for DerivativeMarketOrder {
    fn price(&self) -> Decimal {
        self.order.price
    }
    fn quantity(&self) -> Decimal {
        self.order.quantity
    }
}

/// A derivative limit order resting in the persistent orderbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeLimitOrder {
    pub market_id: MarketId,
    pub order: Order,
    /// Collateral for the full original quantity. Zero means reduce-only.
    pub margin: Decimal,
    /// Quantity still available to be matched.
    pub fillable: Decimal,
}

impl DerivativeLimitOrder {
    #[must_use]
    pub fn is_reduce_only(&self) -> bool {
        self.margin.is_zero()
    }

    #[must_use]
    pub fn subaccount_id(&self) -> SubaccountId {
        self.order.subaccount_id
    }

    /// Margin attributable to `qty`, pro rata on the original quantity.
    pub fn margin_for(&self, qty: Decimal) -> Result<Decimal> {
        if self.order.quantity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.margin.mul_trunc(qty)?.quo_trunc(self.order.quantity)
    }

    /// Fee reserved at placement for `qty`: only positive maker rates hold.
    pub fn fee_hold_for(&self, qty: Decimal, maker_fee_rate: Decimal) -> Result<Decimal> {
        if !maker_fee_rate.is_positive_strict() {
            return Ok(Decimal::ZERO);
        }
        self.order.price.mul_trunc(qty)?.mul_trunc(maker_fee_rate)
    }
}

impl MatchableOrder for DerivativeLimitOrder {
    fn price(&self) -> Decimal {
        self.order.price
    }
    /// Resting orders expose only what is still fillable.
    fn quantity(&self) -> Decimal {
        self.fillable
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(
        subaccount_id: SubaccountId,
        is_buy: bool,
        price: Decimal,
        quantity: Decimal,
        index: u64,
    ) -> Self {
        Self {
            subaccount_id,
            price,
            quantity,
            is_buy,
            order_hash: OrderHash::from_index(index),
            cid: format!("cid-{index}"),
            fee_recipient: None,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl DerivativeMarketOrder {
    pub fn dummy(
        market_id: MarketId,
        subaccount_id: SubaccountId,
        is_buy: bool,
        price: Decimal,
        quantity: Decimal,
        margin: Decimal,
        index: u64,
    ) -> Self {
        Self {
            market_id,
            order: Order::dummy(subaccount_id, is_buy, price, quantity, index),
            margin,
            fee_hold: Decimal::ZERO,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl DerivativeLimitOrder {
    pub fn dummy(
        market_id: MarketId,
        subaccount_id: SubaccountId,
        is_buy: bool,
        price: Decimal,
        quantity: Decimal,
        margin: Decimal,
        index: u64,
    ) -> Self {
        Self {
            market_id,
            order: Order::dummy(subaccount_id, is_buy, price, quantity, index),
            margin,
            fillable: quantity,
        }
    }
}
