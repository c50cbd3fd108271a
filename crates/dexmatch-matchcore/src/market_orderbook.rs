//! Cursor-based walker over one side of a block's market orders.
//!
//! The incoming orders are already in price priority. The walker exposes
//! the next unfilled slice through [`MarketOrderbook::peek`] and records
//! fills in a parallel array; the orders themselves are never mutated.
//!
//! Invariants held after every call:
//! - `fill_quantities[i] <= orders[i].quantity()`
//! - `notional == Σ fill_quantities[i] * orders[i].price()`
//! - `total_quantity_filled == Σ fill_quantities[i]`

use dexmatch_types::{
    DecimalExt, DerivativeMarketOrder, ExchangeError, MatchableOrder, PriceLevel, Result,
    SpotMarketOrder,
};
use rust_decimal::Decimal;

/// Matching state for one direction of staged market orders.
#[derive(Debug, Clone)]
pub struct MarketOrderbook<O> {
    orders: Vec<O>,
    fill_quantities: Vec<Decimal>,
    current_index: usize,
    notional: Decimal,
    total_quantity_filled: Decimal,
}

pub type SpotMarketOrderbook = MarketOrderbook<SpotMarketOrder>;
pub type DerivativeMarketOrderbook = MarketOrderbook<DerivativeMarketOrder>;

impl<O: MatchableOrder> MarketOrderbook<O> {
    /// Returns `None` when there is nothing to match.
    #[must_use]
    pub fn new(orders: Vec<O>) -> Option<Self> {
        if orders.is_empty() {
            return None;
        }
        let fill_quantities = vec![Decimal::ZERO; orders.len()];
        Some(Self {
            orders,
            fill_quantities,
            current_index: 0,
            notional: Decimal::ZERO,
            total_quantity_filled: Decimal::ZERO,
        })
    }

    /// The next unfilled slice of liquidity, or `None` once every order is
    /// exhausted. Moves the cursor past fully filled orders.
    pub fn peek(&mut self) -> Option<PriceLevel> {
        while let Some(order) = self.orders.get(self.current_index) {
            let remaining = order.quantity() - self.fill_quantities[self.current_index];
            if remaining.is_positive_strict() {
                return Some(PriceLevel {
                    price: order.price(),
                    quantity: remaining,
                });
            }
            self.current_index += 1;
        }
        None
    }

    /// Fill `quantity` of the order under the cursor.
    ///
    /// # Errors
    /// `OrderbookFillInvalid` if `quantity` is negative, exceeds what is
    /// left on the current order, or there is no current order. The state
    /// is left untouched on error.
    pub fn fill(&mut self, quantity: Decimal) -> Result<()> {
        let Some(order) = self.orders.get(self.current_index) else {
            return Err(ExchangeError::OrderbookFillInvalid {
                requested: quantity,
                fillable: Decimal::ZERO,
            });
        };
        let filled = self.fill_quantities[self.current_index];
        let new_fill = filled.add_checked(quantity)?;
        if quantity.is_sign_negative() || new_fill > order.quantity() {
            return Err(ExchangeError::OrderbookFillInvalid {
                requested: quantity,
                fillable: order.quantity() - filled,
            });
        }
        let notional = self.notional.add_checked(quantity.mul_trunc(order.price())?)?;
        let total = self.total_quantity_filled.add_checked(quantity)?;

        self.fill_quantities[self.current_index] = new_fill;
        self.notional = notional;
        self.total_quantity_filled = total;
        Ok(())
    }

    /// Every order is fully filled.
    #[must_use]
    pub fn done(&self) -> bool {
        self.orders
            .iter()
            .zip(&self.fill_quantities)
            .skip(self.current_index)
            .all(|(order, filled)| *filled >= order.quantity())
    }

    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.notional
    }

    #[must_use]
    pub fn total_quantity_filled(&self) -> Decimal {
        self.total_quantity_filled
    }

    #[must_use]
    pub fn fill_quantities(&self) -> &[Decimal] {
        &self.fill_quantities
    }

    /// Index of the order under the cursor. Equal to `orders().len()` once
    /// the walker has moved past the last order.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn orders(&self) -> &[O] {
        &self.orders
    }

    /// Give back the orders together with their fills.
    #[must_use]
    pub fn into_parts(self) -> (Vec<O>, Vec<Decimal>) {
        (self.orders, self.fill_quantities)
    }
}
