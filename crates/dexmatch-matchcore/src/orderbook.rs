//! One side of a market's resting limit orders, walked best price first.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, RestingLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, RestingLevel>` -- lowest price first
//!
//! Within a level, orders keep their input order. Fills are recorded in a
//! parallel array indexed like the input list.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use dexmatch_types::{
    DecimalExt, DerivativeLimitOrder, DerivativeLimitOrderDelta, ExchangeError, PriceLevel, Result,
};
use rust_decimal::Decimal;

use crate::price_level::RestingLevel;

/// Resting limit orders of one side of one market.
#[derive(Debug)]
pub struct RestingOrderbook {
    is_buy: bool,
    orders: Vec<DerivativeLimitOrder>,
    fill_quantities: Vec<Decimal>,
    bids: BTreeMap<Reverse<Decimal>, RestingLevel>,
    asks: BTreeMap<Decimal, RestingLevel>,
}

impl RestingOrderbook {
    /// Build one side of the book. Orders of the wrong side or with nothing
    /// left to fill are kept in the list but never offered.
    #[must_use]
    pub fn new(is_buy: bool, orders: Vec<DerivativeLimitOrder>) -> Self {
        let mut book = Self {
            is_buy,
            fill_quantities: vec![Decimal::ZERO; orders.len()],
            orders,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        };
        for index in 0..book.orders.len() {
            let order = &book.orders[index];
            if order.order.is_buy != is_buy || !order.fillable.is_positive_strict() {
                continue;
            }
            let price = order.order.price;
            if is_buy {
                book.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| RestingLevel::new(price))
                    .push_back(index);
            } else {
                book.asks
                    .entry(price)
                    .or_insert_with(|| RestingLevel::new(price))
                    .push_back(index);
            }
        }
        book
    }

    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.is_buy
    }

    fn best_level_mut(&mut self) -> Option<&mut RestingLevel> {
        if self.is_buy {
            self.bids.values_mut().next()
        } else {
            self.asks.values_mut().next()
        }
    }

    fn drop_best_level(&mut self) {
        if self.is_buy {
            self.bids.pop_first();
        } else {
            self.asks.pop_first();
        }
    }

    /// The best unfilled order, as `(index, remaining level)`.
    pub fn peek(&mut self) -> Option<(usize, PriceLevel)> {
        loop {
            let level = self.best_level_mut()?;
            let Some(index) = level.front() else {
                self.drop_best_level();
                continue;
            };
            let price = level.price;
            let remaining = self.orders[index].fillable - self.fill_quantities[index];
            if remaining.is_positive_strict() {
                return Some((index, PriceLevel { price, quantity: remaining }));
            }
            if let Some(level) = self.best_level_mut() {
                level.pop_front();
            }
        }
    }

    /// Fill `quantity` of the best order; returns its index.
    ///
    /// # Errors
    /// `OrderbookFillInvalid` when the book is empty or `quantity` exceeds
    /// what the best order has left. The state is left untouched on error.
    pub fn fill(&mut self, quantity: Decimal) -> Result<usize> {
        let Some((index, level)) = self.peek() else {
            return Err(ExchangeError::OrderbookFillInvalid {
                requested: quantity,
                fillable: Decimal::ZERO,
            });
        };
        if quantity.is_sign_negative() || quantity > level.quantity {
            return Err(ExchangeError::OrderbookFillInvalid {
                requested: quantity,
                fillable: level.quantity,
            });
        }
        self.fill_quantities[index] = self.fill_quantities[index].add_checked(quantity)?;
        Ok(index)
    }

    /// Best price on offer, if any.
    pub fn best_price(&mut self) -> Option<Decimal> {
        self.peek().map(|(_, level)| level.price)
    }

    /// Number of distinct price levels still holding orders.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_buy {
            self.bids.len()
        } else {
            self.asks.len()
        }
    }

    #[must_use]
    pub fn order(&self, index: usize) -> &DerivativeLimitOrder {
        &self.orders[index]
    }

    #[must_use]
    pub fn orders(&self) -> &[DerivativeLimitOrder] {
        &self.orders
    }

    #[must_use]
    pub fn fill_quantities(&self) -> &[Decimal] {
        &self.fill_quantities
    }

    /// A filled delta for every order that received a fill, in input order.
    #[must_use]
    pub fn filled_deltas(&self) -> Vec<DerivativeLimitOrderDelta> {
        self.orders
            .iter()
            .zip(&self.fill_quantities)
            .filter(|(_, filled)| filled.is_positive_strict())
            .map(|(order, filled)| DerivativeLimitOrderDelta {
                order: order.clone(),
                fill_quantity: *filled,
                cancel_quantity: Decimal::ZERO,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use dexmatch_types::*;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn resting(is_buy: bool, price: i64, qty: i64, index: u64) -> DerivativeLimitOrder {
        DerivativeLimitOrder::dummy(
            MarketId::from_byte(1),
            SubaccountId::from_byte(u8::try_from(index).unwrap()),
            is_buy,
            dec(price),
            dec(qty),
            dec(price * qty / 10),
            index,
        )
    }

    #[test]
    fn asks_walk_lowest_first_fifo_within_level() {
        let mut book = RestingOrderbook::new(
            false,
            vec![resting(false, 105, 1, 0), resting(false, 101, 1, 1), resting(false, 101, 1, 2)],
        );
        assert_eq!(book.depth(), 2);
        assert_eq!(book.fill(dec(1)).unwrap(), 1);
        assert_eq!(book.fill(dec(1)).unwrap(), 2);
        assert_eq!(book.best_price(), Some(dec(105)));
        assert_eq!(book.fill(dec(1)).unwrap(), 0);
        assert_eq!(book.peek(), None);
        assert_eq!(book.depth(), 0);
    }

    #[test]
    fn bids_walk_highest_first() {
        let mut book = RestingOrderbook::new(
            true,
            vec![resting(true, 90, 1, 0), resting(true, 100, 2, 1), resting(true, 95, 1, 2)],
        );
        let (index, level) = book.peek().unwrap();
        assert_eq!(index, 1);
        assert_eq!(level, PriceLevel { price: dec(100), quantity: dec(2) });
    }

    #[test]
    fn partial_fill_and_deltas() {
        let mut book = RestingOrderbook::new(false, vec![resting(false, 100, 10, 0)]);
        book.fill(dec(4)).unwrap();
        assert_eq!(book.peek().unwrap().1.quantity, dec(6));

        let deltas = book.filled_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].fill_quantity, dec(4));
        assert_eq!(deltas[0].remaining(), dec(6));
    }

    #[test]
    fn overfill_rejected() {
        let mut book = RestingOrderbook::new(false, vec![resting(false, 100, 3, 0)]);
        let err = book.fill(dec(4)).unwrap_err();
        assert!(matches!(err, ExchangeError::OrderbookFillInvalid { .. }));
        assert_eq!(book.fill_quantities(), &[Decimal::ZERO]);
    }

    #[test]
    fn wrong_side_and_exhausted_orders_ignored() {
        let mut exhausted = resting(false, 99, 5, 1);
        exhausted.fillable = Decimal::ZERO;
        let mut book = RestingOrderbook::new(
            false,
            vec![resting(true, 100, 1, 0), exhausted, resting(false, 101, 1, 2)],
        );
        assert_eq!(book.peek().map(|(i, _)| i), Some(2));
        assert_eq!(book.orders().len(), 3);
    }

    #[test]
    fn fillable_not_original_quantity_is_offered() {
        let mut order = resting(true, 100, 10, 0);
        order.fillable = dec(3);
        let mut book = RestingOrderbook::new(true, vec![order]);
        assert_eq!(book.peek().unwrap().1.quantity, dec(3));
        assert!(book.fill(dec(4)).is_err());
    }

    #[test]
    fn empty_book_fill_fails() {
        let mut book = RestingOrderbook::new(true, vec![]);
        assert!(book.fill(Decimal::ONE).is_err());
        assert!(book.filled_deltas().is_empty());
    }
}
