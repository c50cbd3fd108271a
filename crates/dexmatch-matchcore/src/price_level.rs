//! A single price level of the resting orderbook.
//!
//! Orders at the same price are kept in FIFO order (time priority) using
//! a [`VecDeque`] of indices into the book's order list.

use std::collections::VecDeque;

use rust_decimal::Decimal;

/// All resting orders at one price.
///
/// The front of the deque has the highest time priority and is filled
/// first.
#[derive(Debug, Clone)]
pub struct RestingLevel {
    pub price: Decimal,
    /// Indices into the owning book's order list.
    pub order_indices: VecDeque<usize>,
}

impl RestingLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            order_indices: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, index: usize) {
        self.order_indices.push_back(index);
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        self.order_indices.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<usize> {
        self.order_indices.front().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_indices.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order_indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo() {
        let mut level = RestingLevel::new(Decimal::new(100, 0));
        level.push_back(3);
        level.push_back(1);
        assert_eq!(level.len(), 2);
        assert_eq!(level.front(), Some(3));
        assert_eq!(level.pop_front(), Some(3), "FIFO: first in should be first out");
        assert_eq!(level.pop_front(), Some(1));
        assert!(level.is_empty());
        assert_eq!(level.pop_front(), None);
    }
}
