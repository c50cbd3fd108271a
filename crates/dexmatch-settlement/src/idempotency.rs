//! Settlement idempotency guard: prevents double-settlement.
//!
//! Each market's batch execution is applied at most once per block height,
//! and each liquidation at most once per (height, market, subaccount).
//! Attempting to settle the same key a second time returns
//! [`ExchangeError::BatchAlreadySettled`].
//!
//! The guard keeps a bounded FIFO cache so memory usage stays predictable
//! on long-running nodes.

use std::collections::{BTreeSet, VecDeque};

use dexmatch_types::{ExchangeError, MarketId, Result, SubaccountId};

/// What was settled: a market's batch, or one liquidation inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SettlementKey {
    pub height: u64,
    pub market_id: MarketId,
    /// `Some` for liquidations, keyed by the liquidated subaccount.
    pub liquidated: Option<SubaccountId>,
}

impl SettlementKey {
    #[must_use]
    pub fn batch(height: u64, market_id: MarketId) -> Self {
        Self {
            height,
            market_id,
            liquidated: None,
        }
    }

    #[must_use]
    pub fn liquidation(height: u64, market_id: MarketId, subaccount_id: SubaccountId) -> Self {
        Self {
            height,
            market_id,
            liquidated: Some(subaccount_id),
        }
    }
}

/// Prevents double-settlement of the same batch.
///
/// When the set reaches `max_size`, the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct IdempotencyGuard {
    settled: BTreeSet<SettlementKey>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<SettlementKey>,
    max_size: usize,
}

impl IdempotencyGuard {
    /// Create a new guard with the given maximum cache size.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            settled: BTreeSet::new(),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Fail if `key` was already settled.
    pub fn check(&self, key: &SettlementKey) -> Result<()> {
        if self.settled.contains(key) {
            return Err(ExchangeError::BatchAlreadySettled {
                market_id: key.market_id,
                height: key.height,
            });
        }
        Ok(())
    }

    /// Mark `key` as settled.
    ///
    /// # Errors
    /// Returns [`ExchangeError::BatchAlreadySettled`] if `key` has already
    /// been marked as settled.
    pub fn mark_settled(&mut self, key: SettlementKey) -> Result<()> {
        self.check(&key)?;

        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }

        self.settled.insert(key);
        self.order.push_back(key);
        Ok(())
    }

    #[must_use]
    pub fn is_settled(&self, key: &SettlementKey) -> bool {
        self.settled.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}
