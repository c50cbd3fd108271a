//! Persistence of batch executions.
//!
//! Applying one [`BatchExecutionData`] follows a fixed sequence so that
//! every validator writes state and emits events in the same order:
//!
//! 1. Check the exactly-once guard and every bank charge the deposit
//!    deltas need; nothing is written if either fails
//! 2. Mark the key settled
//! 3. Apply deposit deltas (liquidations never touch the bank)
//! 4. Apply resting order filled deltas, then cancelled deltas
//! 5. Write positions, mirroring them into the modified-position cache
//! 6. Emit events
//! 7. Merge the VWAP sample and the auction fee into the block accumulators
//! 8. Merge trading reward points
//!
//! A writer failure after step 2 leaves the key settled, so a retry is
//! rejected with `BatchAlreadySettled` instead of applying the earlier
//! writes a second time.

use std::collections::BTreeMap;

use dexmatch_types::{
    merge_trading_reward_points, BatchExecutionData, DecimalExt, Denom, DerivativeLimitOrderDelta,
    ExchangeWriter, MarketId, Result, TradingRewardPoints,
};
use rust_decimal::Decimal;

use crate::idempotency::{IdempotencyGuard, SettlementKey};
use crate::position_cache::ModifiedPositionCache;
use crate::vwap::DerivativeVwapInfo;

/// Block-scoped accumulators handed over at the end of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettledBlockState {
    pub vwap: DerivativeVwapInfo,
    pub auction_fee_rewards: BTreeMap<Denom, Decimal>,
    pub modified_positions: Option<ModifiedPositionCache>,
}

/// Applies batch executions to exchange state exactly once.
#[derive(Debug)]
pub struct BatchSettler {
    idempotency: IdempotencyGuard,
    vwap: DerivativeVwapInfo,
    position_cache: Option<ModifiedPositionCache>,
    /// Fees owed to the fee auction, per quote denom.
    auction_fee_rewards: BTreeMap<Denom, Decimal>,
}

impl BatchSettler {
    #[must_use]
    pub fn new(idempotency_cache_size: usize) -> Self {
        Self {
            idempotency: IdempotencyGuard::new(idempotency_cache_size),
            vwap: DerivativeVwapInfo::new(),
            position_cache: None,
            auction_fee_rewards: BTreeMap::new(),
        }
    }

    /// Mirror every written position into a [`ModifiedPositionCache`].
    #[must_use]
    pub fn with_position_cache(mut self) -> Self {
        self.position_cache = Some(ModifiedPositionCache::new());
        self
    }

    /// Persist one market's execution.
    ///
    /// With `is_liquidation` every deposit delta is applied without a bank
    /// charge. Returns `rewards` with the execution's points merged in.
    ///
    /// # Errors
    /// - `BatchAlreadySettled` if this key was already applied
    /// - a bank error from the pre-write check; nothing is written and the
    ///   key stays open
    /// - any later writer error; the key stays settled
    pub fn persist_single<W: ExchangeWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        key: SettlementKey,
        execution: &BatchExecutionData,
        rewards: TradingRewardPoints,
        is_liquidation: bool,
    ) -> Result<TradingRewardPoints> {
        self.idempotency.check(&key)?;
        let market_id = execution.market_id();
        let denom = &execution.market.quote_denom;

        if !is_liquidation {
            writer.check_deposit_updates(denom, &execution.deposit_deltas)?;
        }
        let vwap_sample = execution
            .vwap_data
            .as_ref()
            .filter(|_| execution.market.has_valid_mark_price(execution.mark_price));
        if let Some(sample) = vwap_sample {
            self.vwap.merged(&market_id, sample)?;
        }
        let auction_total = if execution.auction_fee_reward.is_zero() {
            None
        } else {
            let current = self.auction_fee_rewards.get(denom).copied().unwrap_or(Decimal::ZERO);
            Some(current.add_checked(execution.auction_fee_reward)?)
        };

        self.idempotency.mark_settled(key)?;

        for (subaccount_id, delta) in &execution.deposit_deltas {
            if is_liquidation {
                writer.update_deposit_without_bank_charge(subaccount_id, denom, delta)?;
            } else {
                writer.update_deposit(subaccount_id, denom, delta)?;
            }
        }

        update_resting_orders(writer, &market_id, &execution.resting_limit_order_filled_deltas)?;
        update_resting_orders(writer, &market_id, &execution.resting_limit_order_cancelled_deltas)?;

        for (subaccount_id, position) in &execution.positions {
            writer.set_position(&market_id, subaccount_id, position);
            if let Some(cache) = self.position_cache.as_mut() {
                cache.set_position(market_id, *subaccount_id, position.clone());
            }
        }

        let events = execution.events_in_emission_order();
        let event_count = events.len();
        for event in events {
            writer.emit_typed_event(event);
        }

        if let Some(sample) = vwap_sample {
            self.vwap.apply_vwap(market_id, sample)?;
        }
        if let Some(total) = auction_total {
            self.auction_fee_rewards.insert(denom.clone(), total);
        }

        tracing::info!(
            market = %market_id,
            height = key.height,
            deposits = execution.deposit_deltas.len(),
            positions = execution.positions.len(),
            events = event_count,
            is_liquidation,
            "Batch execution persisted"
        );
        Ok(merge_trading_reward_points(rewards, &execution.trading_reward_points))
    }

    /// Persist every execution of a block in ascending market-id order.
    pub fn persist_batch<W: ExchangeWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        height: u64,
        executions: &[BatchExecutionData],
        rewards: TradingRewardPoints,
    ) -> Result<TradingRewardPoints> {
        let mut ordered: Vec<&BatchExecutionData> = executions.iter().collect();
        ordered.sort_by_key(|e| e.market_id());

        let mut rewards = rewards;
        for execution in ordered {
            let key = SettlementKey::batch(height, execution.market_id());
            rewards = self.persist_single(&mut *writer, key, execution, rewards, false)?;
        }
        Ok(rewards)
    }

    #[must_use]
    pub fn vwap(&self) -> &DerivativeVwapInfo {
        &self.vwap
    }

    #[must_use]
    pub fn position_cache(&self) -> Option<&ModifiedPositionCache> {
        self.position_cache.as_ref()
    }

    #[must_use]
    pub fn auction_fee_rewards(&self) -> &BTreeMap<Denom, Decimal> {
        &self.auction_fee_rewards
    }

    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    /// Hand over the block-scoped accumulators, leaving them empty for the
    /// next block. The exactly-once guard is kept.
    pub fn take_block_state(&mut self) -> SettledBlockState {
        SettledBlockState {
            vwap: std::mem::take(&mut self.vwap),
            auction_fee_rewards: std::mem::take(&mut self.auction_fee_rewards),
            modified_positions: self.position_cache.as_mut().map(std::mem::take),
        }
    }
}

/// Apply resting order deltas, sells then buys.
fn update_resting_orders<W: ExchangeWriter + ?Sized>(
    writer: &mut W,
    market_id: &MarketId,
    deltas: &[DerivativeLimitOrderDelta],
) -> Result<()> {
    for is_buy in [false, true] {
        let side: Vec<DerivativeLimitOrderDelta> = deltas.iter().filter(|d| d.is_buy() == is_buy).cloned().collect();
        if !side.is_empty() {
            writer.update_limit_orders_from_filled_deltas(market_id, is_buy, &side)?;
        }
    }
    Ok(())
}
