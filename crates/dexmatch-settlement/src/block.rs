//! End-of-block pipeline.
//!
//! Runs once per block, after every transaction has been delivered:
//!
//! 1. Snapshot the fee discount inputs (read-only for the whole block)
//! 2. Build one execution per market with staged orders, in ascending
//!    market-id order, sharing one [`PositionStates`]
//! 3. Digest the executions for cross-validator comparison
//! 4. Persist them in the same order
//! 5. Clear the staged orders

use std::collections::BTreeMap;

use dexmatch_matchcore::{
    compute_block_digest, execute_derivative_market_order_matching, execute_liquidation,
    PositionStates,
};
use dexmatch_types::{
    BatchExecutionData, Denom, ExchangeParams, ExchangeReader, ExchangeWriter, MarketId, Result,
    SubaccountId, TradingRewardPoints,
};
use rust_decimal::Decimal;

use crate::idempotency::SettlementKey;
use crate::persist::BatchSettler;
use crate::position_cache::ModifiedPositionCache;
use crate::vwap::DerivativeVwapInfo;

/// What one block's matching and settlement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: u64,
    /// Digest over every market's execution, in processing order.
    pub executions_digest: [u8; 32],
    /// Markets that produced an execution, ascending.
    pub markets: Vec<MarketId>,
    pub reward_points: TradingRewardPoints,
    /// Fees owed to the fee auction, per quote denom.
    pub auction_fee_rewards: BTreeMap<Denom, Decimal>,
    pub vwap: DerivativeVwapInfo,
    pub modified_positions: ModifiedPositionCache,
}

impl BlockOutcome {
    /// Hex-encoded execution digest, for logs and cross-node comparison.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.executions_digest)
    }
}

/// Drives matching and settlement for consecutive blocks.
#[derive(Debug)]
pub struct BlockProcessor {
    settler: BatchSettler,
}

impl BlockProcessor {
    #[must_use]
    pub fn new(params: &ExchangeParams) -> Self {
        Self {
            settler: BatchSettler::new(params.idempotency_cache_size).with_position_cache(),
        }
    }

    /// Match and settle every market with staged orders.
    ///
    /// # Errors
    /// Any matching or persistence error aborts the block. Errors for which
    /// [`is_invariant_violation`](dexmatch_types::ExchangeError::is_invariant_violation)
    /// holds indicate a defect and must halt the node.
    pub fn end_block<C: ExchangeReader + ExchangeWriter>(&mut self, ctx: &mut C) -> Result<BlockOutcome> {
        let block = ctx.block_info();
        let staking_info = ctx.fee_discount_staking_info();
        let schedule = ctx.fee_discount_schedule();

        let mut market_ids = ctx.transient_market_ids();
        market_ids.sort();
        market_ids.dedup();

        let mut positions = PositionStates::new();
        let mut executions = Vec::with_capacity(market_ids.len());
        for market_id in &market_ids {
            let built = execute_derivative_market_order_matching(
                &*ctx,
                market_id,
                schedule.as_ref(),
                &staking_info,
                &mut positions,
            )?;
            match built {
                Some(execution) => executions.push(execution),
                None => tracing::debug!(market = %market_id, "No execution for market"),
            }
        }

        let executions_digest = compute_block_digest(&executions);
        let reward_points = self
            .settler
            .persist_batch(ctx, block.height, &executions, TradingRewardPoints::new())?;
        ctx.clear_transient_orders();

        let state = self.settler.take_block_state();
        let outcome = BlockOutcome {
            height: block.height,
            executions_digest,
            markets: executions.iter().map(BatchExecutionData::market_id).collect(),
            reward_points,
            auction_fee_rewards: state.auction_fee_rewards,
            vwap: state.vwap,
            modified_positions: state.modified_positions.unwrap_or_default(),
        };
        tracing::info!(
            height = block.height,
            markets = outcome.markets.len(),
            digest = %outcome.digest_hex(),
            reward_recipients = outcome.reward_points.len(),
            "Block settled"
        );
        Ok(outcome)
    }

    /// Liquidate one position and settle it immediately, without bank
    /// charges.
    ///
    /// Returns `Ok(None)` if the market no longer exists.
    pub fn liquidate<C: ExchangeReader + ExchangeWriter>(
        &mut self,
        ctx: &mut C,
        market_id: &MarketId,
        subaccount_id: &SubaccountId,
    ) -> Result<Option<BatchExecutionData>> {
        let height = ctx.block_info().height;
        let mut positions = PositionStates::new();
        let Some(execution) = execute_liquidation(&*ctx, market_id, subaccount_id, &mut positions)? else {
            return Ok(None);
        };
        let key = SettlementKey::liquidation(height, *market_id, *subaccount_id);
        self.settler
            .persist_single(ctx, key, &execution, TradingRewardPoints::new(), true)?;
        Ok(Some(execution))
    }

    #[must_use]
    pub fn settler(&self) -> &BatchSettler {
        &self.settler
    }
}
