//! Determinism verification utilities for cross-validator consistency.
//!
//! Every validator replaying the same block must produce the exact same
//! [`BatchExecutionData`] for every market. The execution digest is a
//! SHA-256 over every consensus-relevant field, in a fixed order, so two
//! runs can be compared without diffing full payloads.

use dexmatch_types::constants::{BATCH_DIGEST_DOMAIN, BLOCK_DIGEST_DOMAIN};
use dexmatch_types::{
    BatchExecutionData, DerivativeLimitOrderDelta, DerivativeTradeLog,
    EventBatchDerivativeExecution, EventCancelDerivativeOrder, ExchangeError, MarketId, OrderHash,
    Result, SubaccountId,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

fn update_decimal(hasher: &mut Sha256, value: Decimal) {
    // normalised so that 1.0 and 1 hash alike
    hasher.update(value.normalize().to_string().as_bytes());
    hasher.update(b"|");
}

fn update_optional_decimal(hasher: &mut Sha256, value: Option<Decimal>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            update_decimal(hasher, v);
        }
        None => hasher.update([0u8]),
    }
}

fn update_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn update_trade(hasher: &mut Sha256, trade: &DerivativeTradeLog) {
    hasher.update(trade.order_hash.as_bytes());
    hasher.update(trade.subaccount_id.0);
    update_decimal(hasher, trade.position_delta.quantity);
    update_decimal(hasher, trade.position_delta.margin);
    update_decimal(hasher, trade.position_delta.execution_price);
    update_decimal(hasher, trade.payout);
    update_decimal(hasher, trade.fee);
    update_decimal(hasher, trade.pnl);
    match trade.fee_recipient {
        Some(r) => {
            hasher.update([1u8]);
            hasher.update(r.0);
        }
        None => hasher.update([0u8]),
    }
    hasher.update(trade.cid.as_bytes());
    hasher.update(b"|");
}

fn update_execution_event(hasher: &mut Sha256, event: Option<&EventBatchDerivativeExecution>) {
    let Some(event) = event else {
        hasher.update([0u8]);
        return;
    };
    hasher.update([1u8, u8::from(event.is_buy), u8::from(event.is_liquidation)]);
    hasher.update(event.execution_type.to_string().as_bytes());
    update_optional_decimal(hasher, event.cumulative_funding);
    update_len(hasher, event.trades.len());
    for trade in &event.trades {
        update_trade(hasher, trade);
    }
}

fn update_cancel_events(hasher: &mut Sha256, events: &[EventCancelDerivativeOrder]) {
    update_len(hasher, events.len());
    for event in events {
        hasher.update(event.order_hash.as_bytes());
        hasher.update(event.subaccount_id.0);
        hasher.update([u8::from(event.is_limit_cancel)]);
        hasher.update(event.reason.to_string().as_bytes());
    }
}

fn update_order_deltas(hasher: &mut Sha256, deltas: &[DerivativeLimitOrderDelta]) {
    update_len(hasher, deltas.len());
    for delta in deltas {
        hasher.update(delta.order_hash().as_bytes());
        update_decimal(hasher, delta.fill_quantity);
        update_decimal(hasher, delta.cancel_quantity);
    }
}

/// Digest of one market's execution.
///
/// Depends on, in order: market id and type, mark price, funding, deposit
/// deltas, positions, resting order deltas, the four execution events,
/// cancellation events, VWAP sample, reward points, auction fee reward and
/// the liquidation flag.
#[must_use]
pub fn compute_execution_digest(execution: &BatchExecutionData) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BATCH_DIGEST_DOMAIN);
    hasher.update(execution.market.market_id.as_bytes());
    hasher.update([execution.market.market_type.tag()]);
    update_optional_decimal(&mut hasher, execution.mark_price);
    update_optional_decimal(&mut hasher, execution.funding.map(|f| f.cumulative_funding));

    update_len(&mut hasher, execution.deposit_deltas.len());
    for (subaccount_id, delta) in &execution.deposit_deltas {
        hasher.update(subaccount_id.0);
        update_decimal(&mut hasher, delta.available_balance_delta);
        update_decimal(&mut hasher, delta.total_balance_delta);
    }

    update_len(&mut hasher, execution.positions.len());
    for (subaccount_id, position) in &execution.positions {
        hasher.update(subaccount_id.0);
        update_decimal(&mut hasher, position.quantity);
        update_decimal(&mut hasher, position.entry_price);
        update_decimal(&mut hasher, position.margin);
        update_decimal(&mut hasher, position.cumulative_funding_entry);
    }

    update_order_deltas(&mut hasher, &execution.resting_limit_order_filled_deltas);
    update_order_deltas(&mut hasher, &execution.resting_limit_order_cancelled_deltas);

    update_execution_event(&mut hasher, execution.market_buy_order_execution_event.as_ref());
    update_execution_event(&mut hasher, execution.resting_limit_sell_order_execution_event.as_ref());
    update_execution_event(&mut hasher, execution.market_sell_order_execution_event.as_ref());
    update_execution_event(&mut hasher, execution.resting_limit_buy_order_execution_event.as_ref());
    update_cancel_events(&mut hasher, &execution.cancel_limit_order_events);
    update_cancel_events(&mut hasher, &execution.cancel_market_order_events);

    match &execution.vwap_data {
        Some(vwap) => {
            hasher.update([1u8]);
            update_decimal(&mut hasher, vwap.price);
            update_decimal(&mut hasher, vwap.quantity);
        }
        None => hasher.update([0u8]),
    }

    update_len(&mut hasher, execution.trading_reward_points.len());
    for (subaccount_id, points) in execution.trading_reward_points.iter() {
        hasher.update(subaccount_id.0);
        update_decimal(&mut hasher, *points);
    }
    update_decimal(&mut hasher, execution.auction_fee_reward);
    hasher.update([u8::from(execution.is_liquidation)]);

    hasher.finalize().into()
}

/// Digest over a whole block's executions, in processing order.
#[must_use]
pub fn compute_block_digest(executions: &[BatchExecutionData]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BLOCK_DIGEST_DOMAIN);
    update_len(&mut hasher, executions.len());
    for execution in executions {
        hasher.update(compute_execution_digest(execution));
    }
    hasher.finalize().into()
}

/// Check an execution against a digest computed elsewhere.
///
/// # Errors
/// `DeterminismViolation` carrying both digests in hex.
pub fn verify_execution_digest(execution: &BatchExecutionData, expected: &[u8; 32]) -> Result<()> {
    let actual = compute_execution_digest(execution);
    if actual != *expected {
        return Err(ExchangeError::DeterminismViolation {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// Deterministic hash of the synthetic order that liquidates a position.
#[must_use]
pub fn liquidation_order_hash(market_id: &MarketId, subaccount_id: &SubaccountId, height: u64) -> OrderHash {
    let mut hasher = Sha256::new();
    hasher.update(b"dexmatch:liquidation_order:v1:");
    hasher.update(market_id.as_bytes());
    hasher.update(subaccount_id.0);
    hasher.update(height.to_le_bytes());
    OrderHash(hasher.finalize().into())
}
