//! Error types for the dexmatch exchange core.
//!
//! All errors use the `EX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order / decoding errors
//! - 2xx: Deposit and bank errors
//! - 5xx: Matching errors
//! - 6xx: Settlement errors
//! - 9xx: Arithmetic, configuration and internal errors
//!
//! A missing market is deliberately **not** an error: the builder returns
//! `Ok(None)` because a market can be delisted earlier in the same block.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{MarketId, OrderHash, SubaccountId};

/// Central error enum for all exchange-core operations.
#[derive(Debug, Error)]
pub enum ExchangeError {
    // =================================================================
    // Order / decoding errors (1xx)
    // =================================================================
    /// A subaccount id could not be decoded.
    #[error("EX_ERR_100: Malformed subaccount id {input:?}: {reason}")]
    MalformedSubaccountId { input: String, reason: String },

    /// A 32-byte hash (market id, order hash) could not be decoded.
    #[error("EX_ERR_101: Malformed hash {input:?}: {reason}")]
    MalformedHash { input: String, reason: String },

    /// The order failed validation.
    #[error("EX_ERR_102: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The staging area for this market side is full.
    #[error("EX_ERR_103: Staging full for market {market_id} (is_buy={is_buy})")]
    StagingFull { market_id: MarketId, is_buy: bool },

    // =================================================================
    // Deposit / bank errors (2xx)
    // =================================================================
    /// The bank module could not cover a deposit shortfall.
    #[error(
        "EX_ERR_200: Insufficient bank balance for {subaccount_id} in {denom}: need {needed}, have {available}"
    )]
    InsufficientBankBalance {
        subaccount_id: SubaccountId,
        denom: String,
        needed: Decimal,
        available: Decimal,
    },

    /// The bank module refuses transfers involving this address.
    #[error("EX_ERR_201: Blocked address for subaccount {0}")]
    BlockedAddress(SubaccountId),

    /// A deposit would go negative outside of liquidation settlement.
    #[error("EX_ERR_202: Insufficient deposit for {subaccount_id} in {denom}")]
    InsufficientDeposit { subaccount_id: SubaccountId, denom: String },

    // =================================================================
    // Matching errors (5xx)
    // =================================================================
    /// A fill larger than the peeked level was requested. Only reachable
    /// through a defect in the execution builder.
    #[error("EX_ERR_500: Orderbook fill invalid: requested {requested}, fillable {fillable}")]
    OrderbookFillInvalid { requested: Decimal, fillable: Decimal },

    /// The position is not below its maintenance margin at the mark price.
    #[error("EX_ERR_501: Position of {subaccount_id} in {market_id} is not liquidatable")]
    PositionNotLiquidatable {
        market_id: MarketId,
        subaccount_id: SubaccountId,
    },

    /// Two executions of the same input diverged.
    #[error("EX_ERR_502: Determinism violation: expected {expected}, got {actual}")]
    DeterminismViolation { expected: String, actual: String },

    /// No mark price is available where one is required.
    #[error("EX_ERR_503: Mark price unavailable for market {0}")]
    MarkPriceUnavailable(MarketId),

    // =================================================================
    // Settlement errors (6xx)
    // =================================================================
    /// This market's batch for this block has already been applied.
    #[error("EX_ERR_600: Batch already settled: market {market_id} at height {height}")]
    BatchAlreadySettled { market_id: MarketId, height: u64 },

    /// A filled/cancelled delta references an order not in the book.
    #[error("EX_ERR_601: Unknown resting order {0}")]
    UnknownRestingOrder(OrderHash),

    // =================================================================
    // Arithmetic / configuration / internal (9xx)
    // =================================================================
    /// Checked decimal arithmetic overflowed.
    #[error("EX_ERR_900: Arithmetic overflow in {op}")]
    ArithmeticOverflow { op: String },

    /// Division by zero in the decimal layer.
    #[error("EX_ERR_901: Division by zero in {op}")]
    DivisionByZero { op: String },

    /// Configuration error (invalid params, bad tiers, etc.).
    #[error("EX_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("EX_ERR_903: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("EX_ERR_999: Internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Errors that can only come from a defect in this core. They must halt
    /// the block instead of failing a single transaction.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::OrderbookFillInvalid { .. }
                | Self::DeterminismViolation { .. }
                | Self::ArithmeticOverflow { .. }
                | Self::DivisionByZero { .. }
                | Self::Internal(_)
        )
    }

    /// Errors raised while decoding input. The offending item is skipped and
    /// the rest of the batch continues.
    #[must_use]
    pub fn is_recoverable_decode(&self) -> bool {
        matches!(
            self,
            Self::MalformedSubaccountId { .. } | Self::MalformedHash { .. } | Self::Serialization(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ExchangeError>;

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
