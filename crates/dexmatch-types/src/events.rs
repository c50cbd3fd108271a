//! Typed events emitted by the settlement stage.
//!
//! Event order is part of consensus: the settlement stage emits them in a
//! fixed sequence, so every field here must be deterministic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DerivativeTradeLog, MarketId, OrderHash, SubaccountId};

/// How the orders inside an execution event were executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionType {
    /// Incoming market orders (takers).
    Market,
    /// Resting limit orders filled by incoming market orders (makers).
    LimitMatchRestingOrder,
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::LimitMatchRestingOrder => write!(f, "LIMIT_MATCH_RESTING_ORDER"),
        }
    }
}

/// All fills of one direction of one execution type in one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatchDerivativeExecution {
    pub market_id: MarketId,
    pub is_buy: bool,
    pub is_liquidation: bool,
    /// Market cumulative funding used for the touched positions.
    pub cumulative_funding: Option<Decimal>,
    pub execution_type: ExecutionType,
    pub trades: Vec<DerivativeTradeLog>,
}

/// Why an order was cancelled during matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    /// Margin below the initial or mark-price margin requirement.
    InsufficientMargin,
    /// Reduce-only order without an opposing position to reduce.
    NoPositionToReduce,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientMargin => write!(f, "INSUFFICIENT_MARGIN"),
            Self::NoPositionToReduce => write!(f, "NO_POSITION_TO_REDUCE"),
        }
    }
}

/// An order cancelled because matching discovered it could not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCancelDerivativeOrder {
    pub market_id: MarketId,
    pub is_limit_cancel: bool,
    pub order_hash: OrderHash,
    pub subaccount_id: SubaccountId,
    pub cid: String,
    pub reason: CancelReason,
}

/// Every event the core can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeEvent {
    BatchDerivativeExecution(EventBatchDerivativeExecution),
    CancelDerivativeOrder(EventCancelDerivativeOrder),
}

impl ExchangeEvent {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchDerivativeExecution(e) => match (e.execution_type, e.is_buy) {
                (ExecutionType::Market, true) => "market_buy_execution",
                (ExecutionType::Market, false) => "market_sell_execution",
                (ExecutionType::LimitMatchRestingOrder, true) => "resting_buy_execution",
                (ExecutionType::LimitMatchRestingOrder, false) => "resting_sell_execution",
            },
            Self::CancelDerivativeOrder(e) if e.is_limit_cancel => "cancel_limit_order",
            Self::CancelDerivativeOrder(_) => "cancel_market_order",
        }
    }
}

impl From<EventBatchDerivativeExecution> for ExchangeEvent {
    fn from(e: EventBatchDerivativeExecution) -> Self {
        Self::BatchDerivativeExecution(e)
    }
}

impl From<EventCancelDerivativeOrder> for ExchangeEvent {
    fn from(e: EventCancelDerivativeOrder) -> Self {
        Self::CancelDerivativeOrder(e)
    }
}
