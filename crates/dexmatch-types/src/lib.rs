//! # dexmatch-types
//!
//! Shared types, errors, and configuration for the **dexmatch** batch
//! matching and settlement core.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Decimal layer**: [`DecimalExt`], [`decimal::PRECISION`], [`parse_decimal`]
//! - **Identifiers**: [`MarketId`], [`SubaccountId`], [`OrderHash`], [`Denom`]
//! - **Order model**: [`Order`], [`SpotMarketOrder`], [`DerivativeMarketOrder`], [`DerivativeLimitOrder`], [`PriceLevel`], [`MatchableOrder`]
//! - **Markets**: [`DerivativeMarket`], [`MarketType`], [`PerpetualMarketFunding`]
//! - **Positions and balances**: [`Position`], [`PositionDelta`], [`Deposit`], [`DepositDelta`]
//! - **Execution output**: [`BatchExecutionData`], [`DerivativeLimitOrderDelta`], [`VwapData`], [`DerivativeTradeLog`]
//! - **Events**: [`ExchangeEvent`], [`EventBatchDerivativeExecution`], [`EventCancelDerivativeOrder`]
//! - **Rewards and fee discounts**: [`TradingRewardPoints`], [`merge_trading_reward_points`], [`FeeDiscountSchedule`], [`FeeDiscountStakingInfo`]
//! - **State access**: [`ExchangeReader`], [`ExchangeWriter`], [`BlockInfo`]
//! - **Configuration**: [`ExchangeParams`]
//! - **Errors**: [`ExchangeError`] with `EX_ERR_` prefix codes

pub mod balance;
pub mod config;
pub mod constants;
pub mod decimal;
pub mod error;
pub mod events;
pub mod execution;
pub mod fee_discount;
pub mod ids;
pub mod keeper;
pub mod market;
pub mod order;
pub mod position;
pub mod rewards;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use dexmatch_types::{DerivativeMarketOrder, Position, BatchExecutionData, ...};

pub use balance::*;
pub use config::*;
pub use decimal::{parse_decimal, weighted_average, DecimalExt};
pub use error::*;
pub use events::*;
pub use execution::*;
pub use fee_discount::*;
pub use ids::*;
pub use keeper::*;
pub use market::*;
pub use order::*;
pub use position::*;
pub use rewards::*;
pub use trade::*;

// Constants are accessed via `dexmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
