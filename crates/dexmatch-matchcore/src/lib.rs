//! # dexmatch-matchcore
//!
//! **Pure deterministic matching for the dexmatch exchange core.**
//!
//! MatchCore is the compute plane: it takes a block's staged market orders
//! and the resting limit orders of a market and produces a
//! [`BatchExecutionData`](dexmatch_types::BatchExecutionData). It has:
//!
//! - **Zero side effects**: reads through `ExchangeReader`, never writes
//! - **Deterministic output**: same input -> byte-identical digest on every validator
//! - **No floats**: all arithmetic goes through the truncating decimal layer
//! - **Market isolation**: each market is matched independently

pub mod determinism;
pub mod execution;
pub mod margin;
pub mod market_orderbook;
pub mod orderbook;
pub mod position_states;
pub mod price_level;

pub use determinism::{
    compute_block_digest, compute_execution_digest, liquidation_order_hash, verify_execution_digest,
};
pub use execution::{
    derivative_market_order_execution_data, execute_derivative_market_order_matching,
    execute_liquidation, MatchingInput,
};
pub use margin::PositionUpdate;
pub use market_orderbook::{DerivativeMarketOrderbook, MarketOrderbook, SpotMarketOrderbook};
pub use orderbook::RestingOrderbook;
pub use position_states::PositionStates;
pub use price_level::RestingLevel;
