//! # dexmatch-settlement
//!
//! **Settlement stage**: applies each market's batch execution to exchange
//! state exactly once, in canonical order.
//!
//! ## Architecture
//!
//! The settlement stage receives [`BatchExecutionData`](dexmatch_types::BatchExecutionData)
//! from MatchCore and:
//! 1. Guards against double-settlement per (block height, market)
//! 2. Merges the VWAP sample into the mark-price tracker
//! 3. Applies deposit deltas (bank-charging, except for liquidations)
//! 4. Updates resting orders, positions and emits events in a fixed order
//! 5. Accumulates trading reward points and fee auction rewards
//!
//! [`BlockProcessor`] wires staging, matching and settlement into the
//! end-of-block pipeline; [`InMemoryExchange`] is a complete in-memory
//! state backend.

pub mod block;
pub mod idempotency;
pub mod logging;
pub mod memory_store;
pub mod persist;
pub mod position_cache;
pub mod vwap;

pub use block::{BlockOutcome, BlockProcessor};
pub use idempotency::{IdempotencyGuard, SettlementKey};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use memory_store::InMemoryExchange;
pub use persist::{BatchSettler, SettledBlockState};
pub use position_cache::ModifiedPositionCache;
pub use vwap::DerivativeVwapInfo;
