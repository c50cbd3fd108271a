//! # dexmatch-ingress
//!
//! Everything that happens to orders and fee inputs before matching.
//!
//! 1. **TransientOrderStore**: market orders staged during the block, per
//!    market and direction, handed out in price priority at end-of-block
//! 2. **Fee discount provider**: resolves per-subaccount fee rates from the
//!    discount schedule and a per-block staking snapshot
//!
//! ## Order Flow
//!
//! ```text
//! tx → TransientOrderStore.stage_*() → (end of block) derivative_orders()
//!    → matchcore execution builder → settlement
//! ```

pub mod fee_discount;
pub mod transient_store;

pub use fee_discount::{effective_fee_rates, FeeDiscountConfig, FeeRates, StakingSnapshotBuilder};
pub use transient_store::{RawDerivativeMarketOrder, StageRejection, TransientOrderStore};
