//! System-wide constants for the dexmatch exchange core.

use rust_decimal::Decimal;

/// Fractional digits kept by the decimal layer (see [`crate::decimal::PRECISION`]).
pub const DECIMAL_PRECISION: u32 = crate::decimal::PRECISION;

/// Maximum staged market orders per market per direction in one block.
pub const DEFAULT_MAX_ORDERS_PER_SIDE: usize = 10_000;

/// How many `(height, market)` settlements the exactly-once guard remembers.
pub const DEFAULT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Share of a trading fee paid to the order's fee recipient (40%).
pub const DEFAULT_RELAYER_FEE_SHARE_RATE: Decimal = Decimal::from_parts(4, 0, 0, false, 1);

/// Default taker fee rate (0.1%).
pub const DEFAULT_TAKER_FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Default maker fee rate (0.05%).
pub const DEFAULT_MAKER_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 4);

/// Domain separator for batch execution digests.
pub const BATCH_DIGEST_DOMAIN: &[u8] = b"dexmatch:batch_execution:v1:";

/// Domain separator for whole-block execution digests.
pub const BLOCK_DIGEST_DOMAIN: &[u8] = b"dexmatch:block_execution:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "dexmatch";
