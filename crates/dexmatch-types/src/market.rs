//! Market descriptors and perpetual funding state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Denom, MarketId};

/// Kind of market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Perpetual,
    Expiry,
    BinaryOption,
}

impl MarketType {
    /// Stable byte tag used when hashing executions.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Spot => 0,
            Self::Perpetual => 1,
            Self::Expiry => 2,
            Self::BinaryOption => 3,
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "SPOT"),
            Self::Perpetual => write!(f, "PERPETUAL"),
            Self::Expiry => write!(f, "EXPIRY"),
            Self::BinaryOption => write!(f, "BINARY_OPTION"),
        }
    }
}

/// A derivative (perpetual / expiry) or binary-options market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeMarket {
    pub market_id: MarketId,
    pub ticker: String,
    pub quote_denom: Denom,
    pub market_type: MarketType,
    /// Negative values are maker rebates.
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    /// Share of each fee paid to the order's fee recipient.
    pub relayer_fee_share_rate: Decimal,
    pub initial_margin_ratio: Decimal,
    pub maintenance_margin_ratio: Decimal,
}

impl DerivativeMarket {
    #[must_use]
    pub fn is_perpetual(&self) -> bool {
        self.market_type == MarketType::Perpetual
    }

    #[must_use]
    pub fn is_binary_option(&self) -> bool {
        self.market_type == MarketType::BinaryOption
    }

    /// Binary options settle differently: an absent or zero mark price is
    /// still a valid mark for them.
    #[must_use]
    pub fn has_valid_mark_price(&self, mark_price: Option<Decimal>) -> bool {
        self.is_binary_option()
            || mark_price.is_some_and(|p| p.is_sign_positive() && !p.is_zero())
    }
}

/// Cumulative funding state of a perpetual market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpetualMarketFunding {
    /// Funding owed per unit of long exposure since genesis.
    pub cumulative_funding: Decimal,
    pub cumulative_price: Decimal,
    /// Unix seconds of the last funding update.
    pub last_timestamp: i64,
}

impl PerpetualMarketFunding {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            cumulative_funding: Decimal::ZERO,
            cumulative_price: Decimal::ZERO,
            last_timestamp: 0,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl DerivativeMarket {
    /// Perpetual market with 5% initial / 2.5% maintenance margin,
    /// 0.1% taker, 0.05% maker, 40% relayer share.
    pub fn dummy_perpetual(market_id: MarketId) -> Self {
        Self {
            market_id,
            ticker: "BTC/USDT PERP".to_string(),
            quote_denom: "usdt".to_string(),
            market_type: MarketType::Perpetual,
            maker_fee_rate: Decimal::new(5, 4),
            taker_fee_rate: Decimal::new(1, 3),
            relayer_fee_share_rate: Decimal::new(4, 1),
            initial_margin_ratio: Decimal::new(5, 2),
            maintenance_margin_ratio: Decimal::new(25, 3),
        }
    }

    /// Same as [`Self::dummy_perpetual`] but with zero fees, which keeps
    /// hand-computed balance expectations readable.
    pub fn dummy_feeless(market_id: MarketId) -> Self {
        Self {
            maker_fee_rate: Decimal::ZERO,
            taker_fee_rate: Decimal::ZERO,
            ..Self::dummy_perpetual(market_id)
        }
    }

    pub fn dummy_binary_option(market_id: MarketId) -> Self {
        Self {
            ticker: "WILL-IT-RAIN".to_string(),
            market_type: MarketType::BinaryOption,
            initial_margin_ratio: Decimal::ONE,
            maintenance_margin_ratio: Decimal::ONE,
            ..Self::dummy_perpetual(market_id)
        }
    }
}
