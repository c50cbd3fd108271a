//! Positions and position deltas.
//!
//! A [`Position`] is owned by the settlement stage: the matcher only ever
//! works on copies inside its per-block scratch state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketId, SubaccountId};

/// One subaccount's position in one derivative market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub subaccount_id: SubaccountId,
    pub market_id: MarketId,
    /// Signed size: positive is long, negative is short.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub margin: Decimal,
    /// Market cumulative funding at the last time funding was settled.
    pub cumulative_funding_entry: Decimal,
}

impl Position {
    /// A flat position, funding-synced to `cumulative_funding`.
    #[must_use]
    pub fn empty(
        market_id: MarketId,
        subaccount_id: SubaccountId,
        cumulative_funding: Decimal,
    ) -> Self {
        Self {
            subaccount_id,
            market_id,
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            margin: Decimal::ZERO,
            cumulative_funding_entry: cumulative_funding,
        }
    }

    #[must_use]
    pub fn is_long(&self) -> bool {
        self.quantity.is_sign_positive() && !self.quantity.is_zero()
    }

    #[must_use]
    pub fn is_short(&self) -> bool {
        self.quantity.is_sign_negative() && !self.quantity.is_zero()
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Absolute size.
    #[must_use]
    pub fn size(&self) -> Decimal {
        self.quantity.abs()
    }

    /// `+1` for long, `-1` for short, `0` when flat.
    #[must_use]
    pub fn direction(&self) -> Decimal {
        if self.is_long() {
            Decimal::ONE
        } else if self.is_short() {
            Decimal::NEGATIVE_ONE
        } else {
            Decimal::ZERO
        }
    }
}

/// Change applied to a position by one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDelta {
    /// Signed quantity: positive buys, negative sells.
    pub quantity: Decimal,
    /// Margin the order brings for this quantity.
    pub margin: Decimal,
    pub execution_price: Decimal,
}

impl PositionDelta {
    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.quantity.is_sign_positive()
    }
}
