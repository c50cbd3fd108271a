//! Derivative position math: funding, PnL, margin requirements,
//! liquidation and the effect of a fill on a position.
//!
//! Every function is pure over its arguments and truncates derived values
//! through the decimal layer.

use dexmatch_types::{
    weighted_average, DecimalExt, DerivativeMarket, PerpetualMarketFunding, Position,
    PositionDelta, Result,
};
use rust_decimal::Decimal;

/// What applying one fill did to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionUpdate {
    /// Released margin plus realised PnL, owed to the trader. Negative when
    /// the loss exceeds the released margin.
    pub payout: Decimal,
    pub pnl: Decimal,
    /// Quantity that reduced an existing opposite position.
    pub closing_quantity: Decimal,
    /// Quantity that opened or increased the position.
    pub opening_quantity: Decimal,
    /// Part of the fill's margin now locked in the position.
    pub margin_used: Decimal,
}

/// Funding owed by `position` since its last settlement. Positive means
/// the position pays.
pub fn funding_payment(position: &Position, cumulative_funding: Decimal) -> Result<Decimal> {
    position
        .quantity
        .mul_trunc(cumulative_funding.sub_checked(position.cumulative_funding_entry)?)
}

/// Settle pending funding into the position's margin and move its funding
/// entry to the market's current value. Returns the payment made.
pub fn apply_funding(position: &mut Position, funding: Option<&PerpetualMarketFunding>) -> Result<Decimal> {
    let Some(funding) = funding else {
        return Ok(Decimal::ZERO);
    };
    let payment = funding_payment(position, funding.cumulative_funding)?;
    position.margin = position.margin.sub_checked(payment)?;
    position.cumulative_funding_entry = funding.cumulative_funding;
    Ok(payment)
}

/// `quantity * (mark - entry)`, signed by direction through `quantity`.
pub fn unrealized_pnl(position: &Position, mark_price: Decimal) -> Result<Decimal> {
    position
        .quantity
        .mul_trunc(mark_price.sub_checked(position.entry_price)?)
}

/// Margin plus unrealized PnL, net of funding not yet settled.
pub fn effective_margin(
    position: &Position,
    mark_price: Decimal,
    funding: Option<&PerpetualMarketFunding>,
) -> Result<Decimal> {
    let pending = match funding {
        Some(f) => funding_payment(position, f.cumulative_funding)?,
        None => Decimal::ZERO,
    };
    position
        .margin
        .add_checked(unrealized_pnl(position, mark_price)?)?
        .sub_checked(pending)
}

/// `size * mark * maintenance_margin_ratio`.
pub fn maintenance_margin_requirement(
    position: &Position,
    mark_price: Decimal,
    maintenance_margin_ratio: Decimal,
) -> Result<Decimal> {
    position
        .size()
        .mul_trunc(mark_price)?
        .mul_trunc(maintenance_margin_ratio)
}

/// Whether the position's effective margin has fallen below maintenance.
pub fn is_liquidatable(
    position: &Position,
    mark_price: Decimal,
    maintenance_margin_ratio: Decimal,
    funding: Option<&PerpetualMarketFunding>,
) -> Result<bool> {
    if position.is_flat() {
        return Ok(false);
    }
    Ok(effective_margin(position, mark_price, funding)?
        < maintenance_margin_requirement(position, mark_price, maintenance_margin_ratio)?)
}

/// Price at which the position's margin is exactly consumed. Never below
/// zero.
pub fn bankruptcy_price(position: &Position) -> Result<Decimal> {
    if position.is_flat() {
        return Ok(position.entry_price);
    }
    let per_unit = position.margin.quo_trunc(position.size())?;
    let price = if position.is_long() {
        position.entry_price.sub_checked(per_unit)?
    } else {
        position.entry_price.add_checked(per_unit)?
    };
    Ok(price.max(Decimal::ZERO))
}

/// `price * quantity * initial_margin_ratio`.
pub fn initial_margin_requirement(
    price: Decimal,
    quantity: Decimal,
    initial_margin_ratio: Decimal,
) -> Result<Decimal> {
    price.mul_trunc(quantity)?.mul_trunc(initial_margin_ratio)
}

/// Whether `margin` is enough to open `quantity` at worst price `price`.
///
/// Checks the initial margin against the order price and, when a mark
/// price is known, against the mark:
/// buys need `qty * (imr * mark - (mark - price))`, sells need
/// `qty * (imr * mark - (price - mark))`. Binary options are fully
/// collateralised at placement and always pass.
pub fn has_sufficient_order_margin(
    market: &DerivativeMarket,
    is_buy: bool,
    price: Decimal,
    quantity: Decimal,
    margin: Decimal,
    mark_price: Option<Decimal>,
) -> Result<bool> {
    if market.is_binary_option() {
        return Ok(true);
    }
    let imr = market.initial_margin_ratio;
    if margin < initial_margin_requirement(price, quantity, imr)? {
        return Ok(false);
    }
    let Some(mark) = mark_price else {
        return Ok(true);
    };
    let mark_gap = if is_buy {
        mark.sub_checked(price)?
    } else {
        price.sub_checked(mark)?
    };
    let required = quantity.mul_trunc(imr.mul_trunc(mark)?.sub_checked(mark_gap)?)?;
    Ok(margin >= required)
}

/// Apply one fill to `position`.
///
/// An opposite-direction fill first closes (realising PnL and releasing
/// margin pro rata); whatever is left opens a new position at the fill
/// price with the matching share of `delta.margin`.
pub fn apply_delta(position: &mut Position, delta: &PositionDelta) -> Result<PositionUpdate> {
    let fill_size = delta.quantity.abs();
    if fill_size.is_zero() {
        return Ok(PositionUpdate::default());
    }
    let same_direction = position.is_flat() || (position.is_long() == delta.is_buy());

    let mut update = PositionUpdate::default();
    if !same_direction {
        let size = position.size();
        let closing = fill_size.min(size);
        let pnl = closing
            .mul_trunc(delta.execution_price.sub_checked(position.entry_price)?)?
            .mul_trunc(position.direction())?;
        let released = if closing == size {
            position.margin
        } else {
            position.margin.mul_trunc(closing)?.quo_trunc(size)?
        };

        position.margin = position.margin.sub_checked(released)?;
        position.quantity = if delta.is_buy() {
            position.quantity.add_checked(closing)?
        } else {
            position.quantity.sub_checked(closing)?
        };
        if position.is_flat() {
            position.entry_price = Decimal::ZERO;
            position.margin = Decimal::ZERO;
        }

        update.closing_quantity = closing;
        update.pnl = pnl;
        update.payout = released.add_checked(pnl)?;
    }

    let opening = fill_size.sub_checked(update.closing_quantity)?;
    if opening.is_positive_strict() {
        let margin_used = if opening == fill_size {
            delta.margin
        } else {
            delta.margin.mul_trunc(opening)?.quo_trunc(fill_size)?
        };
        let size = position.size();
        position.entry_price = weighted_average(position.entry_price, size, delta.execution_price, opening)?;
        position.margin = position.margin.add_checked(margin_used)?;
        position.quantity = if delta.is_buy() {
            position.quantity.add_checked(opening)?
        } else {
            position.quantity.sub_checked(opening)?
        };

        update.opening_quantity = opening;
        update.margin_used = margin_used;
    }
    Ok(update)
}
