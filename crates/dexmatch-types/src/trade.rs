//! Per-order trade records carried inside execution events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderHash, PositionDelta, SubaccountId};

/// The record of one order's participation in a batch execution.
///
/// A market order that walked several resting orders produces one log per
/// fill; a resting order produces one log per fill it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeTradeLog {
    pub subaccount_id: SubaccountId,
    pub position_delta: PositionDelta,
    /// Released margin plus realised PnL, credited to the deposit.
    pub payout: Decimal,
    /// Fee charged (negative for a maker rebate).
    pub fee: Decimal,
    /// Realised PnL of the closed part, if any.
    pub pnl: Decimal,
    pub order_hash: OrderHash,
    pub fee_recipient: Option<SubaccountId>,
    pub cid: String,
}

impl DerivativeTradeLog {
    /// `|quantity| * price` of the fill.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.position_delta.quantity.abs() * self.position_delta.execution_price
    }
}

impl std::fmt::Display for DerivativeTradeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TradeLog[{}] {} {} @ {} fee={} payout={}",
            self.order_hash,
            self.subaccount_id,
            self.position_delta.quantity,
            self.position_delta.execution_price,
            self.fee,
            self.payout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> DerivativeTradeLog {
        DerivativeTradeLog {
            subaccount_id: SubaccountId::from_byte(1),
            position_delta: PositionDelta {
                quantity: Decimal::new(-2, 0),
                margin: Decimal::new(20, 0),
                execution_price: Decimal::new(50000, 0),
            },
            payout: Decimal::ZERO,
            fee: Decimal::new(100, 0),
            pnl: Decimal::ZERO,
            order_hash: OrderHash::from_byte(2),
            fee_recipient: None,
            cid: "c".to_string(),
        }
    }

    #[test]
    fn notional_uses_absolute_quantity() {
        assert_eq!(make_log().notional(), Decimal::new(100_000, 0));
    }

    #[test]
    fn display_contains_price() {
        let s = format!("{}", make_log());
        assert!(s.contains("50000"));
    }
}
