//! Subaccount deposits and deposit deltas.
//!
//! Every subaccount has a `total_balance` (everything it owns in the
//! exchange) and an `available_balance` (what is not reserved by open
//! orders). Placement moves funds out of `available`; execution moves
//! them out of `total`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DecimalExt, Result};

/// A subaccount's balance for one denom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Deposit {
    pub available_balance: Decimal,
    pub total_balance: Decimal,
}

impl Deposit {
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self {
            available_balance: amount,
            total_balance: amount,
        }
    }

    /// Funds reserved by open orders.
    #[must_use]
    pub fn reserved(&self) -> Decimal {
        self.total_balance - self.available_balance
    }

    /// Apply `delta`. On overflow the deposit is left unchanged.
    pub fn apply(&mut self, delta: &DepositDelta) -> Result<()> {
        let available_balance = self.available_balance.add_checked(delta.available_balance_delta)?;
        self.total_balance = self.total_balance.add_checked(delta.total_balance_delta)?;
        self.available_balance = available_balance;
        Ok(())
    }
}

/// Change to a [`Deposit`] produced by one batch execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DepositDelta {
    pub available_balance_delta: Decimal,
    pub total_balance_delta: Decimal,
}

impl DepositDelta {
    #[must_use]
    pub fn new(available_balance_delta: Decimal, total_balance_delta: Decimal) -> Self {
        Self {
            available_balance_delta,
            total_balance_delta,
        }
    }

    /// Credit to both balances (payouts, relayer rewards).
    #[must_use]
    pub fn credit(amount: Decimal) -> Self {
        Self::new(amount, amount)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available_balance_delta.is_zero() && self.total_balance_delta.is_zero()
    }
}

impl DepositDelta {
    /// Sum of two deltas for the same subaccount.
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        Ok(Self::new(
            self.available_balance_delta.add_checked(rhs.available_balance_delta)?,
            self.total_balance_delta.add_checked(rhs.total_balance_delta)?,
        ))
    }
}
