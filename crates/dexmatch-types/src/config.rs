//! Exchange module parameters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, ExchangeError, FeeDiscountSchedule, Result};

/// Module-wide parameters, usually loaded from genesis JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeParams {
    pub default_taker_fee_rate: Decimal,
    /// Negative values are maker rebates.
    pub default_maker_fee_rate: Decimal,
    pub relayer_fee_share_rate: Decimal,
    /// Cap on staged market orders per market per direction.
    pub max_orders_per_side: usize,
    /// Capacity of the exactly-once settlement guard.
    pub idempotency_cache_size: usize,
    pub fee_discount_schedule: Option<FeeDiscountSchedule>,
}

impl Default for ExchangeParams {
    fn default() -> Self {
        Self {
            default_taker_fee_rate: constants::DEFAULT_TAKER_FEE_RATE,
            default_maker_fee_rate: constants::DEFAULT_MAKER_FEE_RATE,
            relayer_fee_share_rate: constants::DEFAULT_RELAYER_FEE_SHARE_RATE,
            max_orders_per_side: constants::DEFAULT_MAX_ORDERS_PER_SIDE,
            idempotency_cache_size: constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE,
            fee_discount_schedule: None,
        }
    }
}

impl ExchangeParams {
    /// Parse and validate params from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Check rates and the discount schedule.
    ///
    /// The maker rate may be negative, but a rebate can never exceed what
    /// the taker pays net of the relayer share, or the exchange would mint
    /// funds.
    pub fn validate(&self) -> Result<()> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&self.default_taker_fee_rate) {
            return Err(ExchangeError::Configuration(format!(
                "taker fee rate {} outside [0, 1]",
                self.default_taker_fee_rate
            )));
        }
        if !unit.contains(&self.relayer_fee_share_rate) {
            return Err(ExchangeError::Configuration(format!(
                "relayer fee share rate {} outside [0, 1]",
                self.relayer_fee_share_rate
            )));
        }
        if self.default_maker_fee_rate > Decimal::ONE {
            return Err(ExchangeError::Configuration(format!(
                "maker fee rate {} above 1",
                self.default_maker_fee_rate
            )));
        }
        if self.default_maker_fee_rate.is_sign_negative() {
            let max_rebate =
                self.default_taker_fee_rate * (Decimal::ONE - self.relayer_fee_share_rate);
            if -self.default_maker_fee_rate > max_rebate {
                return Err(ExchangeError::Configuration(format!(
                    "maker rebate {} exceeds taker fee net of relayer share {max_rebate}",
                    -self.default_maker_fee_rate
                )));
            }
        }
        if self.max_orders_per_side == 0 {
            return Err(ExchangeError::Configuration(
                "max_orders_per_side must be positive".into(),
            ));
        }
        if self.idempotency_cache_size == 0 {
            return Err(ExchangeError::Configuration(
                "idempotency_cache_size must be positive".into(),
            ));
        }
        if let Some(schedule) = &self.fee_discount_schedule {
            validate_schedule(schedule)?;
        }
        Ok(())
    }
}

fn validate_schedule(schedule: &FeeDiscountSchedule) -> Result<()> {
    let unit = Decimal::ZERO..=Decimal::ONE;
    for (i, tier) in schedule.tier_infos.iter().enumerate() {
        if !unit.contains(&tier.maker_discount_rate) || !unit.contains(&tier.taker_discount_rate) {
            return Err(ExchangeError::Configuration(format!(
                "tier {i}: discount rates must be in [0, 1]"
            )));
        }
    }
    for (i, pair) in schedule.tier_infos.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.staked_amount <= prev.staked_amount || next.volume < prev.volume {
            return Err(ExchangeError::Configuration(format!(
                "tier {}: thresholds must increase over tier {i}",
                i + 1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeeDiscountTierInfo;

    fn tier(staked: i64, volume: i64, discount: Decimal) -> FeeDiscountTierInfo {
        FeeDiscountTierInfo {
            maker_discount_rate: discount,
            taker_discount_rate: discount,
            staked_amount: Decimal::new(staked, 0),
            volume: Decimal::new(volume, 0),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let params = ExchangeParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.max_orders_per_side, 10_000);
    }

    #[test]
    fn from_json_fills_defaults() {
        let params = ExchangeParams::from_json(r#"{"default_taker_fee_rate":"0.002"}"#).unwrap();
        assert_eq!(params.default_taker_fee_rate, Decimal::new(2, 3));
        assert_eq!(params.default_maker_fee_rate, constants::DEFAULT_MAKER_FEE_RATE);
    }

    #[test]
    fn rejects_out_of_range_taker_rate() {
        let err = ExchangeParams::from_json(r#"{"default_taker_fee_rate":"1.5"}"#).unwrap_err();
        assert!(matches!(err, ExchangeError::Configuration(_)));
    }

    #[test]
    fn rejects_excessive_rebate() {
        let params = ExchangeParams {
            default_maker_fee_rate: Decimal::new(-1, 2),
            ..ExchangeParams::default()
        };
        assert!(params.validate().is_err());

        let params = ExchangeParams {
            default_maker_fee_rate: Decimal::new(-1, 4),
            ..ExchangeParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn tiers_must_increase() {
        let mut params = ExchangeParams {
            fee_discount_schedule: Some(FeeDiscountSchedule {
                tier_infos: vec![
                    tier(100, 0, Decimal::new(1, 1)),
                    tier(1000, 10, Decimal::new(2, 1)),
                ],
                quote_denoms: vec!["usdt".into()],
                disqualified_market_ids: vec![],
            }),
            ..ExchangeParams::default()
        };
        assert!(params.validate().is_ok());

        if let Some(s) = params.fee_discount_schedule.as_mut() {
            s.tier_infos.push(tier(500, 20, Decimal::new(3, 1)));
        }
        assert!(params.validate().is_err());
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let err = ExchangeParams::from_json("{not json").unwrap_err();
        assert!(matches!(err, ExchangeError::Serialization(_)));
    }
}
