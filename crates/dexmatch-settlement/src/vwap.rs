//! Per-block VWAP tracker feeding the mark-price oracle.

use std::collections::BTreeMap;

use dexmatch_types::{weighted_average, DecimalExt, MarketId, Result, VwapData};

/// Volume-weighted price samples accumulated per market during a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivativeVwapInfo {
    markets: BTreeMap<MarketId, VwapData>,
}

impl DerivativeVwapInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one batch sample into the market's running VWAP. Zero samples
    /// are ignored.
    pub fn apply_vwap(&mut self, market_id: MarketId, sample: &VwapData) -> Result<()> {
        if let Some(merged) = self.merged(&market_id, sample)? {
            self.markets.insert(market_id, merged);
        }
        Ok(())
    }

    /// The market's VWAP once `sample` is merged in, without storing it.
    /// `None` for zero samples.
    pub fn merged(&self, market_id: &MarketId, sample: &VwapData) -> Result<Option<VwapData>> {
        if sample.is_zero() {
            return Ok(None);
        }
        let Some(current) = self.markets.get(market_id) else {
            return Ok(Some(*sample));
        };
        Ok(Some(VwapData {
            price: weighted_average(current.price, current.quantity, sample.price, sample.quantity)?,
            quantity: current.quantity.add_checked(sample.quantity)?,
            market_type: current.market_type,
        }))
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId) -> Option<&VwapData> {
        self.markets.get(market_id)
    }

    /// Markets in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&MarketId, &VwapData)> {
        self.markets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
