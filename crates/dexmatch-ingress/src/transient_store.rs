//! Transient staging of market orders for the current block.
//!
//! Market orders accepted during a block are kept here, per market and
//! direction, until end-of-block matching. Nothing in this store survives
//! the block: [`TransientOrderStore::clear`] is called once settlement is
//! done.

use std::collections::BTreeMap;

use dexmatch_types::{
    constants, parse_decimal, DecimalExt, DerivativeMarketOrder, ExchangeError, MarketId,
    MatchableOrder, Order, OrderHash, Result, SpotMarketOrder, SubaccountId,
};
use rust_decimal::Decimal;
use serde::Deserialize;

type SideKey = (MarketId, bool);

/// Market orders staged during the current block.
#[derive(Debug, Clone)]
pub struct TransientOrderStore {
    derivative: BTreeMap<SideKey, Vec<DerivativeMarketOrder>>,
    spot: BTreeMap<SideKey, Vec<SpotMarketOrder>>,
    max_orders_per_side: usize,
}

impl TransientOrderStore {
    /// Create an empty store with the default per-side limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(constants::DEFAULT_MAX_ORDERS_PER_SIDE)
    }

    /// Create a store that holds at most `max_orders_per_side` orders per
    /// market per direction.
    #[must_use]
    pub fn with_capacity(max_orders_per_side: usize) -> Self {
        Self {
            derivative: BTreeMap::new(),
            spot: BTreeMap::new(),
            max_orders_per_side,
        }
    }

    /// Stage a derivative market order.
    ///
    /// # Errors
    /// - `InvalidOrder` for a non-positive price or quantity, or negative margin
    /// - `StagingFull` if this market side is at capacity
    pub fn stage_derivative(&mut self, order: DerivativeMarketOrder) -> Result<()> {
        validate_order(&order.order)?;
        if order.margin.is_sign_negative() || order.fee_hold.is_sign_negative() {
            return Err(ExchangeError::InvalidOrder {
                reason: format!("negative margin or fee hold on {}", order.order.order_hash),
            });
        }
        let key = (order.market_id, order.order.is_buy);
        let side = self.derivative.entry(key).or_default();
        if side.len() >= self.max_orders_per_side {
            return Err(ExchangeError::StagingFull {
                market_id: key.0,
                is_buy: key.1,
            });
        }
        side.push(order);
        Ok(())
    }

    /// Stage a spot market order.
    pub fn stage_spot(&mut self, order: SpotMarketOrder) -> Result<()> {
        validate_order(&order.order)?;
        let key = (order.market_id, order.order.is_buy);
        let side = self.spot.entry(key).or_default();
        if side.len() >= self.max_orders_per_side {
            return Err(ExchangeError::StagingFull {
                market_id: key.0,
                is_buy: key.1,
            });
        }
        side.push(order);
        Ok(())
    }

    /// Decode and stage a batch of raw derivative orders.
    ///
    /// Orders that fail to decode or validate are skipped and reported;
    /// the rest of the batch is staged.
    pub fn stage_raw(&mut self, raw_orders: &[RawDerivativeMarketOrder]) -> Vec<StageRejection> {
        let mut rejections = Vec::new();
        for (index, raw) in raw_orders.iter().enumerate() {
            let staged = raw.decode().and_then(|order| self.stage_derivative(order));
            if let Err(error) = staged {
                tracing::warn!(
                    index,
                    order_hash = %raw.order_hash,
                    error = %error,
                    "Skipping staged order"
                );
                rejections.push(StageRejection {
                    index,
                    order_hash: raw.order_hash.clone(),
                    error,
                });
            }
        }
        rejections
    }

    /// Staged derivative orders of one side in price priority: buys by
    /// descending price, sells by ascending price. Equal prices keep their
    /// staging order.
    #[must_use]
    pub fn derivative_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeMarketOrder> {
        self.derivative
            .get(&(*market_id, is_buy))
            .map(|orders| sorted_by_priority(orders, is_buy))
            .unwrap_or_default()
    }

    /// Staged spot orders of one side in price priority.
    #[must_use]
    pub fn spot_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<SpotMarketOrder> {
        self.spot
            .get(&(*market_id, is_buy))
            .map(|orders| sorted_by_priority(orders, is_buy))
            .unwrap_or_default()
    }

    /// Derivative markets with staged orders, ascending.
    #[must_use]
    pub fn market_ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.derivative.keys().map(|(m, _)| *m).collect();
        ids.dedup();
        ids
    }

    /// Spot markets with staged orders, ascending.
    #[must_use]
    pub fn spot_market_ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.spot.keys().map(|(m, _)| *m).collect();
        ids.dedup();
        ids
    }

    /// Total number of staged orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.derivative.values().map(Vec::len).sum::<usize>()
            + self.spot.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Called at the end of every block.
    pub fn clear(&mut self) {
        self.derivative.clear();
        self.spot.clear();
    }
}

impl Default for TransientOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_order(order: &Order) -> Result<()> {
    if !order.price.is_positive_strict() {
        return Err(ExchangeError::InvalidOrder {
            reason: format!("non-positive price {} on {}", order.price, order.order_hash),
        });
    }
    if !order.quantity.is_positive_strict() {
        return Err(ExchangeError::InvalidOrder {
            reason: format!("non-positive quantity {} on {}", order.quantity, order.order_hash),
        });
    }
    Ok(())
}

fn sorted_by_priority<O: MatchableOrder + Clone>(orders: &[O], is_buy: bool) -> Vec<O> {
    let mut sorted = orders.to_vec();
    // sort_by is stable: equal prices stay in staging order
    if is_buy {
        sorted.sort_by(|a, b| b.price().cmp(&a.price()));
    } else {
        sorted.sort_by(|a, b| a.price().cmp(&b.price()));
    }
    sorted
}

/// A derivative market order as received from a transaction, before any
/// field has been decoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawDerivativeMarketOrder {
    pub market_id: String,
    pub subaccount_id: String,
    pub order_hash: String,
    #[serde(default)]
    pub cid: String,
    pub is_buy: bool,
    pub price: String,
    pub quantity: String,
    pub margin: String,
    #[serde(default)]
    pub fee_hold: Option<String>,
    #[serde(default)]
    pub fee_recipient: Option<String>,
}

impl RawDerivativeMarketOrder {
    /// Decode every field.
    pub fn decode(&self) -> Result<DerivativeMarketOrder> {
        let fee_recipient = self
            .fee_recipient
            .as_deref()
            .map(SubaccountId::from_hex)
            .transpose()?;
        let fee_hold = match self.fee_hold.as_deref() {
            Some(raw) => parse_decimal(raw)?,
            None => Decimal::ZERO,
        };
        Ok(DerivativeMarketOrder {
            market_id: MarketId::from_hex(&self.market_id)?,
            order: Order {
                subaccount_id: SubaccountId::from_hex(&self.subaccount_id)?,
                price: parse_decimal(&self.price)?,
                quantity: parse_decimal(&self.quantity)?,
                is_buy: self.is_buy,
                order_hash: OrderHash::from_hex(&self.order_hash)?,
                cid: self.cid.clone(),
                fee_recipient,
            },
            margin: parse_decimal(&self.margin)?,
            fee_hold,
        })
    }
}

/// A raw order that could not be staged.
#[derive(Debug)]
pub struct StageRejection {
    /// Position of the order in the submitted batch.
    pub index: usize,
    pub order_hash: String,
    pub error: ExchangeError,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn market() -> MarketId {
        MarketId::from_byte(1)
    }

    fn order(is_buy: bool, price: i64, index: u64) -> DerivativeMarketOrder {
        DerivativeMarketOrder::dummy(
            market(),
            SubaccountId::from_byte(1),
            is_buy,
            dec(price),
            dec(1),
            dec(10),
            index,
        )
    }

    #[test]
    fn buys_sorted_descending_with_stable_ties() {
        let mut store = TransientOrderStore::new();
        store.stage_derivative(order(true, 100, 0)).unwrap();
        store.stage_derivative(order(true, 105, 1)).unwrap();
        store.stage_derivative(order(true, 100, 2)).unwrap();

        let buys = store.derivative_orders(&market(), true);
        let hashes: Vec<_> = buys.iter().map(|o| o.order.order_hash).collect();
        assert_eq!(
            hashes,
            vec![OrderHash::from_index(1), OrderHash::from_index(0), OrderHash::from_index(2)]
        );
    }

    #[test]
    fn sells_sorted_ascending() {
        let mut store = TransientOrderStore::new();
        store.stage_derivative(order(false, 110, 0)).unwrap();
        store.stage_derivative(order(false, 90, 1)).unwrap();

        let sells = store.derivative_orders(&market(), false);
        assert_eq!(sells[0].order.price, dec(90));
        assert_eq!(sells[1].order.price, dec(110));
        assert!(store.derivative_orders(&market(), true).is_empty());
    }

    #[test]
    fn staging_full() {
        let mut store = TransientOrderStore::with_capacity(1);
        store.stage_derivative(order(true, 100, 0)).unwrap();
        let err = store.stage_derivative(order(true, 101, 1)).unwrap_err();
        assert!(matches!(err, ExchangeError::StagingFull { is_buy: true, .. }));
        // other side is independent
        store.stage_derivative(order(false, 101, 2)).unwrap();
    }

    #[test]
    fn rejects_zero_quantity() {
        let mut store = TransientOrderStore::new();
        let mut o = order(true, 100, 0);
        o.order.quantity = Decimal::ZERO;
        let err = store.stage_derivative(o).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidOrder { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn market_ids_ascending_and_deduplicated() {
        let mut store = TransientOrderStore::new();
        let mut a = order(true, 100, 0);
        a.market_id = MarketId::from_byte(9);
        store.stage_derivative(a).unwrap();
        store.stage_derivative(order(true, 100, 1)).unwrap();
        store.stage_derivative(order(false, 100, 2)).unwrap();

        assert_eq!(store.market_ids(), vec![MarketId::from_byte(1), MarketId::from_byte(9)]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut store = TransientOrderStore::new();
        store.stage_derivative(order(true, 100, 0)).unwrap();
        store
            .stage_spot(SpotMarketOrder {
                market_id: market(),
                order: Order::dummy(SubaccountId::from_byte(2), false, dec(5), dec(1), 7),
            })
            .unwrap();
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
        assert!(store.market_ids().is_empty());
        assert!(store.spot_market_ids().is_empty());
    }

    #[test]
    fn stage_raw_skips_malformed() {
        let good = format!(
            r#"{{"market_id":"{}","subaccount_id":"{}","order_hash":"{}","is_buy":true,"price":"100","quantity":"2","margin":"20"}}"#,
            MarketId::from_byte(1),
            SubaccountId::from_byte(2),
            OrderHash::from_byte(3),
        );
        let bad = format!(
            r#"{{"market_id":"{}","subaccount_id":"0xnothex","order_hash":"{}","is_buy":false,"price":"100","quantity":"2","margin":"20"}}"#,
            MarketId::from_byte(1),
            OrderHash::from_byte(4),
        );
        let raws: Vec<RawDerivativeMarketOrder> =
            serde_json::from_str(&format!("[{good},{bad}]")).unwrap();

        let mut store = TransientOrderStore::new();
        let rejections = store.stage_raw(&raws);

        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].index, 1);
        assert!(rejections[0].error.is_recoverable_decode());
        assert_eq!(store.derivative_orders(&market(), true).len(), 1);
        assert_eq!(store.derivative_orders(&market(), true)[0].order.quantity, dec(2));
    }
}
