//! In-memory exchange state.
//!
//! A reference implementation of [`ExchangeReader`] and [`ExchangeWriter`]
//! over ordered maps: deposits per (subaccount, denom), a bank ledger per
//! (address, denom), positions, resting limit orders in time priority and
//! the block's staged market orders. Used by the end-to-end tests and by
//! hosts that replay blocks outside a chain.

use std::collections::{BTreeMap, BTreeSet};

use dexmatch_ingress::{RawDerivativeMarketOrder, StageRejection, TransientOrderStore};
use dexmatch_types::{
    BlockInfo, DecimalExt, Denom, Deposit, DepositDelta, DerivativeLimitOrder,
    DerivativeLimitOrderDelta, DerivativeMarket, DerivativeMarketOrder, ExchangeError,
    ExchangeEvent, ExchangeParams, ExchangeReader, ExchangeWriter, FeeDiscountSchedule,
    FeeDiscountStakingInfo, MarketId, PerpetualMarketFunding, Position, Result, SubaccountId,
};
use rust_decimal::Decimal;

type Address = [u8; 20];

#[derive(Debug, Clone)]
pub struct InMemoryExchange {
    block: BlockInfo,
    markets: BTreeMap<MarketId, DerivativeMarket>,
    mark_prices: BTreeMap<MarketId, Decimal>,
    funding: BTreeMap<MarketId, PerpetualMarketFunding>,
    deposits: BTreeMap<(SubaccountId, Denom), Deposit>,
    bank: BTreeMap<(Address, Denom), Decimal>,
    blocked_addresses: BTreeSet<Address>,
    positions: BTreeMap<(MarketId, SubaccountId), Position>,
    /// Per market side, in time priority.
    resting: BTreeMap<(MarketId, bool), Vec<DerivativeLimitOrder>>,
    transient: TransientOrderStore,
    events: Vec<ExchangeEvent>,
    fee_discount_schedule: Option<FeeDiscountSchedule>,
    staking_info: FeeDiscountStakingInfo,
}

impl InMemoryExchange {
    #[must_use]
    pub fn new(block: BlockInfo, params: &ExchangeParams) -> Self {
        Self {
            block,
            markets: BTreeMap::new(),
            mark_prices: BTreeMap::new(),
            funding: BTreeMap::new(),
            deposits: BTreeMap::new(),
            bank: BTreeMap::new(),
            blocked_addresses: BTreeSet::new(),
            positions: BTreeMap::new(),
            resting: BTreeMap::new(),
            transient: TransientOrderStore::with_capacity(params.max_orders_per_side),
            events: Vec::new(),
            fee_discount_schedule: params.fee_discount_schedule.clone(),
            staking_info: FeeDiscountStakingInfo::default(),
        }
    }

    // -- setup ---------------------------------------------------------------

    /// Start the next block.
    pub fn set_block(&mut self, block: BlockInfo) {
        self.block = block;
    }

    pub fn add_market(&mut self, market: DerivativeMarket, mark_price: Option<Decimal>) {
        if let Some(price) = mark_price {
            self.mark_prices.insert(market.market_id, price);
        }
        self.markets.insert(market.market_id, market);
    }

    /// Delist a market. Its staged orders stay until the block ends.
    pub fn remove_market(&mut self, market_id: &MarketId) {
        self.markets.remove(market_id);
        self.mark_prices.remove(market_id);
    }

    pub fn set_mark_price(&mut self, market_id: MarketId, mark_price: Decimal) {
        self.mark_prices.insert(market_id, mark_price);
    }

    pub fn set_funding(&mut self, market_id: MarketId, funding: PerpetualMarketFunding) {
        self.funding.insert(market_id, funding);
    }

    pub fn set_staking_info(&mut self, staking_info: FeeDiscountStakingInfo) {
        self.staking_info = staking_info;
    }

    /// Credit a subaccount deposit, e.g. from a user deposit message.
    pub fn credit_deposit(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<()> {
        self.deposits
            .entry((subaccount_id, denom.to_string()))
            .or_default()
            .apply(&DepositDelta::credit(amount))
    }

    pub fn fund_bank(&mut self, address: Address, denom: &str, amount: Decimal) {
        let balance = self.bank.entry((address, denom.to_string())).or_insert(Decimal::ZERO);
        *balance = balance.saturating_add(amount);
    }

    /// Refuse every bank transfer involving `address`.
    pub fn block_address(&mut self, address: Address) {
        self.blocked_addresses.insert(address);
    }

    pub fn insert_position(&mut self, position: Position) {
        self.positions
            .insert((position.market_id, position.subaccount_id), position);
    }

    // -- order placement -----------------------------------------------------

    /// Reserve `margin + fee_hold` from the trader's available balance and
    /// stage the order for this block's matching.
    ///
    /// # Errors
    /// - `InvalidOrder` for an unknown market or an invalid order
    /// - `InsufficientDeposit` if the available balance cannot cover the
    ///   reservation
    /// - `StagingFull` if the market side is at capacity
    pub fn place_market_order(&mut self, order: DerivativeMarketOrder) -> Result<()> {
        let denom = self.quote_denom(&order.market_id)?;
        let reservation = order.margin.add_checked(order.fee_hold)?;
        self.check_available(order.subaccount_id(), &denom, reservation)?;
        let subaccount_id = order.subaccount_id();
        self.transient.stage_derivative(order)?;
        self.reserve(subaccount_id, &denom, reservation)?;
        Ok(())
    }

    /// Decode and place raw market orders. Orders that fail to decode are
    /// skipped and reported.
    pub fn place_raw_market_orders(&mut self, raw_orders: &[RawDerivativeMarketOrder]) -> Vec<StageRejection> {
        let mut rejections = Vec::new();
        for (index, raw) in raw_orders.iter().enumerate() {
            let placed = raw.decode().and_then(|order| self.place_market_order(order));
            if let Err(error) = placed {
                tracing::warn!(index, order_hash = %raw.order_hash, error = %error, "Rejected market order");
                rejections.push(StageRejection {
                    index,
                    order_hash: raw.order_hash.clone(),
                    error,
                });
            }
        }
        rejections
    }

    /// Reserve margin (and any positive maker fee) and rest the order at
    /// the back of its price level.
    pub fn place_limit_order(&mut self, order: DerivativeLimitOrder) -> Result<()> {
        let market = self.markets.get(&order.market_id).ok_or_else(|| ExchangeError::InvalidOrder {
            reason: format!("unknown market {}", order.market_id),
        })?;
        if !order.fillable.is_positive_strict() || !order.order.price.is_positive_strict() {
            return Err(ExchangeError::InvalidOrder {
                reason: format!("non-positive price or quantity on {}", order.order.order_hash),
            });
        }
        let denom = market.quote_denom.clone();
        let reservation = order
            .margin_for(order.fillable)?
            .add_checked(order.fee_hold_for(order.fillable, market.maker_fee_rate)?)?;
        self.check_available(order.subaccount_id(), &denom, reservation)?;
        self.reserve(order.subaccount_id(), &denom, reservation)?;
        self.resting
            .entry((order.market_id, order.order.is_buy))
            .or_default()
            .push(order);
        Ok(())
    }

    fn quote_denom(&self, market_id: &MarketId) -> Result<Denom> {
        self.markets
            .get(market_id)
            .map(|m| m.quote_denom.clone())
            .ok_or_else(|| ExchangeError::InvalidOrder {
                reason: format!("unknown market {market_id}"),
            })
    }

    fn check_available(&self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<()> {
        if self.deposit(&subaccount_id, denom).available_balance < amount {
            return Err(ExchangeError::InsufficientDeposit {
                subaccount_id,
                denom: denom.to_string(),
            });
        }
        Ok(())
    }

    fn reserve(&mut self, subaccount_id: SubaccountId, denom: &str, amount: Decimal) -> Result<()> {
        self.deposits
            .entry((subaccount_id, denom.to_string()))
            .or_default()
            .apply(&DepositDelta::new(-amount, Decimal::ZERO))
    }

    /// The deposit after `delta`, and the shortfall its available balance
    /// would need from the bank.
    fn deposit_after(&self, subaccount_id: &SubaccountId, denom: &str, delta: &DepositDelta) -> Result<(Deposit, Decimal)> {
        let mut deposit = self.deposit(subaccount_id, denom);
        deposit.apply(delta)?;
        let shortfall = -deposit.available_balance.min(Decimal::ZERO);
        Ok((deposit, shortfall))
    }

    /// Bank balance left once `amount` is drawn on top of `already_drawn`.
    fn bank_after_draw(
        &self,
        subaccount_id: &SubaccountId,
        denom: &str,
        amount: Decimal,
        already_drawn: Decimal,
    ) -> Result<Decimal> {
        let address = subaccount_id.address();
        if self.blocked_addresses.contains(&address) {
            return Err(ExchangeError::BlockedAddress(*subaccount_id));
        }
        let available = self.bank_balance(&address, denom).sub_checked(already_drawn)?;
        if available < amount {
            return Err(ExchangeError::InsufficientBankBalance {
                subaccount_id: *subaccount_id,
                denom: denom.to_string(),
                needed: amount,
                available,
            });
        }
        available.sub_checked(amount)
    }

    // -- inspection ----------------------------------------------------------

    #[must_use]
    pub fn deposit(&self, subaccount_id: &SubaccountId, denom: &str) -> Deposit {
        self.deposits
            .get(&(*subaccount_id, denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn bank_balance(&self, address: &Address, denom: &str) -> Decimal {
        self.bank
            .get(&(*address, denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of every deposit's total balance in `denom`.
    #[must_use]
    pub fn total_deposits(&self, denom: &str) -> Decimal {
        self.deposits
            .iter()
            .filter(|((_, d), _)| d == denom)
            .map(|(_, deposit)| deposit.total_balance)
            .sum()
    }

    #[must_use]
    pub fn stored_position(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<&Position> {
        self.positions.get(&(*market_id, *subaccount_id))
    }

    #[must_use]
    pub fn resting_orders(&self, market_id: &MarketId, is_buy: bool) -> &[DerivativeLimitOrder] {
        self.resting
            .get(&(*market_id, is_buy))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn events(&self) -> &[ExchangeEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<ExchangeEvent> {
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn staged_orders(&self) -> &TransientOrderStore {
        &self.transient
    }
}

impl ExchangeReader for InMemoryExchange {
    fn block_info(&self) -> BlockInfo {
        self.block
    }

    fn market_with_mark_price(
        &self,
        market_id: &MarketId,
        include_mark_price: bool,
    ) -> (Option<DerivativeMarket>, Option<Decimal>) {
        let market = self.markets.get(market_id).cloned();
        let mark_price = if include_mark_price && market.is_some() {
            self.mark_prices.get(market_id).copied()
        } else {
            None
        };
        (market, mark_price)
    }

    fn perpetual_funding(&self, market_id: &MarketId) -> Option<PerpetualMarketFunding> {
        self.funding.get(market_id).copied()
    }

    fn transient_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeMarketOrder> {
        self.transient.derivative_orders(market_id, is_buy)
    }

    fn transient_market_ids(&self) -> Vec<MarketId> {
        self.transient.market_ids()
    }

    fn resting_limit_orders(&self, market_id: &MarketId, is_buy: bool) -> Vec<DerivativeLimitOrder> {
        self.resting_orders(market_id, is_buy).to_vec()
    }

    fn position(&self, market_id: &MarketId, subaccount_id: &SubaccountId) -> Option<Position> {
        self.stored_position(market_id, subaccount_id).cloned()
    }

    fn fee_discount_staking_info(&self) -> FeeDiscountStakingInfo {
        self.staking_info.clone()
    }

    fn fee_discount_schedule(&self) -> Option<FeeDiscountSchedule> {
        self.fee_discount_schedule.clone()
    }
}

impl ExchangeWriter for InMemoryExchange {
    /// Applies the delta; if the available balance would go negative the
    /// shortfall is drawn from the owner's bank balance. Nothing changes on
    /// failure.
    fn update_deposit(&mut self, subaccount_id: &SubaccountId, denom: &str, delta: &DepositDelta) -> Result<()> {
        let (mut deposit, shortfall) = self.deposit_after(subaccount_id, denom, delta)?;
        if shortfall.is_positive_strict() {
            let remaining = self.bank_after_draw(subaccount_id, denom, shortfall, Decimal::ZERO)?;
            deposit.apply(&DepositDelta::credit(shortfall))?;
            self.bank.insert((subaccount_id.address(), denom.to_string()), remaining);
            tracing::debug!(subaccount = %subaccount_id, denom, shortfall = %shortfall, "Deposit shortfall charged to bank");
        }

        self.deposits.insert((*subaccount_id, denom.to_string()), deposit);
        Ok(())
    }

    /// Subaccounts sharing an address draw on the same bank balance, so
    /// draws are accumulated per address.
    fn check_deposit_updates(&self, denom: &str, deltas: &BTreeMap<SubaccountId, DepositDelta>) -> Result<()> {
        let mut drawn: BTreeMap<Address, Decimal> = BTreeMap::new();
        for (subaccount_id, delta) in deltas {
            let (_, shortfall) = self.deposit_after(subaccount_id, denom, delta)?;
            if !shortfall.is_positive_strict() {
                continue;
            }
            let already = drawn.entry(subaccount_id.address()).or_insert(Decimal::ZERO);
            self.bank_after_draw(subaccount_id, denom, shortfall, *already)?;
            *already = already.add_checked(shortfall)?;
        }
        Ok(())
    }

    fn update_deposit_without_bank_charge(
        &mut self,
        subaccount_id: &SubaccountId,
        denom: &str,
        delta: &DepositDelta,
    ) -> Result<()> {
        self.deposits
            .entry((*subaccount_id, denom.to_string()))
            .or_default()
            .apply(delta)
    }

    fn set_position(&mut self, market_id: &MarketId, subaccount_id: &SubaccountId, position: &Position) {
        self.positions.insert((*market_id, *subaccount_id), position.clone());
    }

    fn update_limit_orders_from_filled_deltas(
        &mut self,
        market_id: &MarketId,
        is_buy: bool,
        deltas: &[DerivativeLimitOrderDelta],
    ) -> Result<()> {
        let side = self.resting.entry((*market_id, is_buy)).or_default();
        let positions = deltas
            .iter()
            .map(|delta| {
                side.iter()
                    .position(|o| o.order.order_hash == delta.order_hash())
                    .ok_or(ExchangeError::UnknownRestingOrder(delta.order_hash()))
            })
            .collect::<Result<Vec<usize>>>()?;
        for (index, delta) in positions.into_iter().zip(deltas) {
            side[index].fillable = delta.remaining();
        }
        side.retain(|o| o.fillable.is_positive_strict());
        Ok(())
    }

    fn emit_typed_event(&mut self, event: ExchangeEvent) {
        tracing::trace!(kind = event.kind(), "Event emitted");
        self.events.push(event);
    }

    fn clear_transient_orders(&mut self) {
        self.transient.clear();
    }
}

#[cfg(test)]
mod tests {
    use dexmatch_types::OrderHash;

    use super::*;

    fn exchange() -> InMemoryExchange {
        let block = BlockInfo::new(1, chrono::DateTime::from_timestamp(0, 0).unwrap());
        let mut exchange = InMemoryExchange::new(block, &ExchangeParams::default());
        exchange.add_market(DerivativeMarket::dummy_feeless(MarketId::from_byte(1)), Some(Decimal::new(100, 0)));
        exchange
    }

    #[test]
    fn shortfall_is_drawn_from_bank() {
        let mut ex = exchange();
        let sub = SubaccountId::from_byte(1);
        ex.fund_bank(sub.address(), "usdt", Decimal::new(5, 0));
        ex.update_deposit(&sub, "usdt", &DepositDelta::new(Decimal::new(-3, 0), Decimal::new(-3, 0)))
            .unwrap();
        assert_eq!(ex.deposit(&sub, "usdt"), Deposit::default());
        assert_eq!(ex.bank_balance(&sub.address(), "usdt"), Decimal::new(2, 0));
    }

    #[test]
    fn failed_bank_charge_changes_nothing() {
        let mut ex = exchange();
        let sub = SubaccountId::from_byte(1);
        ex.credit_deposit(sub, "usdt", Decimal::ONE).unwrap();
        let err = ex
            .update_deposit(&sub, "usdt", &DepositDelta::new(Decimal::new(-3, 0), Decimal::new(-3, 0)))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBankBalance { .. }));
        assert_eq!(ex.deposit(&sub, "usdt"), Deposit::new(Decimal::ONE));
    }

    #[test]
    fn without_bank_charge_may_go_negative() {
        let mut ex = exchange();
        let sub = SubaccountId::from_byte(1);
        ex.block_address(sub.address());
        ex.update_deposit_without_bank_charge(&sub, "usdt", &DepositDelta::credit(Decimal::NEGATIVE_ONE))
            .unwrap();
        assert_eq!(ex.deposit(&sub, "usdt").total_balance, Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn placement_requires_available_balance() {
        let mut ex = exchange();
        let sub = SubaccountId::from_byte(1);
        ex.credit_deposit(sub, "usdt", Decimal::new(5, 0)).unwrap();
        let order = DerivativeMarketOrder::dummy(
            MarketId::from_byte(1),
            sub,
            true,
            Decimal::new(100, 0),
            Decimal::ONE,
            Decimal::new(10, 0),
            1,
        );
        let err = ex.place_market_order(order).unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientDeposit { .. }));
        assert!(ex.staged_orders().is_empty());
    }

    #[test]
    fn unknown_resting_order_is_an_error() {
        let mut ex = exchange();
        let order = DerivativeLimitOrder::dummy(
            MarketId::from_byte(1),
            SubaccountId::from_byte(1),
            true,
            Decimal::new(100, 0),
            Decimal::ONE,
            Decimal::new(10, 0),
            9,
        );
        let delta = DerivativeLimitOrderDelta {
            order,
            fill_quantity: Decimal::ONE,
            cancel_quantity: Decimal::ZERO,
        };
        let err = ex
            .update_limit_orders_from_filled_deltas(&MarketId::from_byte(1), true, &[delta])
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownRestingOrder(h) if h == OrderHash::from_index(9)));
    }

    #[test]
    fn deposit_check_sums_draws_per_address() {
        let mut ex = exchange();
        let first = SubaccountId::new([4u8; 20], 0);
        let second = SubaccountId::new([4u8; 20], 1);
        ex.fund_bank(first.address(), "usdt", Decimal::new(5, 0));
        let debit = DepositDelta::new(Decimal::new(-3, 0), Decimal::new(-3, 0));

        let mut one = BTreeMap::new();
        one.insert(first, debit);
        ex.check_deposit_updates("usdt", &one).unwrap();

        let mut both = one.clone();
        both.insert(second, debit);
        let err = ex.check_deposit_updates("usdt", &both).unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBankBalance { needed, available, .. }
            if needed == Decimal::new(3, 0) && available == Decimal::new(2, 0)));
        assert_eq!(ex.bank_balance(&first.address(), "usdt"), Decimal::new(5, 0));
    }

    #[test]
    fn unknown_resting_order_leaves_side_untouched() {
        let mut ex = exchange();
        let market = MarketId::from_byte(1);
        let sub = SubaccountId::from_byte(1);
        ex.credit_deposit(sub, "usdt", Decimal::new(100, 0)).unwrap();
        let known = DerivativeLimitOrder::dummy(market, sub, true, Decimal::new(100, 0), Decimal::ONE, Decimal::new(10, 0), 1);
        let unknown = DerivativeLimitOrder::dummy(market, sub, true, Decimal::new(100, 0), Decimal::ONE, Decimal::new(10, 0), 2);
        ex.place_limit_order(known.clone()).unwrap();

        let deltas = [known, unknown].map(|order| DerivativeLimitOrderDelta {
            order,
            fill_quantity: Decimal::ONE,
            cancel_quantity: Decimal::ZERO,
        });
        assert!(ex.update_limit_orders_from_filled_deltas(&market, true, &deltas).is_err());
        assert_eq!(ex.resting_orders(&market, true).len(), 1);
    }

    #[test]
    fn delisted_market_has_no_mark_price() {
        let mut ex = exchange();
        ex.remove_market(&MarketId::from_byte(1));
        assert_eq!(ex.market_with_mark_price(&MarketId::from_byte(1), true), (None, None));
    }
}
