//! Derivative market-order execution builder.
//!
//! For one market, the builder turns the block's staged market orders and
//! the resting limit orders into a [`BatchExecutionData`]:
//!
//! 1. market orders that cannot execute are cancelled and refunded
//!    (reduce-only without a position to reduce, insufficient margin)
//! 2. reduce-only resting orders without a position to reduce are
//!    cancelled
//! 3. market buys walk the resting sells, then market sells walk the
//!    resting buys; every fill executes at the resting (maker) price
//! 4. each fill settles funding, updates the position, charges fees and
//!    books the resulting balance changes
//!
//! Nothing here writes state: positions live in the caller's
//! [`PositionStates`] and everything else lands in the returned value.

use std::collections::{BTreeMap, BTreeSet};

use dexmatch_ingress::{effective_fee_rates, FeeDiscountConfig};
use dexmatch_types::{
    BatchExecutionData, CancelReason, DecimalExt, DepositDelta, DerivativeLimitOrder,
    DerivativeLimitOrderDelta, DerivativeMarket, DerivativeMarketOrder, DerivativeTradeLog,
    EventBatchDerivativeExecution, EventCancelDerivativeOrder, ExchangeError, ExchangeReader,
    ExecutionType, FeeDiscountSchedule, FeeDiscountStakingInfo, MarketId, Order,
    PerpetualMarketFunding, PositionDelta, Result, SubaccountId, VwapData,
};
use rust_decimal::Decimal;

use crate::determinism::liquidation_order_hash;
use crate::margin::{
    apply_delta, bankruptcy_price, has_sufficient_order_margin, is_liquidatable,
};
use crate::market_orderbook::DerivativeMarketOrderbook;
use crate::orderbook::RestingOrderbook;
use crate::position_states::PositionStates;

/// Everything one market's matching pass needs, resolved up front.
#[derive(Debug, Clone)]
pub struct MatchingInput<'a> {
    pub market: DerivativeMarket,
    pub mark_price: Option<Decimal>,
    /// Present for perpetual markets only.
    pub funding: Option<PerpetualMarketFunding>,
    /// In price priority: best (highest) worst-price first.
    pub market_buy_orders: Vec<DerivativeMarketOrder>,
    /// In price priority: best (lowest) worst-price first.
    pub market_sell_orders: Vec<DerivativeMarketOrder>,
    pub resting_buy_orders: Vec<DerivativeLimitOrder>,
    pub resting_sell_orders: Vec<DerivativeLimitOrder>,
    pub fee_config: FeeDiscountConfig<'a>,
    pub is_liquidation: bool,
}

/// Resolve one market's inputs through `reader` and build its execution.
///
/// Returns `Ok(None)` when the market cannot be resolved (e.g. it was
/// delisted earlier in the block) or when nothing is staged for it. A
/// missing or non-positive mark price still matches the staged orders; only
/// the mark-price margin check and the VWAP sample are skipped.
pub fn execute_derivative_market_order_matching<R: ExchangeReader + ?Sized>(
    reader: &R,
    market_id: &MarketId,
    schedule: Option<&FeeDiscountSchedule>,
    staking_info: &FeeDiscountStakingInfo,
    positions: &mut PositionStates,
) -> Result<Option<BatchExecutionData>> {
    let (market, mark_price) = reader.market_with_mark_price(market_id, true);
    let Some(market) = market else {
        tracing::debug!(market = %market_id, "Market not found, skipping");
        return Ok(None);
    };
    let mark_price = mark_price.filter(|p| p.is_positive_strict());
    if mark_price.is_none() && !market.is_binary_option() {
        tracing::warn!(market = %market_id, "No valid mark price, matching without mark-price checks");
    }

    let market_buy_orders = reader.transient_orders(market_id, true);
    let market_sell_orders = reader.transient_orders(market_id, false);
    if market_buy_orders.is_empty() && market_sell_orders.is_empty() {
        return Ok(None);
    }

    let funding = if market.is_perpetual() {
        reader.perpetual_funding(market_id)
    } else {
        None
    };
    let fee_config = effective_fee_rates(&market, schedule, staking_info);
    let input = MatchingInput {
        resting_buy_orders: reader.resting_limit_orders(market_id, true),
        resting_sell_orders: reader.resting_limit_orders(market_id, false),
        market,
        mark_price,
        funding,
        market_buy_orders,
        market_sell_orders,
        fee_config,
        is_liquidation: false,
    };
    derivative_market_order_execution_data(reader, input, positions).map(Some)
}

/// Force-close a position whose margin has fallen below maintenance.
///
/// Builds a reduce-only market order for the whole position with the
/// bankruptcy price as its worst price and matches it against the resting
/// book with liquidation semantics. Liquidations pay the undiscounted
/// market fee.
///
/// # Errors
/// - `MarkPriceUnavailable` if the market has no mark price
/// - `PositionNotLiquidatable` if the position is healthy or flat
pub fn execute_liquidation<R: ExchangeReader + ?Sized>(
    reader: &R,
    market_id: &MarketId,
    subaccount_id: &SubaccountId,
    positions: &mut PositionStates,
) -> Result<Option<BatchExecutionData>> {
    let (market, mark_price) = reader.market_with_mark_price(market_id, true);
    let Some(market) = market else {
        return Ok(None);
    };
    let mark_price = mark_price.ok_or(ExchangeError::MarkPriceUnavailable(*market_id))?;
    let funding = if market.is_perpetual() {
        reader.perpetual_funding(market_id)
    } else {
        None
    };

    let position = positions
        .get_or_load(reader, market_id, subaccount_id, funding.as_ref())?
        .clone();
    // funding was settled on load, so nothing is pending here
    if !is_liquidatable(&position, mark_price, market.maintenance_margin_ratio, None)? {
        return Err(ExchangeError::PositionNotLiquidatable {
            market_id: *market_id,
            subaccount_id: *subaccount_id,
        });
    }

    let height = reader.block_info().height;
    let order = DerivativeMarketOrder {
        market_id: *market_id,
        order: Order {
            subaccount_id: *subaccount_id,
            price: bankruptcy_price(&position)?,
            quantity: position.size(),
            is_buy: position.is_short(),
            order_hash: liquidation_order_hash(market_id, subaccount_id, height),
            cid: String::new(),
            fee_recipient: None,
        },
        margin: Decimal::ZERO,
        fee_hold: Decimal::ZERO,
    };
    tracing::warn!(
        market = %market_id,
        subaccount = %subaccount_id,
        quantity = %position.quantity,
        bankruptcy_price = %order.order.price,
        mark_price = %mark_price,
        "Liquidating position"
    );

    let no_staking = FeeDiscountStakingInfo::default();
    let (market_buy_orders, market_sell_orders) = if order.order.is_buy {
        (vec![order], vec![])
    } else {
        (vec![], vec![order])
    };
    let input = MatchingInput {
        resting_buy_orders: reader.resting_limit_orders(market_id, true),
        resting_sell_orders: reader.resting_limit_orders(market_id, false),
        fee_config: FeeDiscountConfig::undiscounted(&market, &no_staking),
        market,
        mark_price: Some(mark_price),
        funding,
        market_buy_orders,
        market_sell_orders,
        is_liquidation: true,
    };
    derivative_market_order_execution_data(reader, input, positions).map(Some)
}

/// Build the execution of one market from fully resolved inputs.
pub fn derivative_market_order_execution_data<R: ExchangeReader + ?Sized>(
    reader: &R,
    input: MatchingInput<'_>,
    positions: &mut PositionStates,
) -> Result<BatchExecutionData> {
    let MatchingInput {
        market,
        mark_price,
        funding,
        market_buy_orders,
        market_sell_orders,
        resting_buy_orders,
        resting_sell_orders,
        fee_config,
        is_liquidation,
    } = input;

    let mut builder = ExecutionBuilder {
        reader,
        positions,
        fee_config,
        data: BatchExecutionData::empty(market, mark_price, funding, is_liquidation),
        touched: BTreeSet::new(),
        reduce_only_room: BTreeMap::new(),
    };

    let market_buy_orders = builder.validate_market_orders(market_buy_orders)?;
    let market_sell_orders = builder.validate_market_orders(market_sell_orders)?;
    let resting_buy_orders = builder.validate_resting_orders(resting_buy_orders)?;
    let resting_sell_orders = builder.validate_resting_orders(resting_sell_orders)?;

    let mut resting_sells = RestingOrderbook::new(false, resting_sell_orders);
    let mut resting_buys = RestingOrderbook::new(true, resting_buy_orders);
    let buys = builder.match_side(market_buy_orders, &mut resting_sells)?;
    let sells = builder.match_side(market_sell_orders, &mut resting_buys)?;

    builder.finish(buys, sells, &resting_sells, &resting_buys)
}

/// Outcome of walking one direction of market orders.
#[derive(Debug, Default)]
struct SideOutcome {
    taker_logs: Vec<DerivativeTradeLog>,
    maker_logs: Vec<DerivativeTradeLog>,
    /// `Σ quantity * execution price`.
    notional: Decimal,
    quantity: Decimal,
}

/// One side of one fill.
struct Fill<'o> {
    order: &'o Order,
    quantity: Decimal,
    price: Decimal,
    /// Margin the order brings for this quantity.
    margin: Decimal,
    /// Funds released from the order's reservation back to available.
    released: Decimal,
    fee_rate: Decimal,
}

struct ExecutionBuilder<'a, 'p, R: ?Sized> {
    reader: &'p R,
    positions: &'p mut PositionStates,
    fee_config: FeeDiscountConfig<'a>,
    data: BatchExecutionData,
    /// Subaccounts whose position changed.
    touched: BTreeSet<SubaccountId>,
    /// Remaining reducible size per `(subaccount, is_buy)` for reduce-only
    /// orders, shared by market and resting orders.
    reduce_only_room: BTreeMap<(SubaccountId, bool), Decimal>,
}

impl<R: ExchangeReader + ?Sized> ExecutionBuilder<'_, '_, R> {
    fn market_id(&self) -> MarketId {
        self.data.market.market_id
    }

    /// Reserve `quantity` of reducible position for a reduce-only order.
    /// Returns false when the opposing position is too small.
    fn reserve_reduce_only(&mut self, subaccount_id: SubaccountId, is_buy: bool, quantity: Decimal) -> Result<bool> {
        let key = (subaccount_id, is_buy);
        let room = match self.reduce_only_room.get(&key) {
            Some(room) => *room,
            None => {
                let market_id = self.market_id();
                let position = self.positions.get_or_load(
                    self.reader,
                    &market_id,
                    &subaccount_id,
                    self.data.funding.as_ref(),
                )?;
                let opposing = if is_buy { position.is_short() } else { position.is_long() };
                if opposing { position.size() } else { Decimal::ZERO }
            }
        };
        if room < quantity {
            self.reduce_only_room.insert(key, room);
            return Ok(false);
        }
        self.reduce_only_room.insert(key, room.sub_checked(quantity)?);
        Ok(true)
    }

    fn add_deposit_delta(&mut self, subaccount_id: SubaccountId, delta: DepositDelta) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }
        let entry = self.data.deposit_deltas.entry(subaccount_id).or_default();
        *entry = entry.checked_add(delta)?;
        Ok(())
    }

    fn validate_market_orders(
        &mut self,
        orders: Vec<DerivativeMarketOrder>,
    ) -> Result<Vec<DerivativeMarketOrder>> {
        let mut valid = Vec::with_capacity(orders.len());
        for order in orders {
            let reason = if order.is_reduce_only() {
                let reserved =
                    self.reserve_reduce_only(order.subaccount_id(), order.is_buy(), order.order.quantity)?;
                (!reserved).then_some(CancelReason::NoPositionToReduce)
            } else {
                let sufficient = has_sufficient_order_margin(
                    &self.data.market,
                    order.is_buy(),
                    order.order.price,
                    order.order.quantity,
                    order.margin,
                    self.data.mark_price,
                )?;
                (!sufficient).then_some(CancelReason::InsufficientMargin)
            };

            match reason {
                None => valid.push(order),
                Some(reason) => self.cancel_market_order(&order, reason)?,
            }
        }
        Ok(valid)
    }

    fn cancel_market_order(&mut self, order: &DerivativeMarketOrder, reason: CancelReason) -> Result<()> {
        tracing::warn!(
            market = %order.market_id,
            order_hash = %order.order.order_hash,
            subaccount = %order.subaccount_id(),
            reason = %reason,
            "Cancelling market order"
        );
        let refund = order.margin.add_checked(order.fee_hold)?;
        self.add_deposit_delta(order.subaccount_id(), DepositDelta::new(refund, Decimal::ZERO))?;
        self.data.cancel_market_order_events.push(EventCancelDerivativeOrder {
            market_id: order.market_id,
            is_limit_cancel: false,
            order_hash: order.order.order_hash,
            subaccount_id: order.subaccount_id(),
            cid: order.order.cid.clone(),
            reason,
        });
        Ok(())
    }

    fn validate_resting_orders(
        &mut self,
        orders: Vec<DerivativeLimitOrder>,
    ) -> Result<Vec<DerivativeLimitOrder>> {
        let mut valid = Vec::with_capacity(orders.len());
        for order in orders {
            if !order.is_reduce_only()
                || self.reserve_reduce_only(order.subaccount_id(), order.order.is_buy, order.fillable)?
            {
                valid.push(order);
                continue;
            }
            self.cancel_resting_order(order)?;
        }
        Ok(valid)
    }

    fn cancel_resting_order(&mut self, order: DerivativeLimitOrder) -> Result<()> {
        tracing::warn!(
            market = %order.market_id,
            order_hash = %order.order.order_hash,
            subaccount = %order.subaccount_id(),
            "Cancelling reduce-only resting order without position"
        );
        let refund = order
            .margin_for(order.fillable)?
            .add_checked(order.fee_hold_for(order.fillable, self.fee_config.base_rates().maker_fee_rate)?)?;
        self.add_deposit_delta(order.subaccount_id(), DepositDelta::new(refund, Decimal::ZERO))?;
        self.data.cancel_limit_order_events.push(EventCancelDerivativeOrder {
            market_id: order.market_id,
            is_limit_cancel: true,
            order_hash: order.order.order_hash,
            subaccount_id: order.subaccount_id(),
            cid: order.order.cid.clone(),
            reason: CancelReason::NoPositionToReduce,
        });
        let cancel_quantity = order.fillable;
        self.data
            .resting_limit_order_cancelled_deltas
            .push(DerivativeLimitOrderDelta {
                order,
                fill_quantity: Decimal::ZERO,
                cancel_quantity,
            });
        Ok(())
    }

    /// Walk `takers` against `resting` until either runs out or prices
    /// stop crossing.
    fn match_side(
        &mut self,
        takers: Vec<DerivativeMarketOrder>,
        resting: &mut RestingOrderbook,
    ) -> Result<SideOutcome> {
        let mut outcome = SideOutcome::default();
        let Some(mut book) = DerivativeMarketOrderbook::new(takers) else {
            return Ok(outcome);
        };
        let base_maker_fee_rate = self.fee_config.base_rates().maker_fee_rate;

        while let (Some(taker_level), Some((maker_index, maker_level))) = (book.peek(), resting.peek()) {
            let crosses = if resting.is_buy() {
                taker_level.price <= maker_level.price
            } else {
                taker_level.price >= maker_level.price
            };
            if !crosses {
                break;
            }

            let quantity = taker_level.quantity.min(maker_level.quantity);
            let price = maker_level.price;
            let taker_index = book.current_index();
            book.fill(quantity)?;
            resting.fill(quantity)?;

            let taker = &book.orders()[taker_index];
            let taker_rates = self.fee_config.fee_rates_for(&taker.subaccount_id())?;
            let taker_log = self.apply_fill(Fill {
                order: &taker.order,
                quantity,
                price,
                margin: taker.margin_for(quantity)?,
                released: Decimal::ZERO,
                fee_rate: taker_rates.taker_fee_rate,
            })?;

            let maker = resting.order(maker_index);
            let maker_rates = self.fee_config.fee_rates_for(&maker.subaccount_id())?;
            let maker_margin = maker.margin_for(quantity)?;
            let maker_log = self.apply_fill(Fill {
                order: &maker.order,
                quantity,
                price,
                margin: maker_margin,
                released: maker_margin.add_checked(maker.fee_hold_for(quantity, base_maker_fee_rate)?)?,
                fee_rate: maker_rates.maker_fee_rate,
            })?;

            outcome.taker_logs.push(taker_log);
            outcome.maker_logs.push(maker_log);
            outcome.notional = outcome.notional.add_checked(quantity.mul_trunc(price)?)?;
            outcome.quantity = outcome.quantity.add_checked(quantity)?;
        }

        // fills charged what they used, so every reservation goes back whole
        let (orders, _) = book.into_parts();
        for order in orders {
            let reservation = order.margin.add_checked(order.fee_hold)?;
            self.add_deposit_delta(order.subaccount_id(), DepositDelta::new(reservation, Decimal::ZERO))?;
        }
        Ok(outcome)
    }

    fn apply_fill(&mut self, fill: Fill<'_>) -> Result<DerivativeTradeLog> {
        let order = fill.order;
        let market_id = self.market_id();
        let signed_quantity = if order.is_buy { fill.quantity } else { -fill.quantity };

        let position = self.positions.get_or_load(
            self.reader,
            &market_id,
            &order.subaccount_id,
            self.data.funding.as_ref(),
        )?;
        let update = apply_delta(
            position,
            &PositionDelta {
                quantity: signed_quantity,
                margin: fill.margin,
                execution_price: fill.price,
            },
        )?;
        self.touched.insert(order.subaccount_id);

        let fee = fill.price.mul_trunc(fill.quantity)?.mul_trunc(fill.fee_rate)?;
        let net = update
            .payout
            .sub_checked(update.margin_used)?
            .sub_checked(fee)?;
        self.add_deposit_delta(
            order.subaccount_id,
            DepositDelta::new(net.add_checked(fill.released)?, net),
        )?;
        self.distribute_fee(order, fee)?;
        if self.fee_config.is_qualified() && fee.is_positive_strict() {
            self.data.trading_reward_points.add(order.subaccount_id, fee);
        }

        tracing::debug!(
            market = %market_id,
            order_hash = %order.order_hash,
            side = order.side_label(),
            qty = %fill.quantity,
            price = %fill.price,
            fee = %fee,
            payout = %update.payout,
            "Fill"
        );

        Ok(DerivativeTradeLog {
            subaccount_id: order.subaccount_id,
            position_delta: PositionDelta {
                quantity: signed_quantity,
                margin: update.margin_used,
                execution_price: fill.price,
            },
            payout: update.payout,
            fee,
            pnl: update.pnl,
            order_hash: order.order_hash,
            fee_recipient: order.fee_recipient,
            cid: order.cid.clone(),
        })
    }

    /// Split a fee between the order's relayer and the fee auction. Rebates
    /// (negative fees) come entirely out of the auction share.
    fn distribute_fee(&mut self, order: &Order, fee: Decimal) -> Result<()> {
        let relayer_share = match order.fee_recipient {
            Some(recipient) if fee.is_positive_strict() => {
                let share = fee.mul_trunc(self.data.market.relayer_fee_share_rate)?;
                self.add_deposit_delta(recipient, DepositDelta::credit(share))?;
                share
            }
            _ => Decimal::ZERO,
        };
        self.data.auction_fee_reward = self
            .data
            .auction_fee_reward
            .add_checked(fee.sub_checked(relayer_share)?)?;
        Ok(())
    }

    fn finish(
        mut self,
        buys: SideOutcome,
        sells: SideOutcome,
        resting_sells: &RestingOrderbook,
        resting_buys: &RestingOrderbook,
    ) -> Result<BatchExecutionData> {
        let market_id = self.market_id();
        let is_liquidation = self.data.is_liquidation;
        let cumulative_funding = self.data.funding.map(|f| f.cumulative_funding);
        let event = |is_buy, execution_type, trades| EventBatchDerivativeExecution {
            market_id,
            is_buy,
            is_liquidation,
            cumulative_funding,
            execution_type,
            trades,
        };

        let fills = buys.taker_logs.len() + sells.taker_logs.len();
        let notional = buys.notional.add_checked(sells.notional)?;
        let quantity = buys.quantity.add_checked(sells.quantity)?;

        if !buys.taker_logs.is_empty() {
            self.data.market_buy_order_execution_event =
                Some(event(true, ExecutionType::Market, buys.taker_logs));
            self.data.resting_limit_sell_order_execution_event =
                Some(event(false, ExecutionType::LimitMatchRestingOrder, buys.maker_logs));
        }
        if !sells.taker_logs.is_empty() {
            self.data.market_sell_order_execution_event =
                Some(event(false, ExecutionType::Market, sells.taker_logs));
            self.data.resting_limit_buy_order_execution_event =
                Some(event(true, ExecutionType::LimitMatchRestingOrder, sells.maker_logs));
        }

        self.data
            .resting_limit_order_filled_deltas
            .extend(resting_sells.filled_deltas());
        self.data
            .resting_limit_order_filled_deltas
            .extend(resting_buys.filled_deltas());

        for subaccount_id in &self.touched {
            if let Some(position) = self.positions.get(&market_id, subaccount_id) {
                self.data.positions.insert(*subaccount_id, position.clone());
            }
        }

        if quantity.is_positive_strict() && self.data.market.has_valid_mark_price(self.data.mark_price) {
            self.data.vwap_data = Some(VwapData {
                price: notional.quo_trunc(quantity)?,
                quantity,
                market_type: self.data.market.market_type,
            });
        }

        tracing::info!(
            market = %market_id,
            fills,
            volume = %quantity,
            notional = %notional,
            cancelled_market_orders = self.data.cancel_market_order_events.len(),
            cancelled_limit_orders = self.data.cancel_limit_order_events.len(),
            is_liquidation,
            "Derivative batch execution built"
        );
        Ok(self.data)
    }
}
