//! Integration test: execution builder scenarios
//!
//! Each scenario stages a handful of orders against a static reader and
//! checks the resulting deposit deltas, positions, events and deltas with
//! hand-computed numbers.

mod common;

use std::str::FromStr;

use dexmatch_ingress::effective_fee_rates;
use dexmatch_matchcore::{
    derivative_market_order_execution_data, execute_derivative_market_order_matching,
    execute_liquidation, liquidation_order_hash, MatchingInput, PositionStates,
};
use dexmatch_types::*;
use rust_decimal::Decimal;

use common::{dec, limit_order, market_id, market_order, sub, StaticReader};

fn run(reader: &StaticReader) -> BatchExecutionData {
    let staking = reader.fee_discount_staking_info();
    let schedule = reader.fee_discount_schedule();
    let mut positions = PositionStates::new();
    execute_derivative_market_order_matching(reader, &market_id(), schedule.as_ref(), &staking, &mut positions)
        .unwrap()
        .expect("market resolves")
}

#[test]
fn single_fill_at_maker_price() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)));
    reader.resting.push(limit_order(1, false, 100, 5, 50, 100));
    reader.transient.push(market_order(2, true, 105, 3, 30, 1));

    let data = run(&reader);

    let taker = data.deposit_deltas[&sub(2)];
    assert_eq!(taker.total_balance_delta, dec(-30));
    assert_eq!(taker.available_balance_delta, Decimal::ZERO);
    let maker = data.deposit_deltas[&sub(1)];
    assert_eq!(maker.total_balance_delta, dec(-30));
    assert_eq!(maker.available_balance_delta, Decimal::ZERO);

    assert_eq!(data.positions[&sub(2)].quantity, dec(3));
    assert_eq!(data.positions[&sub(2)].entry_price, dec(100));
    assert_eq!(data.positions[&sub(1)].quantity, dec(-3));
    assert_eq!(data.positions[&sub(1)].margin, dec(30));

    assert_eq!(data.resting_limit_order_filled_deltas.len(), 1);
    assert_eq!(data.resting_limit_order_filled_deltas[0].fill_quantity, dec(3));

    let buy_event = data.market_buy_order_execution_event.as_ref().unwrap();
    assert_eq!(buy_event.execution_type, ExecutionType::Market);
    assert_eq!(buy_event.trades.len(), 1);
    assert_eq!(buy_event.trades[0].position_delta.execution_price, dec(100));
    let maker_event = data.resting_limit_sell_order_execution_event.as_ref().unwrap();
    assert_eq!(maker_event.execution_type, ExecutionType::LimitMatchRestingOrder);
    assert!(data.market_sell_order_execution_event.is_none());

    let vwap = data.vwap_data.unwrap();
    assert_eq!(vwap.price, dec(100));
    assert_eq!(vwap.quantity, dec(3));
    assert_eq!(vwap.market_type, MarketType::Perpetual);
    assert_eq!(data.auction_fee_reward, Decimal::ZERO);
}

#[test]
fn taker_walks_levels_and_refunds_remainder() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)));
    reader.resting.push(limit_order(2, false, 100, 4, 40, 100));
    reader.resting.push(limit_order(3, false, 105, 3, 30, 101));
    reader.transient.push(market_order(1, true, 105, 10, 100, 1));

    let data = run(&reader);

    let taker = data.deposit_deltas[&sub(1)];
    assert_eq!(taker.total_balance_delta, dec(-70));
    assert_eq!(taker.available_balance_delta, dec(30));

    let position = &data.positions[&sub(1)];
    assert_eq!(position.quantity, dec(7));
    assert_eq!(position.entry_price, Decimal::from_str("102.142857142857142857").unwrap());
    assert_eq!(position.margin, dec(70));

    let filled: Vec<_> = data
        .resting_limit_order_filled_deltas
        .iter()
        .map(|d| (d.order.subaccount_id(), d.fill_quantity))
        .collect();
    assert_eq!(filled, vec![(sub(2), dec(4)), (sub(3), dec(3))]);

    let vwap = data.vwap_data.unwrap();
    assert_eq!(vwap.quantity, dec(7));
    assert_eq!(vwap.price, Decimal::from_str("102.142857142857142857").unwrap());
}

#[test]
fn fees_go_to_relayer_and_auction() {
    let market = DerivativeMarket::dummy_perpetual(market_id());
    let mut reader = StaticReader::with_market(market, Some(dec(100)));
    reader.resting.push(limit_order(1, false, 100, 2, 20, 100));
    let mut taker = market_order(2, true, 100, 2, 20, 1);
    taker.fee_hold = Decimal::new(2, 1);
    taker.order.fee_recipient = Some(sub(9));
    reader.transient.push(taker);

    let data = run(&reader);

    let taker = data.deposit_deltas[&sub(2)];
    assert_eq!(taker.total_balance_delta, Decimal::new(-202, 1));
    assert_eq!(taker.available_balance_delta, Decimal::ZERO);

    let maker = data.deposit_deltas[&sub(1)];
    assert_eq!(maker.total_balance_delta, Decimal::new(-201, 1));
    assert_eq!(maker.available_balance_delta, Decimal::ZERO);

    let relayer = data.deposit_deltas[&sub(9)];
    assert_eq!(relayer, DepositDelta::credit(Decimal::new(8, 2)));

    // 0.2 * 0.6 + 0.1
    assert_eq!(data.auction_fee_reward, Decimal::new(22, 2));
    // no schedule, so no reward points
    assert!(data.trading_reward_points.is_empty());
}

#[test]
fn qualified_market_earns_reward_points() {
    let market = DerivativeMarket::dummy_perpetual(market_id());
    let mut reader = StaticReader::with_market(market.clone(), Some(dec(100)));
    reader.schedule = Some(FeeDiscountSchedule {
        tier_infos: vec![],
        quote_denoms: vec![market.quote_denom.clone()],
        disqualified_market_ids: vec![],
    });
    reader.resting.push(limit_order(1, false, 100, 2, 20, 100));
    reader.transient.push(market_order(2, true, 100, 2, 20, 1));

    let data = run(&reader);

    assert_eq!(data.trading_reward_points.get(&sub(2)), Decimal::new(2, 1));
    assert_eq!(data.trading_reward_points.get(&sub(1)), Decimal::new(1, 1));
}

#[test]
fn maker_rebate_earns_no_points_and_reduces_auction() {
    let mut market = DerivativeMarket::dummy_perpetual(market_id());
    market.maker_fee_rate = Decimal::new(-1, 4);
    let staking = FeeDiscountStakingInfo::default();
    let schedule = FeeDiscountSchedule {
        tier_infos: vec![],
        quote_denoms: vec![market.quote_denom.clone()],
        disqualified_market_ids: vec![],
    };
    let reader = StaticReader::with_market(market.clone(), Some(dec(100)));
    let input = MatchingInput {
        fee_config: effective_fee_rates(&market, Some(&schedule), &staking),
        market,
        mark_price: Some(dec(100)),
        funding: None,
        market_buy_orders: vec![market_order(2, true, 100, 2, 20, 1)],
        market_sell_orders: vec![],
        resting_buy_orders: vec![],
        resting_sell_orders: vec![limit_order(1, false, 100, 2, 20, 100)],
        is_liquidation: false,
    };
    let mut positions = PositionStates::new();
    let data = derivative_market_order_execution_data(&reader, input, &mut positions).unwrap();

    // maker receives 200 * 0.0001 = 0.02
    let maker = data.deposit_deltas[&sub(1)];
    assert_eq!(maker.total_balance_delta, Decimal::new(-1998, 2));
    assert_eq!(data.trading_reward_points.get(&sub(1)), Decimal::ZERO);
    // 0.2 - 0.02
    assert_eq!(data.auction_fee_reward, Decimal::new(18, 2));
}

#[test]
fn invalid_orders_are_cancelled_and_refunded() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)));
    // under-margined: needs at least 5
    reader.transient.push(market_order(4, true, 100, 1, 1, 1));
    // reduce-only without a position
    reader.transient.push(market_order(3, false, 90, 1, 0, 2));
    // reduce-only resting buy without a short to reduce
    reader.resting.push(limit_order(5, true, 95, 2, 0, 100));

    let data = run(&reader);

    let reasons: Vec<_> = data
        .cancel_market_order_events
        .iter()
        .map(|e| (e.subaccount_id, e.reason, e.is_limit_cancel))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (sub(4), CancelReason::InsufficientMargin, false),
            (sub(3), CancelReason::NoPositionToReduce, false),
        ]
    );
    assert_eq!(data.cancel_limit_order_events.len(), 1);
    assert!(data.cancel_limit_order_events[0].is_limit_cancel);
    assert_eq!(data.resting_limit_order_cancelled_deltas.len(), 1);
    assert_eq!(data.resting_limit_order_cancelled_deltas[0].cancel_quantity, dec(2));

    assert_eq!(data.deposit_deltas[&sub(4)], DepositDelta::new(dec(1), Decimal::ZERO));
    assert!(!data.deposit_deltas.contains_key(&sub(3)));
    assert!(data.positions.is_empty());
    assert!(data.vwap_data.is_none());
    assert!(data.market_buy_order_execution_event.is_none());
}

#[test]
fn no_cross_means_full_refund() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)));
    reader.resting.push(limit_order(1, false, 100, 5, 50, 100));
    reader.transient.push(market_order(2, true, 99, 1, 10, 1));

    let data = run(&reader);

    assert_eq!(data.deposit_deltas[&sub(2)], DepositDelta::new(dec(10), Decimal::ZERO));
    assert!(data.positions.is_empty());
    assert!(data.resting_limit_order_filled_deltas.is_empty());
    assert!(data.market_buy_order_execution_event.is_none());
    assert!(data.vwap_data.is_none());
}

#[test]
fn reduce_only_close_pays_out_pnl() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)))
        .position(1, 2, 90, 20);
    reader.transient.push(market_order(1, false, 95, 2, 0, 1));
    reader.resting.push(limit_order(2, true, 100, 2, 20, 100));

    let data = run(&reader);

    assert_eq!(data.deposit_deltas[&sub(1)], DepositDelta::credit(dec(40)));
    assert!(data.positions[&sub(1)].is_flat());
    assert_eq!(data.positions[&sub(2)].quantity, dec(2));

    let trade = &data.market_sell_order_execution_event.as_ref().unwrap().trades[0];
    assert_eq!(trade.pnl, dec(20));
    assert_eq!(trade.payout, dec(40));
    assert_eq!(trade.position_delta.quantity, dec(-2));
    assert!(data.resting_limit_buy_order_execution_event.is_some());
}

#[test]
fn funding_is_settled_on_touched_positions() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), Some(dec(100)))
        .position(1, 2, 100, 20);
    reader.funding.insert(
        market_id(),
        PerpetualMarketFunding {
            cumulative_funding: Decimal::ONE,
            cumulative_price: Decimal::ZERO,
            last_timestamp: 0,
        },
    );
    reader.transient.push(market_order(1, true, 100, 1, 10, 1));
    reader.resting.push(limit_order(2, false, 100, 1, 10, 100));

    let data = run(&reader);

    let position = &data.positions[&sub(1)];
    assert_eq!(position.quantity, dec(3));
    assert_eq!(position.margin, dec(28));
    assert_eq!(position.cumulative_funding_entry, Decimal::ONE);
    assert_eq!(
        data.market_buy_order_execution_event.as_ref().unwrap().cumulative_funding,
        Some(Decimal::ONE)
    );
}

#[test]
fn missing_market_yields_none() {
    let reader = StaticReader::default();
    let mut positions = PositionStates::new();
    let staking = FeeDiscountStakingInfo::default();
    let result =
        execute_derivative_market_order_matching(&reader, &market_id(), None, &staking, &mut positions).unwrap();
    assert!(result.is_none());
}

#[test]
fn perpetual_without_mark_price_still_matches() {
    for mark in [None, Some(Decimal::ZERO)] {
        let mut reader = StaticReader::with_market(DerivativeMarket::dummy_feeless(market_id()), mark);
        reader.resting.push(limit_order(1, false, 100, 1, 10, 100));
        reader.transient.push(market_order(2, true, 100, 1, 10, 1));
        reader.transient.push(market_order(3, true, 99, 1, 10, 2));

        let data = run(&reader);

        assert_eq!(data.mark_price, None);
        assert_eq!(data.positions[&sub(2)].quantity, dec(1));
        // unmatched order is refunded in full
        assert_eq!(data.deposit_deltas[&sub(3)], DepositDelta::new(dec(10), Decimal::ZERO));
        assert!(data.vwap_data.is_none());
    }
}

#[test]
fn binary_option_matches_without_mark_price() {
    let mut reader = StaticReader::with_market(DerivativeMarket::dummy_binary_option(market_id()), None);
    reader.resting.push(limit_order(1, false, 60, 1, 40, 100));
    reader.transient.push(market_order(2, true, 60, 1, 60, 1));

    let data = run(&reader);

    assert_eq!(data.positions[&sub(2)].quantity, dec(1));
    let vwap = data.vwap_data.unwrap();
    assert_eq!(vwap.market_type, MarketType::BinaryOption);
    assert_eq!(vwap.price, dec(60));
}

fn liquidation_reader(mark: i64) -> StaticReader {
    let mut market = DerivativeMarket::dummy_feeless(market_id());
    market.maintenance_margin_ratio = Decimal::new(5, 2);
    let mut reader = StaticReader::with_market(market, Some(dec(mark))).position(1, 10, 100, 60);
    reader.resting.push(limit_order(2, true, 95, 10, 95, 100));
    reader
}

#[test]
fn liquidation_closes_at_resting_price() {
    let reader = liquidation_reader(98);
    let mut positions = PositionStates::new();
    let data = execute_liquidation(&reader, &market_id(), &sub(1), &mut positions)
        .unwrap()
        .unwrap();

    assert!(data.is_liquidation);
    // pnl -50, released 60
    assert_eq!(data.deposit_deltas[&sub(1)], DepositDelta::credit(dec(10)));
    assert!(data.positions[&sub(1)].is_flat());
    assert_eq!(data.positions[&sub(2)].quantity, dec(10));

    let event = data.market_sell_order_execution_event.as_ref().unwrap();
    assert!(event.is_liquidation);
    assert_eq!(event.trades[0].order_hash, liquidation_order_hash(&market_id(), &sub(1), 42));
}

#[test]
fn healthy_position_is_not_liquidatable() {
    let reader = liquidation_reader(100);
    let mut positions = PositionStates::new();
    let err = execute_liquidation(&reader, &market_id(), &sub(1), &mut positions).unwrap_err();
    assert!(matches!(err, ExchangeError::PositionNotLiquidatable { .. }));
}

#[test]
fn liquidation_without_mark_price_fails() {
    let mut reader = liquidation_reader(98);
    if let Some(entry) = reader.markets.get_mut(&market_id()) {
        entry.1 = None;
    }
    let mut positions = PositionStates::new();
    let err = execute_liquidation(&reader, &market_id(), &sub(1), &mut positions).unwrap_err();
    assert!(matches!(err, ExchangeError::MarkPriceUnavailable(_)));
}
