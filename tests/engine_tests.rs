//! End-to-end scenarios seeded from the clearing core's design notes: a
//! maker whitelist rejection, a full placement/fill/settlement cycle,
//! window misalignment, position aggregation, maker insolvency, and
//! expiration.

use clearing_core::bus::EventName;
use clearing_core::config::EngineConfig;
use clearing_core::dispatcher::{ClearingHouse, Command, CommandOutcome, NewOrderbookConfig};
use clearing_core::domain::{AccountId, Asset, OrderId, OrdersBounds, ProductTypeId, TimeWindow};
use clearing_core::error::EngineError;
use clearing_core::orderbook::NewOrder;
use clearing_core::product::RangePayoutProduct;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn range_payout_product_type() -> ProductTypeId {
    ProductTypeId::from("range_payout")
}

fn bootstrap() -> ClearingHouse {
    let mut ch = ClearingHouse::new(&EngineConfig::default());
    ch.dispatch_command(Command::RegisterProduct {
        product_type_id: range_payout_product_type(),
        runtime: Arc::new(RangePayoutProduct::new()),
    })
    .unwrap();
    ch
}

fn create_orderbook(ch: &mut ClearingHouse, symbol: &str) -> clearing_core::domain::OrderbookId {
    let outcome = ch
        .dispatch_command(Command::CreateOrderbook(NewOrderbookConfig {
            product_type_id: range_payout_product_type(),
            timeframe: 1000,
            price_step: dec!(5),
            place_orders_bounds: OrdersBounds {
                price_plus_bound: dec!(100),
                price_minus_bound: dec!(100),
                time_buffer: 0,
                time_limit: 60_000,
            },
            update_orders_bounds: OrdersBounds::unbounded(),
            cancel_orders_bounds: OrdersBounds::unbounded(),
            symbol: symbol.to_string(),
        }))
        .unwrap();
    match outcome {
        CommandOutcome::OrderbookId(id) => id,
        _ => panic!("expected OrderbookId"),
    }
}

fn range_payout_order(
    id: &str,
    time_placed: i64,
    trigger_window: TimeWindow,
    size_total: rust_decimal::Decimal,
    start_range: rust_decimal::Decimal,
    end_range: rust_decimal::Decimal,
    multiplier: rust_decimal::Decimal,
) -> NewOrder {
    NewOrder {
        id: OrderId::from(id),
        data: serde_json::json!({
            "start_range": start_range,
            "end_range": end_range,
            "multiplier": multiplier,
            "asset": "USD",
        }),
        size_total,
        time_placed,
        trigger_window,
    }
}

#[test]
fn scenario_1_unauthorized_maker_rejection() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let mut stream = ch.subscribe();
    ch.handle_price_and_time_update("S", dec!(100), 0);

    let order = range_payout_order(
        "order-1",
        0,
        TimeWindow::new(2_000, 4_000),
        dec!(4),
        dec!(110),
        dec!(130),
        dec!(10),
    );

    let result = ch.dispatch_command(Command::PlaceOrder {
        account_id: AccountId::from("unlisted_maker"),
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order,
    });

    match result {
        Err(EngineError::Placement(err)) => assert_eq!(err.reason(), "maker_not_authorized"),
        other => panic!("expected maker_not_authorized rejection, got {other:?}"),
    }

    let mut rejected = 0;
    while let Some(event) = stream.try_recv() {
        if event.name == EventName::OrderRejected {
            rejected += 1;
            assert_eq!(
                event.payload["violatedConstraint"]["reason"],
                "maker_not_authorized"
            );
        }
    }
    assert_eq!(rejected, 1);
}

#[test]
fn scenario_2_placement_fill_and_range_payout_settlement() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let maker = AccountId::from("maker");
    let taker = AccountId::from("taker");
    let usd = Asset::from("USD");

    ch.handle_price_and_time_update("S", dec!(100), 0);
    let mut stream = ch.subscribe();

    ch.dispatch_command(Command::CreditAccount {
        account_id: maker.clone(),
        asset: usd.clone(),
        amount: dec!(100),
        metadata: None,
    })
    .unwrap();
    // The taker needs funds on hand before locking collateral against a fill.
    ch.dispatch_command(Command::CreditAccount {
        account_id: taker.clone(),
        asset: usd.clone(),
        amount: dec!(2),
        metadata: None,
    })
    .unwrap();
    ch.dispatch_command(Command::WhitelistMaker {
        orderbook_id: orderbook_id.clone(),
        maker_id: maker.clone(),
    })
    .unwrap();

    let order = range_payout_order(
        "order-2",
        0,
        TimeWindow::new(2_000, 4_000),
        dec!(4),
        dec!(110),
        dec!(130),
        dec!(10),
    );
    ch.dispatch_command(Command::PlaceOrder {
        account_id: maker.clone(),
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order,
    })
    .unwrap();

    ch.handle_price_and_time_update("S", dec!(100), 2_200);

    ch.dispatch_command(Command::FillOrder {
        account_id: taker.clone(),
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order_id: OrderId::from("order-2"),
        size: dec!(2),
    })
    .unwrap();

    ch.handle_price_and_time_update("S", dec!(110), 2_400);

    assert_eq!(ch.ledger().get_balance(&maker, &usd), dec!(80));
    assert_eq!(ch.ledger().get_balance(&taker, &usd), dec!(22));

    let mut names = Vec::new();
    while let Some(event) = stream.try_recv() {
        if event.name != EventName::BalanceUpdated {
            names.push(event.name);
        }
    }
    assert_eq!(
        names,
        vec![
            EventName::OrderPlaced,
            EventName::PriceUpdate,
            EventName::ClockTick,
            EventName::OrderFilled,
            EventName::PriceUpdate,
            EventName::ClockTick,
            EventName::VerificationHit,
            EventName::PayoutSettled,
        ]
    );
}

#[test]
fn scenario_3_misaligned_trigger_window_is_rejected() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let maker = AccountId::from("maker");
    ch.handle_price_and_time_update("S", dec!(100), 0);
    ch.dispatch_command(Command::WhitelistMaker {
        orderbook_id: orderbook_id.clone(),
        maker_id: maker.clone(),
    })
    .unwrap();

    // (end - start) = 750, not divisible by timeframe = 1000.
    let order = range_payout_order(
        "order-3",
        0,
        TimeWindow::new(2_000, 2_750),
        dec!(4),
        dec!(110),
        dec!(130),
        dec!(10),
    );

    let result = ch.dispatch_command(Command::PlaceOrder {
        account_id: maker,
        orderbook_id,
        product_type_id: range_payout_product_type(),
        order,
    });

    match result {
        Err(EngineError::Placement(err)) => assert_eq!(err.reason(), "time_window_misaligned"),
        other => panic!("expected time_window_misaligned rejection, got {other:?}"),
    }
}

#[test]
fn scenario_4_repeated_fills_aggregate_into_one_position() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let maker = AccountId::from("maker");
    let taker = AccountId::from("taker");
    let usd = Asset::from("USD");

    ch.handle_price_and_time_update("S", dec!(100), 0);
    ch.dispatch_command(Command::CreditAccount {
        account_id: taker.clone(),
        asset: usd,
        amount: dec!(10),
        metadata: None,
    })
    .unwrap();
    ch.dispatch_command(Command::WhitelistMaker {
        orderbook_id: orderbook_id.clone(),
        maker_id: maker.clone(),
    })
    .unwrap();

    let order = range_payout_order(
        "order-4",
        0,
        TimeWindow::new(2_000, 4_000),
        dec!(10),
        dec!(110),
        dec!(130),
        dec!(10),
    );
    ch.dispatch_command(Command::PlaceOrder {
        account_id: maker,
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order,
    })
    .unwrap();

    ch.handle_price_and_time_update("S", dec!(100), 2_100);

    let first = ch
        .dispatch_command(Command::FillOrder {
            account_id: taker.clone(),
            orderbook_id: orderbook_id.clone(),
            product_type_id: range_payout_product_type(),
            order_id: OrderId::from("order-4"),
            size: dec!(2),
        })
        .unwrap();
    let second = ch
        .dispatch_command(Command::FillOrder {
            account_id: taker.clone(),
            orderbook_id: orderbook_id.clone(),
            product_type_id: range_payout_product_type(),
            order_id: OrderId::from("order-4"),
            size: dec!(1),
        })
        .unwrap();

    let first_report = match first {
        CommandOutcome::FillReport(r) => r,
        _ => panic!("expected FillReport"),
    };
    let second_report = match second {
        CommandOutcome::FillReport(r) => r,
        _ => panic!("expected FillReport"),
    };

    assert_eq!(first_report.position.id, second_report.position.id);
    assert_eq!(second_report.position.size, dec!(3));
    assert_eq!(second_report.position.collateral_locked, dec!(3));

    let orderbook = ch.orderbook(&orderbook_id).unwrap();
    let order = orderbook.order(&OrderId::from("order-4")).unwrap();
    assert_eq!(order.size_remaining, second_report.trade.size_remaining);
    assert_eq!(order.size_remaining, dec!(7));
}

#[test]
fn scenario_5_maker_insolvency_unwinds_the_order() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let maker = AccountId::from("maker");
    let taker = AccountId::from("taker");
    let usd = Asset::from("USD");
    let mut stream = ch.subscribe();

    ch.handle_price_and_time_update("S", dec!(100), 0);
    ch.dispatch_command(Command::CreditAccount {
        account_id: maker.clone(),
        asset: usd.clone(),
        amount: dec!(5),
        metadata: None,
    })
    .unwrap();
    ch.dispatch_command(Command::CreditAccount {
        account_id: taker.clone(),
        asset: usd.clone(),
        amount: dec!(20),
        metadata: None,
    })
    .unwrap();
    ch.dispatch_command(Command::WhitelistMaker {
        orderbook_id: orderbook_id.clone(),
        maker_id: maker.clone(),
    })
    .unwrap();

    let order = range_payout_order(
        "order-5",
        0,
        TimeWindow::new(2_000, 4_000),
        dec!(10),
        dec!(110),
        dec!(130),
        dec!(10),
    );
    ch.dispatch_command(Command::PlaceOrder {
        account_id: maker.clone(),
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order,
    })
    .unwrap();

    ch.handle_price_and_time_update("S", dec!(100), 2_100);
    ch.dispatch_command(Command::FillOrder {
        account_id: taker.clone(),
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order_id: OrderId::from("order-5"),
        size: dec!(2),
    })
    .unwrap();

    // multiplier(10) * size(2) = 20 payout owed, but the maker only has 5.
    ch.handle_price_and_time_update("S", dec!(110), 2_400);

    let orderbook = ch.orderbook(&orderbook_id).unwrap();
    assert!(orderbook.order(&OrderId::from("order-5")).is_none());
    assert_eq!(ch.ledger().get_locked(&taker, &usd), dec!(0));
    assert_eq!(ch.ledger().get_balance(&taker, &usd), dec!(20));

    while let Some(event) = stream.try_recv() {
        assert_ne!(event.name, EventName::VerificationHit);
        assert_ne!(event.name, EventName::PayoutSettled);
    }
}

#[test]
fn scenario_6_expiration_drains_pending_positions() {
    let mut ch = bootstrap();
    let orderbook_id = create_orderbook(&mut ch, "S");
    let maker = AccountId::from("maker");
    let taker = AccountId::from("taker");
    let usd = Asset::from("USD");
    let mut stream = ch.subscribe();

    ch.handle_price_and_time_update("S", dec!(100), 0);
    ch.dispatch_command(Command::CreditAccount {
        account_id: taker.clone(),
        asset: usd,
        amount: dec!(10),
        metadata: None,
    })
    .unwrap();
    ch.dispatch_command(Command::WhitelistMaker {
        orderbook_id: orderbook_id.clone(),
        maker_id: maker.clone(),
    })
    .unwrap();

    let order = range_payout_order(
        "order-6",
        0,
        TimeWindow::new(2_000, 4_000),
        dec!(10),
        dec!(110),
        dec!(130),
        dec!(10),
    );
    ch.dispatch_command(Command::PlaceOrder {
        account_id: maker,
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order,
    })
    .unwrap();

    ch.handle_price_and_time_update("S", dec!(100), 2_100);
    ch.dispatch_command(Command::FillOrder {
        account_id: taker,
        orderbook_id: orderbook_id.clone(),
        product_type_id: range_payout_product_type(),
        order_id: OrderId::from("order-6"),
        size: dec!(2),
    })
    .unwrap();

    // Advance past triggerWindow.end (4000) without ever landing in range.
    ch.handle_price_and_time_update("S", dec!(100), 4_000);

    let orderbook = ch.orderbook(&orderbook_id).unwrap();
    assert!(orderbook.order(&OrderId::from("order-6")).is_none());

    let mut expired = 0;
    while let Some(event) = stream.try_recv() {
        if event.name == EventName::PayoutExpired {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
}
