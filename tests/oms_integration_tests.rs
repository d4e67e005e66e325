//! Order manager and risk manager invariants
//!
//! Exposure tracks the position book, realized PnL reconciles with the fills,
//! and rejections leave no trace in either.

use std::collections::HashMap;

use approx::assert_relative_eq;
use chrono::{NaiveDate, NaiveDateTime};

use intraday_strategies::oms::{ExecutionEngine, OmsError, OrderManager, OrderOutcome, OrderStatus};
use intraday_strategies::risk::{RejectReason, RiskManager};
use intraday_strategies::{Money, Quantity, Side, Symbol};

fn ts(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, 20)
        .unwrap()
        .and_hms_opt(10, minute, 0)
        .unwrap()
}

fn oms() -> OrderManager {
    OrderManager::new(RiskManager::default(), ExecutionEngine::frictionless())
}

fn place(oms: &mut OrderManager, symbol: &Symbol, side: Side, qty: Quantity, price: f64) -> OrderOutcome {
    oms.place_order(symbol, side, qty, Money::from_f64(price), ts(0))
}

/// Exposure must equal the signed open quantity on every symbol
fn assert_exposure_matches_book(oms: &OrderManager) {
    for (symbol, exposure) in oms.risk().exposures() {
        let signed = oms
            .position(symbol)
            .map(|p| p.side.signed(p.quantity))
            .unwrap_or(0);
        assert_eq!(*exposure, signed, "exposure drift on {}", symbol);
    }
    for position in oms.positions().values() {
        assert!(position.quantity > 0);
    }
}

#[test]
fn test_re_averaging_same_side() {
    let mut oms = oms();
    let sym = Symbol::new("35001");
    place(&mut oms, &sym, Side::Buy, 10, 100.0);
    place(&mut oms, &sym, Side::Buy, 10, 120.0);

    let position = oms.position(&sym).unwrap();
    assert_eq!(position.side, Side::Buy);
    assert_eq!(position.quantity, 20);
    assert_eq!(position.average_price, Money::from_f64(110.0));
    assert_eq!(oms.cumulative_realized_pnl(), Money::ZERO);
    assert_exposure_matches_book(&oms);
}

#[test]
fn test_reversal_realizes_and_flips() {
    let mut oms = oms();
    let sym = Symbol::new("35001");
    place(&mut oms, &sym, Side::Buy, 10, 100.0);
    place(&mut oms, &sym, Side::Sell, 15, 110.0);

    assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(100.0));
    let position = oms.position(&sym).unwrap();
    assert_eq!(position.side, Side::Sell);
    assert_eq!(position.quantity, 5);
    assert_eq!(position.average_price, Money::from_f64(110.0));
    assert_eq!(oms.risk().exposure(&sym), -5);

    let event = &oms.realized_events()[0];
    assert_eq!(event.closed_side, Side::Buy);
    assert_eq!(event.quantity, 10);
    assert_exposure_matches_book(&oms);
}

#[test]
fn test_exposure_rejection_leaves_no_trace() {
    let mut oms = oms();
    let sym = Symbol::new("35001");

    let outcome = place(&mut oms, &sym, Side::Buy, 150, 100.0);
    match outcome {
        OrderOutcome::Rejected { order, reason } => {
            assert_eq!(order.status, OrderStatus::Rejected);
            assert_eq!(
                reason,
                RejectReason::ExposureLimit {
                    projected: 150,
                    limit: 100
                }
            );
        }
        OrderOutcome::Filled(_) => panic!("order above the exposure limit was filled"),
    }

    assert_eq!(oms.risk().exposure(&sym), 0);
    assert!(oms.position(&sym).is_none());
    assert!(oms.fills().is_empty());
    assert_eq!(oms.orders().len(), 1);
}

#[test]
fn test_zero_quantity_order_rejected() {
    let mut oms = oms();
    let sym = Symbol::new("35001");

    let outcome = place(&mut oms, &sym, Side::Buy, 0, 100.0);
    assert!(matches!(
        outcome,
        OrderOutcome::Rejected {
            reason: RejectReason::InvalidQuantity,
            ..
        }
    ));
    assert!(oms.positions().is_empty());
    assert!(oms.fills().is_empty());

    // Same for a zero-sized add to an open position
    place(&mut oms, &sym, Side::Buy, 5, 100.0);
    place(&mut oms, &sym, Side::Sell, 0, 110.0);
    assert_eq!(oms.position(&sym).unwrap().quantity, 5);
    assert_eq!(oms.cumulative_realized_pnl(), Money::ZERO);
    assert_exposure_matches_book(&oms);
}

#[test]
fn test_oversized_order_after_fill_is_rejected() {
    let mut oms = oms();
    let sym = Symbol::new("35001");
    place(&mut oms, &sym, Side::Buy, 1, 100.0);

    let outcome = place(&mut oms, &sym, Side::Buy, u64::MAX, 100.0);
    assert!(!outcome.is_filled());
    assert_eq!(oms.position(&sym).unwrap().quantity, 1);
    assert_exposure_matches_book(&oms);
}

#[test]
fn test_daily_loss_blocks_new_orders() {
    let mut oms = OrderManager::new(
        RiskManager::new(100, Money::from_f64(50.0)),
        ExecutionEngine::frictionless(),
    );
    let sym = Symbol::new("35001");
    place(&mut oms, &sym, Side::Buy, 10, 100.0);
    place(&mut oms, &sym, Side::Sell, 10, 90.0);
    assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(-100.0));

    let outcome = place(&mut oms, &sym, Side::Buy, 1, 90.0);
    assert!(matches!(
        outcome,
        OrderOutcome::Rejected {
            reason: RejectReason::DailyLossLimit { .. },
            ..
        }
    ));
    assert_eq!(oms.risk().realized_loss(), Money::from_f64(100.0));
}

#[test]
fn test_realized_pnl_reconciles_with_fills() {
    let mut oms = oms();
    let fut = Symbol::new("35001");
    let opt = Symbol::new("40512");

    place(&mut oms, &fut, Side::Buy, 10, 100.0);
    place(&mut oms, &opt, Side::Sell, 4, 150.5);
    place(&mut oms, &fut, Side::Sell, 4, 104.25);
    place(&mut oms, &opt, Side::Buy, 4, 120.0);
    place(&mut oms, &fut, Side::Sell, 6, 99.0);

    // fut: 4 * 4.25 - 6 * 1 = 11; opt: 4 * 30.5 = 122
    let expected = Money::from_f64(133.0);
    let from_events: Money = oms.realized_events().iter().map(|e| e.pnl).sum();
    assert_eq!(oms.cumulative_realized_pnl(), expected);
    assert_eq!(from_events, expected);
    assert!(!oms.has_positions());
    assert_exposure_matches_book(&oms);
}

#[test]
fn test_unrealized_needs_every_mark() {
    let mut oms = oms();
    let fut = Symbol::new("35001");
    let opt = Symbol::new("40512");
    place(&mut oms, &fut, Side::Buy, 2, 100.0);
    place(&mut oms, &opt, Side::Sell, 3, 50.0);

    let mut marks = HashMap::new();
    marks.insert(fut.clone(), Money::from_f64(105.0));
    assert_eq!(
        oms.unrealized_pnl(&marks),
        Err(OmsError::MissingMarkPrice(opt.clone()))
    );

    // Nothing is sent when a mark is missing
    assert!(oms.square_off_all(&marks, ts(5)).is_err());
    assert_eq!(oms.orders().len(), 2);

    marks.insert(opt.clone(), Money::from_f64(40.0));
    let unrealized = oms.unrealized_pnl(&marks).unwrap();
    assert_relative_eq!(unrealized.to_f64(), 40.0);
}

#[test]
fn test_square_off_all_flattens_book() {
    let mut oms = oms();
    let fut = Symbol::new("35001");
    let opt = Symbol::new("40512");
    place(&mut oms, &fut, Side::Buy, 2, 100.0);
    place(&mut oms, &opt, Side::Sell, 3, 50.0);

    let marks = HashMap::from([
        (fut.clone(), Money::from_f64(105.0)),
        (opt.clone(), Money::from_f64(40.0)),
    ]);
    let outcomes = oms.square_off_all(&marks, ts(5)).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(OrderOutcome::is_filled));
    assert!(!oms.has_positions());
    assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(40.0));
    assert_eq!(oms.risk().exposure(&fut), 0);
    assert_eq!(oms.risk().exposure(&opt), 0);
}

#[test]
fn test_order_ids_are_unique_across_engines() {
    let mut a = oms();
    let mut b = oms();
    let sym = Symbol::new("35001");
    place(&mut a, &sym, Side::Buy, 1, 100.0);
    place(&mut b, &sym, Side::Buy, 1, 100.0);
    place(&mut a, &sym, Side::Sell, 1, 100.0);

    let mut ids: Vec<u64> = a.orders().iter().chain(b.orders()).map(|o| o.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_seeded_slippage_is_reproducible() {
    let run = || {
        let mut oms = OrderManager::new(RiskManager::default(), ExecutionEngine::new(0.001, Some(7)));
        let sym = Symbol::new("35001");
        (0..5)
            .filter_map(|_| place(&mut oms, &sym, Side::Buy, 1, 100.0).into_fill())
            .map(|f| f.filled_price)
            .collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(first, run());
    for price in first {
        assert!((99.9..=100.1).contains(&price.to_f64()));
    }
}
