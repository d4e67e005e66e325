//! Order manager: risk admission, simulated execution and the position book

use std::collections::HashMap;

use tracing::{info, warn};

use super::error::{OmsError, OmsResult};
use super::execution::ExecutionEngine;
use super::position_manager::PositionManager;
use super::types::{Fill, Order, OrderOutcome, OrderStatus, Position, RealizedPnl};
use crate::risk::{RiskCheck, RiskManager};
use crate::{Money, Quantity, Side, Symbol, Timestamp};

/// Owns the risk manager, the fill simulator and the position book.
///
/// Cumulative realized PnL lives here and nowhere else; the risk manager's
/// daily-loss check is fed from it on every order.
pub struct OrderManager {
    risk: RiskManager,
    execution: ExecutionEngine,
    book: PositionManager,
    cumulative_realized_pnl: Money,
    orders: Vec<Order>,
    fills: Vec<Fill>,
    realized: Vec<RealizedPnl>,
}

impl OrderManager {
    pub fn new(risk: RiskManager, execution: ExecutionEngine) -> Self {
        Self {
            risk,
            execution,
            book: PositionManager::new(),
            cumulative_realized_pnl: Money::ZERO,
            orders: Vec::new(),
            fills: Vec::new(),
            realized: Vec::new(),
        }
    }

    /// Submit an order: risk check, simulated fill, position update.
    ///
    /// A rejection is an ordinary outcome, not an error.
    pub fn place_order(
        &mut self,
        symbol: &Symbol,
        side: Side,
        quantity: Quantity,
        price: Money,
        timestamp: Timestamp,
    ) -> OrderOutcome {
        let mut order = Order::new(symbol.clone(), side, quantity, price, timestamp);
        info!(
            order_id = order.id,
            symbol = %symbol,
            side = %side,
            qty = quantity,
            price = %price,
            "OMS NEW ORDER"
        );

        let check = self.risk.check_order(
            symbol,
            side,
            quantity,
            price,
            self.cumulative_realized_pnl,
        );

        if let RiskCheck::Rejected(reason) = check {
            order.status = OrderStatus::Rejected;
            warn!(order_id = order.id, symbol = %symbol, "OMS ORDER REJECTED BY RMS: {}", reason);
            self.orders.push(order.clone());
            return OrderOutcome::Rejected { order, reason };
        }

        let fill = self.execution.execute(&order);
        order.status = OrderStatus::Filled;
        info!(
            order_id = fill.order_id,
            symbol = %fill.symbol,
            side = %fill.side,
            qty = fill.quantity,
            filled_price = %fill.filled_price,
            "OMS EXECUTION"
        );

        self.orders.push(order);
        self.fills.push(fill.clone());
        self.update_position(&fill);

        OrderOutcome::Filled(fill)
    }

    fn update_position(&mut self, fill: &Fill) {
        let change = self.book.apply_fill(fill);

        if let Some((pnl, closed_qty)) = change.realized {
            self.cumulative_realized_pnl += pnl;
            self.risk.update_realized_loss(pnl);
            self.realized.push(RealizedPnl {
                order_id: fill.order_id,
                symbol: fill.symbol.clone(),
                closed_side: fill.side.opposite(),
                quantity: closed_qty,
                pnl,
                timestamp: fill.timestamp,
            });

            info!(
                order_id = fill.order_id,
                symbol = %fill.symbol,
                closed_qty,
                pnl = %pnl.round_dp(2),
                cumulative_pnl = %self.cumulative_realized_pnl.round_dp(2),
                "TRADE CLOSED"
            );
        }
    }

    /// Snapshot of the position book
    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        self.book.positions()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.book.get_position(symbol)
    }

    pub fn has_positions(&self) -> bool {
        !self.book.is_flat()
    }

    /// Mark-to-market PnL over every open position.
    ///
    /// Every open symbol must have a mark; a missing one is a caller bug.
    pub fn unrealized_pnl(&self, marks: &HashMap<Symbol, Money>) -> OmsResult<Money> {
        self.book
            .iter()
            .map(|(symbol, position)| {
                marks
                    .get(symbol)
                    .map(|&mark| position.unrealized_pnl(mark))
                    .ok_or_else(|| OmsError::MissingMarkPrice(symbol.clone()))
            })
            .sum()
    }

    /// Flatten every open position at its mark through the normal order path.
    ///
    /// All marks are validated before any order is sent, so a missing mark
    /// leaves the book untouched.
    pub fn square_off_all(
        &mut self,
        marks: &HashMap<Symbol, Money>,
        timestamp: Timestamp,
    ) -> OmsResult<Vec<OrderOutcome>> {
        let mut exits: Vec<(Symbol, Side, Quantity, Money)> = self
            .book
            .iter()
            .map(|(symbol, position)| {
                marks
                    .get(symbol)
                    .map(|&mark| (symbol.clone(), position.side.opposite(), position.quantity, mark))
                    .ok_or_else(|| OmsError::MissingMarkPrice(symbol.clone()))
            })
            .collect::<OmsResult<_>>()?;
        exits.sort_by(|a, b| a.0.cmp(&b.0));

        info!(positions = exits.len(), "SQUARE-OFF TRIGGERED");

        Ok(exits
            .into_iter()
            .map(|(symbol, side, qty, mark)| self.place_order(&symbol, side, qty, mark, timestamp))
            .collect())
    }

    pub fn cumulative_realized_pnl(&self) -> Money {
        self.cumulative_realized_pnl
    }

    /// Every submitted order with its final status
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Execution reports in fill order
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Realized pnl contribution of every position-reducing fill
    pub fn realized_events(&self) -> &[RealizedPnl] {
        &self.realized
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new(RiskManager::default(), ExecutionEngine::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RejectReason;
    use chrono::NaiveDate;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2025, 11, 20)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap()
    }

    fn oms() -> OrderManager {
        OrderManager::new(RiskManager::default(), ExecutionEngine::frictionless())
    }

    fn sym() -> Symbol {
        Symbol::new("NIFTY25NOVFUT")
    }

    #[test]
    fn test_place_order_fills_and_opens_position() {
        let mut oms = oms();
        let outcome = oms.place_order(&sym(), Side::Buy, 10, Money::from_f64(100.0), ts());

        let fill = outcome.fill().unwrap();
        assert_eq!(fill.filled_price, Money::from_f64(100.0));
        assert_eq!(oms.orders()[0].status, OrderStatus::Filled);
        assert_eq!(oms.position(&sym()).unwrap().quantity, 10);
        assert_eq!(oms.risk().exposure(&sym()), 10);
    }

    #[test]
    fn test_rejected_order_leaves_book_alone() {
        let mut oms = oms();
        let outcome = oms.place_order(&sym(), Side::Buy, 150, Money::from_f64(100.0), ts());

        match outcome {
            OrderOutcome::Rejected { order, reason } => {
                assert_eq!(order.status, OrderStatus::Rejected);
                assert!(matches!(reason, RejectReason::ExposureLimit { .. }));
            }
            OrderOutcome::Filled(_) => panic!("order should have been rejected"),
        }
        assert!(oms.positions().is_empty());
        assert!(oms.fills().is_empty());
        assert_eq!(oms.risk().exposure(&sym()), 0);
    }

    #[test]
    fn test_reversal_realizes_pnl() {
        let mut oms = oms();
        oms.place_order(&sym(), Side::Buy, 10, Money::from_f64(100.0), ts());
        oms.place_order(&sym(), Side::Sell, 15, Money::from_f64(110.0), ts());

        assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(100.0));
        let pos = oms.position(&sym()).unwrap();
        assert_eq!(pos.side, Side::Sell);
        assert_eq!(pos.quantity, 5);
        assert_eq!(pos.average_price, Money::from_f64(110.0));
        assert_eq!(oms.risk().exposure(&sym()), -5);
        assert_eq!(oms.realized_events().len(), 1);
        assert_eq!(oms.realized_events()[0].closed_side, Side::Buy);
    }

    #[test]
    fn test_losses_feed_risk_manager() {
        let mut oms = oms();
        oms.place_order(&sym(), Side::Sell, 2, Money::from_f64(100.0), ts());
        oms.place_order(&sym(), Side::Buy, 2, Money::from_f64(130.0), ts());

        assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(-60.0));
        assert_eq!(oms.risk().realized_loss(), Money::from_f64(60.0));
    }

    #[test]
    fn test_unrealized_requires_every_mark() {
        let mut oms = oms();
        oms.place_order(&sym(), Side::Buy, 2, Money::from_f64(100.0), ts());
        oms.place_order(&Symbol::new("35001"), Side::Sell, 1, Money::from_f64(80.0), ts());

        let mut marks = HashMap::new();
        marks.insert(sym(), Money::from_f64(104.0));
        assert_eq!(
            oms.unrealized_pnl(&marks),
            Err(OmsError::MissingMarkPrice(Symbol::new("35001")))
        );

        marks.insert(Symbol::new("35001"), Money::from_f64(70.0));
        assert_eq!(oms.unrealized_pnl(&marks), Ok(Money::from_f64(18.0)));
    }

    #[test]
    fn test_square_off_all_flattens_book() {
        let mut oms = oms();
        oms.place_order(&sym(), Side::Buy, 3, Money::from_f64(100.0), ts());
        oms.place_order(&Symbol::new("35001"), Side::Sell, 1, Money::from_f64(80.0), ts());

        let marks = HashMap::from([
            (sym(), Money::from_f64(105.0)),
            (Symbol::new("35001"), Money::from_f64(90.0)),
        ]);
        let outcomes = oms.square_off_all(&marks, ts()).unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(OrderOutcome::is_filled));
        assert!(oms.positions().is_empty());
        // +15 on the long, -10 on the short
        assert_eq!(oms.cumulative_realized_pnl(), Money::from_f64(5.0));
        assert_eq!(oms.risk().exposure(&sym()), 0);
    }

    #[test]
    fn test_square_off_missing_mark_sends_nothing() {
        let mut oms = oms();
        oms.place_order(&sym(), Side::Buy, 3, Money::from_f64(100.0), ts());
        let orders_before = oms.orders().len();

        let result = oms.square_off_all(&HashMap::new(), ts());
        assert_eq!(result.unwrap_err(), OmsError::MissingMarkPrice(sym()));
        assert_eq!(oms.orders().len(), orders_before);
        assert_eq!(oms.position(&sym()).unwrap().quantity, 3);
    }
}
