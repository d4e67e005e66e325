//! Net position book with average-price accounting

use std::collections::HashMap;

use tracing::info;

use crate::oms::types::{Fill, Position};
use crate::{Money, Symbol};

/// Effect of applying a fill to the book
#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    /// Realized pnl and closed quantity when the fill reduced an opposite position
    pub realized: Option<(Money, u64)>,
    /// Position after the fill, if any remains
    pub position: Option<Position>,
}

/// One net position per symbol
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: HashMap<Symbol, Position>,
}

impl PositionManager {
    /// Create new position manager
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    /// Fold a fill into the book.
    ///
    /// Same side re-averages; opposite side closes up to the held quantity,
    /// and any leftover opens a fresh position on the incoming side at the
    /// fill price. A position that reaches zero is removed; an empty fill
    /// leaves the book as it is.
    pub fn apply_fill(&mut self, fill: &Fill) -> PositionChange {
        if fill.quantity == 0 {
            return PositionChange {
                realized: None,
                position: self.positions.get(&fill.symbol).cloned(),
            };
        }

        let Some(position) = self.positions.get_mut(&fill.symbol) else {
            let opened = Position::from_fill(fill);
            info!(
                symbol = %fill.symbol,
                side = %opened.side,
                qty = opened.quantity,
                avg_price = %opened.average_price,
                "NEW POSITION"
            );
            self.positions.insert(fill.symbol.clone(), opened.clone());
            return PositionChange {
                realized: None,
                position: Some(opened),
            };
        };

        if position.side == fill.side {
            let old_qty = Money::from_qty(position.quantity);
            let add_qty = Money::from_qty(fill.quantity);
            let new_qty = position.quantity + fill.quantity;

            position.average_price = (position.average_price * old_qty
                + fill.filled_price * add_qty)
                / Money::from_qty(new_qty);
            position.quantity = new_qty;

            info!(
                symbol = %fill.symbol,
                side = %position.side,
                qty = position.quantity,
                avg_price = %position.average_price,
                "UPDATED POSITION"
            );
            return PositionChange {
                realized: None,
                position: Some(position.clone()),
            };
        }

        let close_qty = position.quantity.min(fill.quantity);
        let pnl = position.pnl_at(fill.filled_price, close_qty);
        position.quantity -= close_qty;

        if position.quantity == 0 {
            self.positions.remove(&fill.symbol);
        }

        let leftover = fill.quantity - close_qty;
        if leftover > 0 {
            let reversed = Position {
                symbol: fill.symbol.clone(),
                side: fill.side,
                quantity: leftover,
                average_price: fill.filled_price,
            };
            info!(
                symbol = %fill.symbol,
                side = %reversed.side,
                qty = reversed.quantity,
                avg_price = %reversed.average_price,
                "POSITION REVERSED"
            );
            self.positions.insert(fill.symbol.clone(), reversed);
        }

        PositionChange {
            realized: Some((pnl, close_qty)),
            position: self.positions.get(&fill.symbol).cloned(),
        }
    }

    /// Get position for symbol
    pub fn get_position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        &self.positions
    }

    /// Get all positions as an iterator over (Symbol, &Position)
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Position)> {
        self.positions.iter()
    }

    /// Get count of open positions
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::types::OrderId;
    use crate::{Side, Timestamp};
    use chrono::NaiveDate;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2025, 11, 20)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn create_fill(order_id: OrderId, side: Side, price: f64, quantity: u64) -> Fill {
        Fill {
            order_id,
            symbol: Symbol::new("NIFTY25NOVFUT"),
            side,
            quantity,
            filled_price: Money::from_f64(price),
            timestamp: ts(),
        }
    }

    #[test]
    fn test_empty_fill_leaves_book() {
        let mut pm = PositionManager::new();
        let change = pm.apply_fill(&create_fill(1, Side::Buy, 100.0, 0));

        assert_eq!(change.position, None);
        assert!(pm.is_flat());
    }

    #[test]
    fn test_new_position() {
        let mut pm = PositionManager::new();
        let change = pm.apply_fill(&create_fill(1, Side::Buy, 100.0, 10));

        assert!(change.realized.is_none());
        let pos = change.position.unwrap();
        assert_eq!(pos.quantity, 10);
        assert_eq!(pos.average_price, Money::from_f64(100.0));
        assert_eq!(pos.side, Side::Buy);
    }

    #[test]
    fn test_add_to_position_reaverages() {
        let mut pm = PositionManager::new();
        pm.apply_fill(&create_fill(1, Side::Buy, 100.0, 10));
        pm.apply_fill(&create_fill(2, Side::Buy, 120.0, 10));

        let pos = pm.get_position(&Symbol::new("NIFTY25NOVFUT")).unwrap();
        assert_eq!(pos.quantity, 20);
        assert_eq!(pos.average_price, Money::from_f64(110.0));
    }

    #[test]
    fn test_reduce_position() {
        let mut pm = PositionManager::new();
        pm.apply_fill(&create_fill(1, Side::Sell, 200.0, 4));
        let change = pm.apply_fill(&create_fill(2, Side::Buy, 190.0, 1));

        assert_eq!(change.realized, Some((Money::from_f64(10.0), 1)));
        let pos = change.position.unwrap();
        assert_eq!(pos.side, Side::Sell);
        assert_eq!(pos.quantity, 3);
        assert_eq!(pos.average_price, Money::from_f64(200.0));
    }

    #[test]
    fn test_full_close_removes_position() {
        let mut pm = PositionManager::new();
        pm.apply_fill(&create_fill(1, Side::Buy, 100.0, 5));
        let change = pm.apply_fill(&create_fill(2, Side::Sell, 95.0, 5));

        assert_eq!(change.realized, Some((Money::from_f64(-25.0), 5)));
        assert!(change.position.is_none());
        assert!(pm.is_flat());
    }

    #[test]
    fn test_reverse_position() {
        let mut pm = PositionManager::new();
        pm.apply_fill(&create_fill(1, Side::Buy, 100.0, 10));
        let change = pm.apply_fill(&create_fill(2, Side::Sell, 110.0, 15));

        assert_eq!(change.realized, Some((Money::from_f64(100.0), 10)));
        let pos = change.position.unwrap();
        assert_eq!(pos.side, Side::Sell);
        assert_eq!(pos.quantity, 5);
        assert_eq!(pos.average_price, Money::from_f64(110.0));
        assert_eq!(pm.open_position_count(), 1);
    }
}
