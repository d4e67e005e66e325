//! Core OMS types
//!
//! Orders, fills, positions and the realized-pnl events produced by
//! position-reducing fills.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::risk::RejectReason;
use crate::{Money, Quantity, Side, Symbol, Timestamp};

/// Order ID type - u64 for performance
pub type OrderId = u64;

/// Process-wide counter so ids stay unique across engine instances
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Order status; terminal once Filled or Rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Money,
    pub timestamp: Timestamp,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        price: Money,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: next_order_id(),
            symbol,
            side,
            quantity,
            price,
            timestamp,
            status: OrderStatus::New,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, OrderStatus::Filled | OrderStatus::Rejected)
    }
}

/// Execution report for an accepted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub filled_price: Money,
    pub timestamp: Timestamp,
}

/// Result of submitting an order to the OMS
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Filled(Fill),
    Rejected { order: Order, reason: RejectReason },
}

impl OrderOutcome {
    pub fn fill(&self) -> Option<&Fill> {
        match self {
            OrderOutcome::Filled(fill) => Some(fill),
            OrderOutcome::Rejected { .. } => None,
        }
    }

    pub fn into_fill(self) -> Option<Fill> {
        match self {
            OrderOutcome::Filled(fill) => Some(fill),
            OrderOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled(_))
    }
}

/// Net position on one symbol; quantity is always > 0 while it exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub average_price: Money,
}

impl Position {
    pub fn from_fill(fill: &Fill) -> Self {
        Self {
            symbol: fill.symbol.clone(),
            side: fill.side,
            quantity: fill.quantity,
            average_price: fill.filled_price,
        }
    }

    /// PnL per unit moved from the average price to `price`, signed by side
    pub fn pnl_at(&self, price: Money, quantity: Quantity) -> Money {
        let qty = Money::from_qty(quantity);
        match self.side {
            Side::Buy => (price - self.average_price) * qty,
            Side::Sell => (self.average_price - price) * qty,
        }
    }

    pub fn unrealized_pnl(&self, mark: Money) -> Money {
        self.pnl_at(mark, self.quantity)
    }
}

/// Realized PnL contributed by a single position-reducing fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnl {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub closed_side: Side,
    pub quantity: Quantity,
    pub pnl: Money,
    pub timestamp: Timestamp,
}
