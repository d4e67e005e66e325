//! Order Management System (OMS)
//!
//! Simulated order handling for intraday strategies:
//! - Pre-trade risk admission through [`crate::risk::RiskManager`]
//! - Full immediate fills with bounded random slippage
//! - One net position per symbol with average-price accounting
//! - Realized PnL on every position-reducing fill, unrealized PnL against marks

pub mod error;
pub mod execution;
pub mod manager;
pub mod position_manager;
pub mod types;

// Re-export core types
pub use error::{OmsError, OmsResult};
pub use execution::ExecutionEngine;
pub use manager::OrderManager;
pub use position_manager::PositionManager;
pub use types::{Fill, Order, OrderId, OrderOutcome, OrderStatus, Position, RealizedPnl};
