//! Intraday Trading Strategies
//!
//! Simulated intraday trading engine: an order manager with position
//! tracking and simulated fills, a pre-trade risk gate, streaming indicators
//! and per-instance strategy state machines fed from a topic-based market
//! data bus.

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod instruments;
pub mod ledger;
pub mod notify;
pub mod oms;
pub mod risk;
pub mod runner;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use error::EngineError;
pub use types::*;
