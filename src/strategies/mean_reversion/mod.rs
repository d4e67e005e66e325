//! Mean Reversion (Bollinger + RSI + EMA) Strategy Module
//!
//! Single-instrument intraday strategy: fades band touches confirmed by an
//! RSI extreme, filtered by the EMA, and exits when RSI returns to neutral or
//! price crosses back through the EMA.

pub mod config;
pub mod strategy;

pub use config::MeanReversionConfig;
pub use strategy::MeanReversionStrategy;
