//! Short Straddle Strategy Module
//!
//! Sells the at-the-money call and put once per session and manages the pair
//! as one combined position against a premium stop, a premium target and an
//! exit deadline.

pub mod config;
pub mod strategy;

pub use config::StraddleConfig;
pub use strategy::StraddleStrategy;
