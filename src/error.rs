//! Engine-level error types
//!
//! Raised out of a strategy's bar processing and the runner loop. Risk
//! rejections are not errors; they come back as order outcomes.

use thiserror::Error;

use crate::feed::FeedError;
use crate::oms::OmsError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Oms(#[from] OmsError),

    #[error("instrument not found in contracts table: {0}")]
    UnknownInstrument(String),

    #[error("invalid strategy configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("strategy panicked: {0}")]
    StrategyPanic(String),
}
