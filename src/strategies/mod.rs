//! Intraday Strategies Module
//!
//! Each strategy is a per-bar state machine over its own [`EngineContext`]:
//!
//! ```text
//! WaitingForEntry --entry fill--> InPosition --exit fill--> WaitingForEntry
//!        \                             |
//!         `------ market close -------`+--> Done
//! ```
//!
//! At most one transition happens per bar. At/after the session square-off
//! no entries are evaluated and an open leg is force-closed once; at/after
//! market close any leg is closed and the strategy is Done.

pub mod mean_reversion;
pub mod straddle;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::instruments::InstrumentLookup;
use crate::ledger::{DailySummary, TradeLedger};
use crate::oms::Fill;
use crate::{Bar, Config, Money, Quantity, Side, Symbol, Timestamp};

pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy};
pub use straddle::{StraddleConfig, StraddleStrategy};

/// Decision state of a running strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    WaitingForEntry,
    InPosition,
    /// Terminal; the runner stops feeding bars
    Done,
}

/// Per-bar decision loop driven by [`crate::runner::StrategyRunner`]
pub trait IntradayStrategy: Send {
    /// Display name used in reports and notifications
    fn name(&self) -> &'static str;

    /// Feed topic prefixes to subscribe to
    fn topics(&self) -> Vec<String>;

    fn state(&self) -> StrategyState;

    /// Consume one bar and return the state after it
    fn process_bar(&mut self, bar: &Bar) -> Result<StrategyState, EngineError>;

    /// End-of-run bookkeeping; safe to call whatever state the loop stopped in
    fn finalize(&mut self) -> DailySummary;

    fn ledger(&self) -> &TradeLedger;

    fn context(&self) -> &EngineContext;
}

/// The strategy's own view of its open leg
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPosition {
    pub side: Side,
    pub quantity: Quantity,
    pub entry_fill: Fill,
    pub entry_price: Money,
    pub entry_time: Timestamp,
}

impl StrategyPosition {
    pub fn from_fill(fill: Fill) -> Self {
        Self {
            side: fill.side,
            quantity: fill.quantity,
            entry_price: fill.filled_price,
            entry_time: fill.timestamp,
            entry_fill: fill,
        }
    }
}

/// Build the strategy named in `config.strategy.name`
pub fn create_from_config(
    config: &Config,
    lookup: Arc<dyn InstrumentLookup>,
    ctx: EngineContext,
) -> Result<Box<dyn IntradayStrategy>, EngineError> {
    let name = config
        .strategy_name()
        .map_err(|e| EngineError::Config(e.to_string()))?;

    match name.as_str() {
        "mean_reversion" => {
            let strategy_config: MeanReversionConfig =
                serde_json::from_value(config.strategy.clone()).map_err(|e| {
                    EngineError::Config(format!("Failed to parse mean_reversion config: {}", e))
                })?;
            Ok(Box::new(MeanReversionStrategy::new(
                strategy_config,
                lookup.as_ref(),
                ctx,
            )?))
        }
        "straddle" | "short_straddle" => {
            let strategy_config: StraddleConfig = serde_json::from_value(config.strategy.clone())
                .map_err(|e| EngineError::Config(format!("Failed to parse straddle config: {}", e)))?;
            Ok(Box::new(StraddleStrategy::new(strategy_config, lookup, ctx)?))
        }
        other => Err(EngineError::Config(format!(
            "Unknown strategy '{}'. Available: mean_reversion, straddle",
            other
        ))),
    }
}

/// Session date for reports: the last bar's date, else today
pub(crate) fn session_date(last_seen: Option<Timestamp>) -> NaiveDate {
    last_seen
        .map(|ts| ts.date())
        .unwrap_or_else(|| chrono::Local::now().date_naive())
}

/// Summary from the ledger plus the engine's realized/unrealized view
pub(crate) fn summarize(
    name: &str,
    last_seen: Option<Timestamp>,
    ledger: &TradeLedger,
    ctx: &EngineContext,
    marks: &HashMap<Symbol, Money>,
) -> DailySummary {
    let unrealized = match ctx.oms.unrealized_pnl(marks) {
        Ok(pnl) => Some(pnl),
        Err(e) => {
            tracing::warn!("Unrealized PnL unavailable: {}", e);
            None
        }
    };

    let summary = DailySummary::from_ledger(name, session_date(last_seen), ledger)
        .with_engine_state(
            ctx.oms.cumulative_realized_pnl(),
            ctx.oms.positions().len(),
            unrealized,
        );
    tracing::info!("DAILY REPORT: {}", summary.to_message());
    summary
}
