//! Mean Reversion Strategy
//!
//! ## Strategy Logic
//!
//! ### Entry (one leg at a time)
//! - Long: price at/below lower band, RSI < oversold, price > EMA
//! - Short: price at/above upper band, RSI > overbought, price < EMA
//!
//! ### Exit
//! - RSI back through the exit level (`EXIT_RSI`), checked first
//! - Price crosses back through the EMA (`EXIT_EMA`)
//! - Session square-off (`TIME_SQUARE_OFF`) or market close (`MARKET_CLOSE`)
//!
//! Trade PnL comes from the entry and exit fill prices.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::feed::topic_for;
use crate::indicators::{IndicatorEngine, IndicatorSnapshot};
use crate::instruments::{require_instrument, InstrumentLookup};
use crate::ledger::{DailySummary, ExitReason, Leg, TradeLedger, TradeRecord};
use crate::oms::OrderOutcome;
use crate::risk::RiskCheck;
use crate::strategies::{summarize, IntradayStrategy, StrategyPosition, StrategyState};
use crate::{Bar, Money, Side, Symbol, Timestamp};

use super::config::MeanReversionConfig;

pub const STRATEGY_NAME: &str = "Mean Reversion Strategy";

pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
    symbol: Symbol,
    ctx: EngineContext,
    indicators: IndicatorEngine,
    state: StrategyState,
    position: Option<StrategyPosition>,
    ledger: TradeLedger,
    /// Forced square-off already ran this session
    squared_off: bool,
    last_bar: Option<Bar>,
}

impl MeanReversionStrategy {
    pub fn new(
        config: MeanReversionConfig,
        lookup: &dyn InstrumentLookup,
        ctx: EngineContext,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let symbol = require_instrument(lookup, &config.symbol)?;

        info!(
            contract = %config.symbol,
            symbol = %symbol,
            "Mean Reversion Strategy initialized"
        );

        Ok(MeanReversionStrategy {
            indicators: IndicatorEngine::new(config.indicator_params()),
            config,
            symbol,
            ctx,
            state: StrategyState::WaitingForEntry,
            position: None,
            ledger: TradeLedger::new(),
            squared_off: false,
            last_bar: None,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn position(&self) -> Option<&StrategyPosition> {
        self.position.as_ref()
    }

    fn entry_signal(&self, snap: &IndicatorSnapshot) -> Option<Side> {
        let (Some(bands), Some(rsi)) = (snap.bands, snap.rsi) else {
            return None;
        };
        let price = snap.price;

        if price <= bands.lower && rsi < self.config.rsi_oversold && price > snap.ema {
            Some(Side::Buy)
        } else if price >= bands.upper && rsi > self.config.rsi_overbought && price < snap.ema {
            Some(Side::Sell)
        } else {
            None
        }
    }

    fn exit_signal(&self, side: Side, snap: &IndicatorSnapshot) -> Option<ExitReason> {
        let exit_level = self.config.rsi_exit;
        let by_rsi = snap.rsi.is_some_and(|rsi| match side {
            Side::Buy => rsi >= exit_level,
            Side::Sell => rsi <= exit_level,
        });
        let by_ema = match side {
            Side::Buy => snap.price <= snap.ema,
            Side::Sell => snap.price >= snap.ema,
        };

        if by_rsi {
            Some(ExitReason::ExitRsi)
        } else if by_ema {
            Some(ExitReason::ExitEma)
        } else {
            None
        }
    }

    fn try_entry(&mut self, side: Side, bar: &Bar) {
        let qty = self.config.quantity;
        let realized = self.ctx.oms.cumulative_realized_pnl();

        if let RiskCheck::Rejected(reason) =
            self.ctx.oms.risk().preview_order(&self.symbol, side, qty, realized)
        {
            info!("{} entry blocked by RMS: {}", side, reason);
            return;
        }

        let price = Money::from_f64(bar.price);
        match self.ctx.oms.place_order(&self.symbol, side, qty, price, bar.timestamp) {
            OrderOutcome::Filled(fill) => {
                info!("{} executed at {} | Time: {}", side, fill.filled_price, bar.timestamp);
                self.ctx.notify(&format!(
                    "\nEntry: {}\nPrice={}\nTime={}",
                    side, fill.filled_price, bar.timestamp
                ));
                self.ledger.record_fill(Leg::Entry, fill.clone());
                self.position = Some(StrategyPosition::from_fill(fill));
                self.state = StrategyState::InPosition;
            }
            OrderOutcome::Rejected { reason, .. } => {
                info!("Entry order rejected by RMS: {}", reason);
            }
        }
    }

    /// Close the open leg at `price`.
    ///
    /// A rejected voluntary exit keeps the leg for the next bar. A rejected
    /// forced exit releases the leg's exposure and drops it, so the forced
    /// close happens once.
    fn close_position(&mut self, price: f64, timestamp: Timestamp, reason: ExitReason, forced: bool) {
        let Some(pos) = self.position.clone() else {
            debug!("close_position called without an active position");
            return;
        };

        let outcome = self.ctx.oms.place_order(
            &self.symbol,
            pos.side.opposite(),
            pos.quantity,
            Money::from_f64(price),
            timestamp,
        );

        match outcome {
            OrderOutcome::Filled(fill) => {
                let exit_price = fill.filled_price;
                let realized = TradeRecord::pnl(pos.side, pos.entry_price, exit_price, pos.quantity);
                let trade = TradeRecord {
                    symbol: self.symbol.clone(),
                    side: pos.side,
                    quantity: pos.quantity,
                    entry_time: pos.entry_time,
                    exit_time: fill.timestamp,
                    entry_price: pos.entry_price,
                    exit_price,
                    realized_pnl: realized,
                    exit_reason: reason,
                };

                info!("EXIT: Mean Reversion {:?}", trade);
                self.ctx.notify(&format!(
                    "\nExit Order : MEAN REVERSION\n\
                     • Symbol = {}\n\
                     • Side = {}\n\
                     • Qty: = {}\n\
                     • Entry Time = {}\n\
                     • Exit Time = {}\n\
                     • Entry Price = {}\n\
                     • Exit Price = {}\n\
                     • Realized PnL = {}\n\
                     • Reason = {}",
                    self.symbol,
                    if pos.side == Side::Buy { "LONG" } else { "SHORT" },
                    pos.quantity,
                    pos.entry_time,
                    fill.timestamp,
                    pos.entry_price,
                    exit_price,
                    realized,
                    reason
                ));

                self.ledger.record_fill(Leg::Exit, fill);
                self.ledger.record(trade);
                self.position = None;
                self.state = StrategyState::WaitingForEntry;
            }
            OrderOutcome::Rejected { reason: why, .. } if !forced => {
                warn!("Exit ({}) rejected by RMS: {}; holding position", reason, why);
            }
            OrderOutcome::Rejected { reason: why, .. } => {
                error!(
                    symbol = %self.symbol,
                    side = %pos.side,
                    qty = pos.quantity,
                    "Forced exit ({}) rejected by RMS: {}; releasing exposure",
                    reason,
                    why
                );
                self.ctx
                    .oms
                    .risk_mut()
                    .release_order(&self.symbol, pos.side, pos.quantity);
                self.ctx.notify(&format!(
                    "EXIT FAILED: Mean Reversion\n• Symbol = {}\n• Reason = {}\n• RMS: {}",
                    self.symbol, reason, why
                ));
                self.position = None;
                self.state = StrategyState::WaitingForEntry;
            }
        }
    }

    fn marks(&self) -> HashMap<Symbol, Money> {
        self.last_bar
            .iter()
            .map(|bar| (bar.symbol.clone(), Money::from_f64(bar.price)))
            .collect()
    }

    /// Flatten whatever the engine still holds beyond the strategy's own leg
    fn flatten_residual(&mut self, timestamp: Timestamp) -> Result<(), EngineError> {
        if self.ctx.oms.has_positions() {
            info!("Positions before square-off: {:?}", self.ctx.oms.positions());
            let marks = self.marks();
            self.ctx.oms.square_off_all(&marks, timestamp)?;
        }
        Ok(())
    }

    fn square_off(&mut self, bar: &Bar) -> Result<(), EngineError> {
        self.squared_off = true;

        if self.position.is_none() && !self.ctx.oms.has_positions() {
            return Ok(());
        }

        info!("End-of-day square-off at {}", bar.timestamp.time());
        if self.position.is_some() {
            self.close_position(bar.price, bar.timestamp, ExitReason::TimeSquareOff, true);
        }
        self.flatten_residual(bar.timestamp)?;

        let pnl = self.ctx.oms.cumulative_realized_pnl().round_dp(2);
        info!("Final positions after square-off: {:?}", self.ctx.oms.positions());
        info!("Cumulative PnL: {}", pnl);
        self.ctx.notify(&format!(
            "Final square-off at {} | PnL: {}",
            bar.timestamp.format("%H:%M:%S"),
            pnl
        ));
        Ok(())
    }
}

impl IntradayStrategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn topics(&self) -> Vec<String> {
        vec![topic_for(&self.symbol)]
    }

    fn state(&self) -> StrategyState {
        self.state
    }

    fn process_bar(&mut self, bar: &Bar) -> Result<StrategyState, EngineError> {
        if self.state == StrategyState::Done {
            return Ok(StrategyState::Done);
        }
        if bar.symbol != self.symbol {
            debug!(symbol = %bar.symbol, "Ignoring bar for another instrument");
            return Ok(self.state);
        }

        let snap = self.indicators.update(bar.price);
        self.last_bar = Some(bar.clone());

        debug!(
            close = bar.price,
            ema = snap.ema,
            rsi = ?snap.rsi,
            bands = ?snap.bands,
            "Indicators"
        );

        let session = self.ctx.session;
        let time = bar.timestamp.time();

        if time >= session.market_close {
            info!("Market closed, terminating strategy loop");
            if self.position.is_some() {
                self.close_position(bar.price, bar.timestamp, ExitReason::MarketClose, true);
            }
            self.flatten_residual(bar.timestamp)?;
            self.state = StrategyState::Done;
            return Ok(self.state);
        }

        if time >= session.square_off {
            if !self.squared_off {
                self.square_off(bar)?;
            }
            return Ok(self.state);
        }

        match self.state {
            StrategyState::WaitingForEntry => {
                if let Some(side) = self.entry_signal(&snap) {
                    self.try_entry(side, bar);
                }
            }
            StrategyState::InPosition => {
                let exit = self
                    .position
                    .as_ref()
                    .and_then(|pos| self.exit_signal(pos.side, &snap));
                if let Some(reason) = exit {
                    info!("Exit condition triggered ({}) at {}", reason, bar.timestamp);
                    self.close_position(bar.price, bar.timestamp, reason, false);
                }
            }
            StrategyState::Done => {}
        }

        Ok(self.state)
    }

    fn finalize(&mut self) -> DailySummary {
        let marks = self.marks();
        let last_seen = self.last_bar.as_ref().map(|bar| bar.timestamp);
        summarize(STRATEGY_NAME, last_seen, &self.ledger, &self.ctx, &marks)
    }

    fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    fn context(&self) -> &EngineContext {
        &self.ctx
    }
}
