//! Short Straddle Strategy
//!
//! On the first underlying bar at/after the entry time the ATM call and put
//! are sold at their latest premiums. Option premiums are taken from the
//! strategy's cache of every bar it has seen, so the feed subscription
//! covers all market topics.
//!
//! The pair is one combined position: exit when the combined premium reaches
//! `entry * (1 + stop_loss_pct)` (`STOP_LOSS`), falls to
//! `entry * (1 - target_pct)` (`TARGET`), or the exit deadline passes
//! (`TIME_SQUARE_OFF`). One straddle per session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::feed::MARKET_TOPIC_PREFIX;
use crate::instruments::{require_instrument, InstrumentLookup};
use crate::ledger::{DailySummary, ExitReason, Leg, TradeLedger, TradeRecord};
use crate::oms::OrderOutcome;
use crate::risk::RiskCheck;
use crate::strategies::{summarize, IntradayStrategy, StrategyState};
use crate::{Bar, Money, Quantity, Side, Symbol, Timestamp};

use super::config::StraddleConfig;

pub const STRATEGY_NAME: &str = "Short Straddle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    fn entry_leg(self) -> Leg {
        match self {
            OptionKind::Call => Leg::CallSell,
            OptionKind::Put => Leg::PutSell,
        }
    }

    fn exit_leg(self) -> Leg {
        match self {
            OptionKind::Call => Leg::CallBuy,
            OptionKind::Put => Leg::PutBuy,
        }
    }
}

/// One short option of the pair
#[derive(Debug, Clone, PartialEq)]
pub struct StraddleLeg {
    pub kind: OptionKind,
    pub symbol: Symbol,
    pub entry_price: Money,
    /// Set once the buy-back fills
    pub exit_price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StraddlePosition {
    pub strike: i64,
    pub quantity: Quantity,
    pub call: StraddleLeg,
    pub put: StraddleLeg,
    /// Combined premium collected, from the entry fills
    pub entry_premium: Money,
    pub stop_loss: Money,
    pub target: Money,
    pub entry_time: Timestamp,
}

pub struct StraddleStrategy {
    config: StraddleConfig,
    underlying: Symbol,
    lookup: Arc<dyn InstrumentLookup>,
    ctx: EngineContext,
    state: StrategyState,
    position: Option<StraddlePosition>,
    ledger: TradeLedger,
    /// Latest price per instrument seen on the feed
    last_prices: HashMap<Symbol, f64>,
    last_seen: Option<Timestamp>,
    /// Entry attempted (filled or abandoned) this session
    entered_today: bool,
    squared_off: bool,
}

impl StraddleStrategy {
    pub fn new(
        config: StraddleConfig,
        lookup: Arc<dyn InstrumentLookup>,
        ctx: EngineContext,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let underlying = require_instrument(lookup.as_ref(), &config.underlying)?;

        info!(
            underlying = %config.underlying,
            symbol = %underlying,
            "Short Straddle Strategy initialized"
        );

        Ok(StraddleStrategy {
            config,
            underlying,
            lookup,
            ctx,
            state: StrategyState::WaitingForEntry,
            position: None,
            ledger: TradeLedger::new(),
            last_prices: HashMap::new(),
            last_seen: None,
            entered_today: false,
            squared_off: false,
        })
    }

    pub fn position(&self) -> Option<&StraddlePosition> {
        self.position.as_ref()
    }

    fn marks(&self) -> HashMap<Symbol, Money> {
        self.last_prices
            .iter()
            .map(|(symbol, &price)| (symbol.clone(), Money::from_f64(price)))
            .collect()
    }

    /// Current combined premium of the open pair
    fn combined_premium(&self, pos: &StraddlePosition) -> Option<Money> {
        let call = self.last_prices.get(&pos.call.symbol)?;
        let put = self.last_prices.get(&pos.put.symbol)?;
        Some(Money::from_f64(call + put))
    }

    fn premium_exit(&self) -> Option<ExitReason> {
        let pos = self.position.as_ref()?;
        let current = self.combined_premium(pos)?;
        debug!(current = %current, stop = %pos.stop_loss, target = %pos.target, "Straddle premium");

        if current >= pos.stop_loss {
            Some(ExitReason::StopLoss)
        } else if current <= pos.target {
            Some(ExitReason::Target)
        } else {
            None
        }
    }

    /// Give up on entering for the rest of the session
    fn abandon(&mut self, why: &str) {
        self.entered_today = true;
        warn!("Straddle entry abandoned: {}", why);
        self.ctx.notify(&format!("STRATEGY ABORTED \n• {}", why));
    }

    fn place_straddle(&mut self, spot: f64, timestamp: Timestamp) -> Result<(), EngineError> {
        let strike = self.config.atm_strike(spot);
        let (call_name, put_name) = self.config.option_names(strike);
        let call = require_instrument(self.lookup.as_ref(), &call_name)?;
        let put = require_instrument(self.lookup.as_ref(), &put_name)?;

        info!("Placing straddle at {} | Spot: {} | ATM Strike: {}", timestamp, spot, strike);
        info!("Call token ID : {} | Put token ID : {}", call, put);

        let (Some(&call_premium), Some(&put_premium)) =
            (self.last_prices.get(&call), self.last_prices.get(&put))
        else {
            warn!("No data for option premiums of {} / {}, retrying next bar", call, put);
            return Ok(());
        };

        let qty = self.config.qty_per_side;
        let realized = self.ctx.oms.cumulative_realized_pnl();
        for symbol in [&call, &put] {
            if let RiskCheck::Rejected(reason) =
                self.ctx.oms.risk().preview_order(symbol, Side::Sell, qty, realized)
            {
                self.abandon(&format!("RMS blocked {}: {}", symbol, reason));
                return Ok(());
            }
        }

        let call_fill = match self.ctx.oms.place_order(
            &call,
            Side::Sell,
            qty,
            Money::from_f64(call_premium),
            timestamp,
        ) {
            OrderOutcome::Filled(fill) => fill,
            OrderOutcome::Rejected { reason, .. } => {
                self.abandon(&format!("call leg rejected: {}", reason));
                return Ok(());
            }
        };
        info!("Order executed: {:?}", call_fill);
        self.ledger.record_fill(OptionKind::Call.entry_leg(), call_fill.clone());

        let put_fill = match self.ctx.oms.place_order(
            &put,
            Side::Sell,
            qty,
            Money::from_f64(put_premium),
            timestamp,
        ) {
            OrderOutcome::Filled(fill) => fill,
            OrderOutcome::Rejected { reason, .. } => {
                // Never hold a naked call
                match self.ctx.oms.place_order(
                    &call,
                    Side::Buy,
                    qty,
                    Money::from_f64(call_premium),
                    timestamp,
                ) {
                    OrderOutcome::Filled(fill) => {
                        self.ledger.record_fill(OptionKind::Call.exit_leg(), fill)
                    }
                    OrderOutcome::Rejected { reason, .. } => {
                        error!("Failed to unwind call leg {}: {}", call, reason)
                    }
                }
                self.abandon(&format!("put leg rejected: {}", reason));
                return Ok(());
            }
        };
        info!("Order executed: {:?}", put_fill);
        self.ledger.record_fill(OptionKind::Put.entry_leg(), put_fill.clone());

        let entry_premium = call_fill.filled_price + put_fill.filled_price;
        let position = StraddlePosition {
            strike,
            quantity: qty,
            call: StraddleLeg {
                kind: OptionKind::Call,
                symbol: call,
                entry_price: call_fill.filled_price,
                exit_price: None,
            },
            put: StraddleLeg {
                kind: OptionKind::Put,
                symbol: put,
                entry_price: put_fill.filled_price,
                exit_price: None,
            },
            entry_premium,
            stop_loss: entry_premium * Money::from_f64(1.0 + self.config.stop_loss_pct),
            target: entry_premium * Money::from_f64(1.0 - self.config.target_pct),
            entry_time: timestamp,
        };

        info!(
            strike,
            premium = %entry_premium,
            stop_loss = %position.stop_loss,
            target = %position.target,
            "STRADDLE ENTERED"
        );
        self.ctx.notify(&format!(
            "\nEntry: Short Straddle\nATM Strike={}\nPremium={}\nTime={}",
            strike, entry_premium, timestamp
        ));

        self.position = Some(position);
        self.entered_today = true;
        self.state = StrategyState::InPosition;
        Ok(())
    }

    /// Buy back every open leg at its latest premium.
    ///
    /// Voluntary exits with a rejected leg keep the pair for the next bar.
    /// Forced exits release the exposure of any leg that would not close.
    fn close_straddle(&mut self, reason: ExitReason, timestamp: Timestamp, forced: bool) {
        let Some(mut pos) = self.position.take() else {
            return;
        };

        for leg in [&mut pos.call, &mut pos.put] {
            if leg.exit_price.is_some() {
                continue;
            }
            let price = self
                .last_prices
                .get(&leg.symbol)
                .copied()
                .map(Money::from_f64)
                .unwrap_or(leg.entry_price);

            match self
                .ctx
                .oms
                .place_order(&leg.symbol, Side::Buy, pos.quantity, price, timestamp)
            {
                OrderOutcome::Filled(fill) => {
                    leg.exit_price = Some(fill.filled_price);
                    self.ledger.record_fill(leg.kind.exit_leg(), fill);
                }
                OrderOutcome::Rejected { reason: why, .. } => {
                    warn!("Straddle {:?} leg exit ({}) rejected: {}", leg.kind, reason, why);
                }
            }
        }

        if let (Some(call_exit), Some(put_exit)) = (pos.call.exit_price, pos.put.exit_price) {
            let exit_premium = call_exit + put_exit;
            let realized = TradeRecord::pnl(Side::Sell, pos.entry_premium, exit_premium, pos.quantity);

            self.ledger.record(TradeRecord {
                symbol: Symbol::new(format!("{}+{}", pos.call.symbol, pos.put.symbol)),
                side: Side::Sell,
                quantity: pos.quantity,
                entry_time: pos.entry_time,
                exit_time: timestamp,
                entry_price: pos.entry_premium,
                exit_price: exit_premium,
                realized_pnl: realized,
                exit_reason: reason,
            });
            self.ctx.notify(&format!(
                "\nExit: Straddle\nReason={}\nPnL={}\nTime={}",
                reason, realized, timestamp
            ));
            self.state = StrategyState::WaitingForEntry;
            return;
        }

        if !forced {
            self.position = Some(pos);
            return;
        }

        for leg in [&pos.call, &pos.put] {
            if leg.exit_price.is_none() {
                error!(
                    symbol = %leg.symbol,
                    qty = pos.quantity,
                    "Forced straddle exit ({}) failed; releasing exposure",
                    reason
                );
                self.ctx
                    .oms
                    .risk_mut()
                    .release_order(&leg.symbol, Side::Sell, pos.quantity);
            }
        }
        self.ctx.notify(&format!(
            "EXIT FAILED: Straddle\n• Strike = {}\n• Reason = {}",
            pos.strike, reason
        ));
        self.state = StrategyState::WaitingForEntry;
    }

    fn flatten_residual(&mut self, timestamp: Timestamp) -> Result<(), EngineError> {
        if self.ctx.oms.has_positions() {
            info!("Positions before square-off: {:?}", self.ctx.oms.positions());
            let marks = self.marks();
            self.ctx.oms.square_off_all(&marks, timestamp)?;
        }
        Ok(())
    }
}

impl IntradayStrategy for StraddleStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn topics(&self) -> Vec<String> {
        vec![MARKET_TOPIC_PREFIX.to_string()]
    }

    fn state(&self) -> StrategyState {
        self.state
    }

    fn process_bar(&mut self, bar: &Bar) -> Result<StrategyState, EngineError> {
        if self.state == StrategyState::Done {
            return Ok(StrategyState::Done);
        }

        self.last_prices.insert(bar.symbol.clone(), bar.price);
        self.last_seen = Some(bar.timestamp);

        if bar.symbol != self.underlying {
            return Ok(self.state);
        }
        debug!("Received market data | Time: {} | Spot: {}", bar.timestamp, bar.price);

        let session = self.ctx.session;
        let time = bar.timestamp.time();

        if time >= session.market_close {
            info!("Market closed, terminating strategy");
            if self.position.is_some() {
                self.close_straddle(ExitReason::MarketClose, bar.timestamp, true);
            }
            self.flatten_residual(bar.timestamp)?;
            self.state = StrategyState::Done;
            return Ok(self.state);
        }

        let deadline = self.config.exit_deadline.min(session.square_off);
        if time >= deadline {
            if !self.squared_off {
                self.squared_off = true;
                if self.position.is_some() {
                    let reason = self.premium_exit().unwrap_or(ExitReason::TimeSquareOff);
                    self.close_straddle(reason, bar.timestamp, true);
                }
                self.flatten_residual(bar.timestamp)?;
            }
            return Ok(self.state);
        }

        match self.state {
            StrategyState::WaitingForEntry => {
                if !self.entered_today && time >= self.config.entry_time {
                    self.place_straddle(bar.price, bar.timestamp)?;
                }
            }
            StrategyState::InPosition => {
                if let Some(reason) = self.premium_exit() {
                    info!("Straddle exit triggered ({}) at {}", reason, bar.timestamp);
                    self.close_straddle(reason, bar.timestamp, false);
                }
            }
            StrategyState::Done => {}
        }

        Ok(self.state)
    }

    fn finalize(&mut self) -> DailySummary {
        if self.position.is_some() {
            let timestamp = self
                .last_seen
                .unwrap_or_else(|| chrono::Local::now().naive_local());
            info!("Flattening open straddle on shutdown");
            self.close_straddle(ExitReason::Shutdown, timestamp, true);
        }

        let marks = self.marks();
        summarize(STRATEGY_NAME, self.last_seen, &self.ledger, &self.ctx, &marks)
    }

    fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    fn context(&self) -> &EngineContext {
        &self.ctx
    }
}
