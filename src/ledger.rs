//! Trade ledger and daily reporting

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::oms::Fill;
use crate::{Money, Quantity, Side, Symbol, Timestamp};

/// Why a strategy position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    ExitRsi,
    ExitEma,
    StopLoss,
    Target,
    TimeSquareOff,
    MarketClose,
    Shutdown,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::ExitRsi => "EXIT_RSI",
            ExitReason::ExitEma => "EXIT_EMA",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::Target => "TARGET",
            ExitReason::TimeSquareOff => "TIME_SQUARE_OFF",
            ExitReason::MarketClose => "MARKET_CLOSE",
            ExitReason::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which leg of a strategy a fill belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Leg {
    Entry,
    Exit,
    CallSell,
    PutSell,
    CallBuy,
    PutBuy,
}

/// A fill tagged with its leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    pub leg: Leg,
    pub fill: Fill,
}

/// One completed round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    /// Side of the entry
    pub side: Side,
    pub quantity: Quantity,
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub entry_price: Money,
    pub exit_price: Money,
    pub realized_pnl: Money,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    /// Trade pnl from entry and exit prices: long gains on a rise, short on a fall
    pub fn pnl(side: Side, entry_price: Money, exit_price: Money, quantity: Quantity) -> Money {
        let qty = Money::from_qty(quantity);
        let pnl = match side {
            Side::Buy => (exit_price - entry_price) * qty,
            Side::Sell => (entry_price - exit_price) * qty,
        };
        pnl.round_dp(2)
    }

    pub fn is_win(&self) -> bool {
        !self.realized_pnl.is_negative()
    }
}

/// Append-only per-strategy record of trades and leg fills
#[derive(Debug, Clone, Default)]
pub struct TradeLedger {
    trades: Vec<TradeRecord>,
    fills: Vec<LegFill>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fill(&mut self, leg: Leg, fill: Fill) {
        info!(?leg, order_id = fill.order_id, price = %fill.filled_price, "FILL RECORDED");
        self.fills.push(LegFill { leg, fill });
    }

    pub fn record(&mut self, trade: TradeRecord) {
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            qty = trade.quantity,
            entry = %trade.entry_price,
            exit = %trade.exit_price,
            pnl = %trade.realized_pnl,
            reason = %trade.exit_reason,
            "TRADE RECORDED"
        );
        self.trades.push(trade);
    }

    pub fn entries(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn fills(&self) -> &[LegFill] {
        &self.fills
    }

    pub fn total_pnl(&self) -> Money {
        self.trades.iter().map(|t| t.realized_pnl).sum()
    }

    /// Trades with pnl >= 0
    pub fn wins(&self) -> usize {
        self.trades.iter().filter(|t| t.is_win()).count()
    }

    pub fn losses(&self) -> usize {
        self.trades.len() - self.wins()
    }

    /// Sum of losing trade magnitudes
    pub fn daily_loss(&self) -> Money {
        self.trades
            .iter()
            .filter(|t| t.realized_pnl.is_negative())
            .map(|t| t.realized_pnl.abs())
            .sum()
    }
}

/// End-of-session report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub strategy: String,
    pub date: NaiveDate,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: Money,
    pub daily_loss: Money,
    pub engine_realized_pnl: Money,
    pub open_positions: usize,
    /// None when some open position had no known mark
    pub unrealized_pnl: Option<Money>,
}

impl DailySummary {
    pub fn from_ledger(strategy: &str, date: NaiveDate, ledger: &TradeLedger) -> Self {
        Self {
            strategy: strategy.to_string(),
            date,
            total_trades: ledger.entries().len(),
            wins: ledger.wins(),
            losses: ledger.losses(),
            total_pnl: ledger.total_pnl(),
            daily_loss: ledger.daily_loss(),
            engine_realized_pnl: Money::ZERO,
            open_positions: 0,
            unrealized_pnl: Some(Money::ZERO),
        }
    }

    pub fn with_engine_state(
        mut self,
        realized_pnl: Money,
        open_positions: usize,
        unrealized_pnl: Option<Money>,
    ) -> Self {
        self.engine_realized_pnl = realized_pnl;
        self.open_positions = open_positions;
        self.unrealized_pnl = unrealized_pnl;
        self
    }

    pub fn to_message(&self) -> String {
        let unrealized = self
            .unrealized_pnl
            .map(|p| p.round_dp(2).to_string())
            .unwrap_or_else(|| "n/a".to_string());

        format!(
            "DAY REPORT: {}\n\
             • Date: {}\n\
             • Total Trades: {}\n\
             • Wins: {}\n\
             • Losses: {}\n\
             • Total PnL: {}\n\
             • Daily Loss Accumulated: {}\n\
             • Engine Realized PnL: {}\n\
             • Open Positions: {}\n\
             • Unrealized PnL: {}",
            self.strategy,
            self.date.format("%Y-%m-%d"),
            self.total_trades,
            self.wins,
            self.losses,
            self.total_pnl.round_dp(2),
            self.daily_loss.round_dp(2),
            self.engine_realized_pnl.round_dp(2),
            self.open_positions,
            unrealized,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2025, 11, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: Symbol::new("35001"),
            side: Side::Buy,
            quantity: 1,
            entry_time: ts(10, 0),
            exit_time: ts(10, 30),
            entry_price: Money::from_f64(100.0),
            exit_price: Money::from_f64(100.0 + pnl),
            realized_pnl: Money::from_f64(pnl),
            exit_reason: ExitReason::ExitRsi,
        }
    }

    #[test]
    fn test_trade_pnl_by_side() {
        let entry = Money::from_f64(100.0);
        let exit = Money::from_f64(97.5);
        assert_eq!(TradeRecord::pnl(Side::Buy, entry, exit, 2), Money::from_f64(-5.0));
        assert_eq!(TradeRecord::pnl(Side::Sell, entry, exit, 2), Money::from_f64(5.0));
    }

    #[test]
    fn test_ledger_tallies() {
        let mut ledger = TradeLedger::new();
        ledger.record(trade(4.0));
        ledger.record(trade(0.0));
        ledger.record(trade(-3.0));

        assert_eq!(ledger.wins(), 2);
        assert_eq!(ledger.losses(), 1);
        assert_eq!(ledger.total_pnl(), Money::from_f64(1.0));
        assert_eq!(ledger.daily_loss(), Money::from_f64(3.0));
    }

    #[test]
    fn test_summary_message() {
        let mut ledger = TradeLedger::new();
        ledger.record(trade(4.0));
        let summary = DailySummary::from_ledger("Mean Reversion Strategy", ts(0, 0).date(), &ledger)
            .with_engine_state(Money::from_f64(4.0), 0, None);

        let msg = summary.to_message();
        assert!(msg.starts_with("DAY REPORT: Mean Reversion Strategy"));
        assert!(msg.contains("• Date: 2025-11-20"));
        assert!(msg.contains("• Total Trades: 1"));
        assert!(msg.contains("• Unrealized PnL: n/a"));
    }

    #[test]
    fn test_exit_reason_wire_name() {
        assert_eq!(
            serde_json::to_string(&ExitReason::TimeSquareOff).unwrap(),
            "\"TIME_SQUARE_OFF\""
        );
        assert_eq!(ExitReason::ExitRsi.to_string(), "EXIT_RSI");
    }
}
