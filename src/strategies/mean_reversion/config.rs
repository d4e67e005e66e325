//! Mean Reversion Configuration

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorParams;
use crate::Quantity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    /// Contract name, resolved through the contracts table (default: NIFTY25NOVFUT)
    pub symbol: String,

    /// Rolling price window (default: 100)
    pub window: usize,

    /// Bollinger period (default: 20)
    pub bb_period: usize,

    /// Bollinger width in standard deviations (default: 2.0)
    pub bb_std: f64,

    /// RSI period (default: 14)
    pub rsi_period: usize,

    /// EMA period (default: 20)
    pub ema_period: usize,

    /// Order size (default: 1)
    pub quantity: Quantity,

    /// Long entries need RSI below this (default: 30)
    pub rsi_oversold: f64,

    /// Short entries need RSI above this (default: 70)
    pub rsi_overbought: f64,

    /// RSI crossing back through this closes the trade (default: 50)
    pub rsi_exit: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            symbol: "NIFTY25NOVFUT".to_string(),
            window: 100,
            bb_period: 20,
            bb_std: 2.0,
            rsi_period: 14,
            ema_period: 20,
            quantity: 1,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_exit: 50.0,
        }
    }
}

impl MeanReversionConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            window: self.window,
            bb_period: self.bb_period,
            bb_std: self.bb_std,
            rsi_period: self.rsi_period,
            ema_period: self.ema_period,
        }
    }

    /// Window must hold a full band period and RSI lookback
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity == 0 {
            return Err("quantity must be positive".to_string());
        }
        if self.bb_period == 0 || self.rsi_period == 0 || self.ema_period == 0 {
            return Err("indicator periods must be positive".to_string());
        }
        if self.window < self.bb_period.max(self.rsi_period + 1) {
            return Err(format!(
                "window {} too small for bb_period {} / rsi_period {}",
                self.window, self.bb_period, self.rsi_period
            ));
        }
        Ok(())
    }
}
