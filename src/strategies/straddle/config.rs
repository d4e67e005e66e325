//! Short Straddle Configuration

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::Quantity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StraddleConfig {
    /// Underlying contract name driving the decisions (default: NIFTY-SPOT)
    pub underlying: String,

    /// Option contract name prefix (default: NIFTY)
    pub option_prefix: String,

    /// Expiry code inserted after the prefix (default: 25NOV)
    pub expiry: String,

    /// Strike spacing for ATM rounding (default: 50)
    pub strike_step: f64,

    /// Exit when combined premium rises this fraction above entry (default: 0.25)
    pub stop_loss_pct: f64,

    /// Exit when combined premium falls this fraction below entry (default: 0.50)
    pub target_pct: f64,

    /// Lots sold on each leg (default: 1)
    pub qty_per_side: Quantity,

    /// Earliest entry (default: 09:20:00)
    pub entry_time: NaiveTime,

    /// Open straddle is closed at/after this time (default: 15:10:00)
    pub exit_deadline: NaiveTime,
}

impl Default for StraddleConfig {
    fn default() -> Self {
        Self {
            underlying: "NIFTY-SPOT".to_string(),
            option_prefix: "NIFTY".to_string(),
            expiry: "25NOV".to_string(),
            strike_step: 50.0,
            stop_loss_pct: 0.25,
            target_pct: 0.50,
            qty_per_side: 1,
            entry_time: NaiveTime::from_hms_opt(9, 20, 0).unwrap_or_default(),
            exit_deadline: NaiveTime::from_hms_opt(15, 10, 0).unwrap_or_default(),
        }
    }
}

impl StraddleConfig {
    /// Strike nearest to `spot` on the configured grid
    pub fn atm_strike(&self, spot: f64) -> i64 {
        ((spot / self.strike_step).round() * self.strike_step) as i64
    }

    /// Contract names of the call and put at `strike`
    pub fn option_names(&self, strike: i64) -> (String, String) {
        let base = format!("{}{}{}", self.option_prefix, self.expiry, strike);
        (format!("{}CE", base), format!("{}PE", base))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.strike_step <= 0.0 {
            return Err("strike_step must be positive".to_string());
        }
        if self.qty_per_side == 0 {
            return Err("qty_per_side must be positive".to_string());
        }
        if self.stop_loss_pct <= 0.0 || !(0.0..1.0).contains(&self.target_pct) {
            return Err("stop_loss_pct must be > 0 and target_pct in [0, 1)".to_string());
        }
        if self.exit_deadline <= self.entry_time {
            return Err("exit_deadline must be after entry_time".to_string());
        }
        Ok(())
    }
}
