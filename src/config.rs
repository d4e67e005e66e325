//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for notification credentials.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::oms::execution::DEFAULT_SLIPPAGE_PCT;
use crate::oms::ExecutionEngine;
use crate::risk::{RiskConfig, RiskManager};
use crate::Money;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub instruments: InstrumentsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Strategy parameters; `name` selects the policy
    pub strategy: serde_json::Value,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load notification credentials from environment if set
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.notifier.bot_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            config.notifier.chat_id = Some(chat_id);
        }

        Ok(config)
    }

    /// Get strategy name from strategy config
    pub fn strategy_name(&self) -> Result<String> {
        self.strategy
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .context("'name' is required in the 'strategy' section of config. Example: \"strategy\": { \"name\": \"mean_reversion\", ... }")
    }
}

/// Risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    pub max_exposure: u64,
    pub max_daily_loss: f64,
}

impl Default for RiskSection {
    fn default() -> Self {
        RiskSection {
            max_exposure: 100,
            max_daily_loss: 20_000.0,
        }
    }
}

impl RiskSection {
    pub fn build(&self) -> RiskManager {
        RiskConfig::default()
            .with_max_exposure(self.max_exposure)
            .with_max_daily_loss(Money::from_f64(self.max_daily_loss))
            .build()
    }
}

/// Fill simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Slippage bound as a fraction of price
    pub slippage_pct: f64,
    /// Fixed seed for reproducible slippage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            slippage_pct: DEFAULT_SLIPPAGE_PCT,
            seed: None,
        }
    }
}

impl ExecutionConfig {
    pub fn build(&self) -> ExecutionEngine {
        ExecutionEngine::new(self.slippage_pct, self.seed)
    }
}

/// Intraday time boundaries, exchange-local, written as `HH:MM:SS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// No entries at or after this time; open legs are force-closed
    pub square_off: NaiveTime,
    /// Loop terminates at or after this time
    pub market_close: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            square_off: NaiveTime::from_hms_opt(15, 15, 0).unwrap_or_default(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
        }
    }
}

/// Market-data channel and replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub channel_capacity: usize,
    pub recv_timeout_ms: u64,
    /// Pause between replayed ticks
    pub replay_speed_ms: u64,
    /// Restart replay at end of data
    #[serde(default)]
    pub rolling: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            channel_capacity: crate::feed::DEFAULT_CHANNEL_CAPACITY,
            recv_timeout_ms: 1000,
            replay_speed_ms: 0,
            rolling: false,
        }
    }
}

impl FeedConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn replay_speed(&self) -> Duration {
        Duration::from_millis(self.replay_speed_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    pub contracts_csv: String,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        InstrumentsConfig {
            contracts_csv: "data/contracts.csv".to_string(),
        }
    }
}

/// Telegram delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 {
    5
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            enabled: false,
            bot_token: None,
            chat_id: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

impl NotifierConfig {
    /// Telegram when enabled with credentials, otherwise log-only.
    ///
    /// Builds a blocking HTTP client, so call it off the async runtime.
    pub fn build(&self) -> Result<Arc<dyn Notifier>> {
        match (self.enabled, &self.bot_token, &self.chat_id) {
            (true, Some(token), Some(chat_id)) => {
                info!("Telegram notifications enabled");
                let notifier =
                    TelegramNotifier::new(token, chat_id, Duration::from_secs(self.timeout_secs))?;
                Ok(Arc::new(notifier))
            }
            (true, _, _) => {
                tracing::warn!("Notifier enabled without bot_token/chat_id, logging only");
                Ok(Arc::new(LogNotifier))
            }
            _ => Ok(Arc::new(LogNotifier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"strategy": {"name": "mean_reversion"}}"#).unwrap();

        assert_eq!(config.strategy_name().unwrap(), "mean_reversion");
        assert_eq!(config.risk.max_exposure, 100);
        assert_eq!(config.session.square_off, NaiveTime::from_hms_opt(15, 15, 0).unwrap());
        assert_eq!(config.feed.recv_timeout(), Duration::from_secs(1));
        assert!(!config.notifier.enabled);
    }

    #[test]
    fn test_session_times_parse() {
        let config: Config = serde_json::from_str(
            r#"{
                "session": {"square_off": "15:10:00", "market_close": "15:30:00"},
                "risk": {"max_exposure": 10, "max_daily_loss": 500.0},
                "strategy": {"name": "straddle"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.session.square_off, NaiveTime::from_hms_opt(15, 10, 0).unwrap());
        let rms = config.risk.build();
        assert_eq!(rms.max_exposure(), 10);
        assert_eq!(rms.max_daily_loss(), Money::from_f64(500.0));
    }

    #[test]
    fn test_missing_strategy_name_is_error() {
        let config: Config = serde_json::from_str(r#"{"strategy": {}}"#).unwrap();
        assert!(config.strategy_name().is_err());
    }
}
