//! Outbound notifications
//!
//! Delivery is best effort: a notifier reports what happened to a message,
//! and trading code never branches on it beyond logging.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Telegram caps a message body at this many characters
pub const MAX_MESSAGE_LEN: usize = 4096;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// What happened to an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Skipped { reason: String },
}

/// Messages the notifier refuses outright
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification text is empty")]
    EmptyMessage,

    #[error("notification text is {len} chars, limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}

pub trait Notifier: Send + Sync {
    fn send(&self, text: &str) -> Result<Delivery, NotifyError>;
}

fn validate(text: &str) -> Result<(), NotifyError> {
    if text.trim().is_empty() {
        return Err(NotifyError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(NotifyError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(())
}

/// Send and log the outcome; never fails
pub fn notify_best_effort(notifier: &dyn Notifier, text: &str) {
    match notifier.send(text) {
        Ok(Delivery::Delivered) => debug!("Notification delivered"),
        Ok(Delivery::Skipped { reason }) => debug!("Notification skipped: {}", reason),
        Err(e) => warn!("Notification rejected: {}", e),
    }
}

// =============================================================================
// Telegram
// =============================================================================

/// Telegram Bot API `sendMessage` over a blocking HTTP client.
///
/// Build and use it off the async runtime (e.g. inside `spawn_blocking`).
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/bot{}/sendMessage", TELEGRAM_API_URL, bot_token),
            chat_id: chat_id.to_string(),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        validate(text)?;

        let params = [("chat_id", self.chat_id.as_str()), ("text", text)];
        let response = match self.client.post(&self.url).form(&params).send() {
            Ok(response) => response,
            Err(e) => {
                warn!("Telegram alert error: {}", e);
                return Ok(Delivery::Skipped {
                    reason: format!("transport error: {}", e),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            Ok(Delivery::Delivered)
        } else {
            warn!("Telegram alert rejected with HTTP {}", status);
            Ok(Delivery::Skipped {
                reason: format!("HTTP {}", status),
            })
        }
    }
}

// =============================================================================
// Log-only and in-memory notifiers
// =============================================================================

/// Writes notifications to the log; used when no chat is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        validate(text)?;
        info!("NOTIFY: {}", text);
        Ok(Delivery::Skipped {
            reason: "notifications disabled".to_string(),
        })
    }
}

/// Keeps every accepted message in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, text: &str) -> Result<Delivery, NotifyError> {
        validate(text)?;
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());
        Ok(Delivery::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_oversized() {
        let notifier = MemoryNotifier::new();
        assert_eq!(notifier.send("  "), Err(NotifyError::EmptyMessage));
        assert_eq!(
            notifier.send(&"x".repeat(MAX_MESSAGE_LEN + 1)),
            Err(NotifyError::MessageTooLong {
                len: MAX_MESSAGE_LEN + 1,
                max: MAX_MESSAGE_LEN
            })
        );
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        assert_eq!(notifier.send("Entry: BUY"), Ok(Delivery::Delivered));
        notify_best_effort(&notifier, "Exit: SELL");
        notify_best_effort(&notifier, "");
        assert_eq!(notifier.messages(), vec!["Entry: BUY", "Exit: SELL"]);
    }

    #[test]
    fn test_log_notifier_skips() {
        assert!(matches!(LogNotifier.send("hello"), Ok(Delivery::Skipped { .. })));
    }
}
