//! Market-data bus
//!
//! Topic-addressed publish/subscribe with prefix filtering. Each subscriber
//! owns a bounded channel; publishing never blocks and a full subscriber
//! channel simply misses the message.
//!
//! Wire payloads are JSON. The current record is tagged and versioned:
//!
//! ```text
//! {"version":"1","symbol":"35001","timestamp":"2025-11-20T09:15:00","price":24510.5}
//! ```
//!
//! Untagged records from older feeds go through [`parse_legacy`].

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Bar, BarValidationError, Symbol, Timestamp};

/// Topic prefix for price updates
pub const MARKET_TOPIC_PREFIX: &str = "MARKET:";

/// Default per-subscriber buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Timestamp layouts accepted from legacy feeds, tried in order
const LEGACY_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("market message missing field '{0}'")]
    MissingField(&'static str),

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unparseable price: {0}")]
    InvalidPrice(String),

    #[error("malformed market message: {0}")]
    Decode(String),

    #[error(transparent)]
    Invalid(#[from] BarValidationError),

    #[error("feed channel disconnected")]
    Disconnected,
}

/// Versioned market-data record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum MarketMessage {
    #[serde(rename = "1")]
    V1 {
        symbol: Symbol,
        timestamp: Timestamp,
        price: f64,
    },
}

impl MarketMessage {
    pub fn new(symbol: Symbol, timestamp: Timestamp, price: f64) -> Self {
        MarketMessage::V1 {
            symbol,
            timestamp,
            price,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketMessage::V1 { symbol, .. } => symbol,
        }
    }

    pub fn topic(&self) -> String {
        topic_for(self.symbol())
    }

    /// Validated bar for strategy consumption
    pub fn into_bar(self) -> Result<Bar, FeedError> {
        match self {
            MarketMessage::V1 {
                symbol,
                timestamp,
                price,
            } => Ok(Bar::new(symbol, timestamp, price)?),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FeedError> {
        serde_json::to_vec(self).map_err(|e| FeedError::Decode(e.to_string()))
    }
}

/// Topic a symbol's prices are published on
pub fn topic_for(symbol: &Symbol) -> String {
    format!("{}{}", MARKET_TOPIC_PREFIX, symbol)
}

/// Decode a payload into a bar.
///
/// Tagged records are decoded strictly; anything without a `version` field
/// goes through the legacy adapter.
pub fn decode_payload(payload: &[u8]) -> Result<Bar, FeedError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| FeedError::Decode(e.to_string()))?;

    if value.get("version").is_some() {
        let message: MarketMessage =
            serde_json::from_value(value).map_err(|e| FeedError::Decode(e.to_string()))?;
        return message.into_bar();
    }

    parse_legacy(&value)
}

/// Adapter for untagged records.
///
/// Accepts `price` or `close`, numeric or string symbols and prices, and
/// ISO or `YYYY-MM-DD HH:MM[:SS]` timestamps.
pub fn parse_legacy(value: &Value) -> Result<Bar, FeedError> {
    let symbol = match value.get("symbol") {
        Some(Value::String(s)) => Symbol::new(s),
        Some(Value::Number(n)) => Symbol::new(n.to_string()),
        Some(other) => return Err(FeedError::Decode(format!("bad symbol: {}", other))),
        None => return Err(FeedError::MissingField("symbol")),
    };

    let raw_price = value
        .get("price")
        .filter(|v| !v.is_null())
        .or_else(|| value.get("close"))
        .ok_or(FeedError::MissingField("price"))?;
    let price = match raw_price {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FeedError::InvalidPrice(n.to_string()))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FeedError::InvalidPrice(s.clone()))?,
        other => return Err(FeedError::InvalidPrice(other.to_string())),
    };

    let timestamp = match value.get("timestamp") {
        Some(Value::String(s)) => parse_timestamp(s)?,
        Some(other) => return Err(FeedError::InvalidTimestamp(other.to_string())),
        None => return Err(FeedError::MissingField("timestamp")),
    };

    Ok(Bar::new(symbol, timestamp, price)?)
}

/// Parse a feed timestamp into exchange-local time
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, FeedError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    LEGACY_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| FeedError::InvalidTimestamp(raw.to_string()))
}

/// One message as delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPacket {
    pub topic: String,
    pub payload: Vec<u8>,
}

struct Subscription {
    prefixes: Vec<String>,
    sender: Sender<FeedPacket>,
}

impl Subscription {
    fn wants(&self, topic: &str) -> bool {
        self.prefixes.iter().any(|p| topic.starts_with(p.as_str()))
    }
}

/// In-process publish/subscribe bus
#[derive(Default)]
pub struct FeedBus {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl FeedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        // A panic while holding the lock leaves the list itself intact
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to every topic starting with any of `prefixes`
    pub fn subscribe(&self, prefixes: Vec<String>, capacity: usize) -> FeedSubscriber {
        let (sender, receiver) = flume::bounded(capacity.max(1));
        debug!(?prefixes, capacity, "feed subscription added");
        self.lock().push(Subscription {
            prefixes: prefixes.clone(),
            sender,
        });
        FeedSubscriber { receiver, prefixes }
    }

    /// Fan a payload out to matching subscribers without blocking.
    ///
    /// Returns how many subscribers received it. Subscribers whose channel is
    /// full miss this message; dropped subscribers are forgotten.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> usize {
        let mut delivered = 0;
        self.lock().retain(|sub| {
            if !sub.wants(topic) {
                return true;
            }
            let packet = FeedPacket {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            };
            match sub.sender.try_send(packet) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(topic, "subscriber channel full, message dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        delivered
    }

    /// Encode and publish a market message on its symbol topic
    pub fn publish_message(&self, message: &MarketMessage) -> Result<usize, FeedError> {
        let payload = message.encode()?;
        Ok(self.publish(&message.topic(), &payload))
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscription; receivers drain what is buffered then disconnect
    pub fn close(&self) {
        self.lock().clear();
    }
}

/// Receiving end of a subscription
pub struct FeedSubscriber {
    receiver: Receiver<FeedPacket>,
    prefixes: Vec<String>,
}

impl FeedSubscriber {
    /// Wait up to `timeout` for the next packet; `Ok(None)` on timeout
    pub fn recv(&self, timeout: Duration) -> Result<Option<FeedPacket>, FeedError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(packet) => Ok(Some(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::Disconnected),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
