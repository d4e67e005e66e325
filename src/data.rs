//! Market data loading and replay
//!
//! Loads recorded ticks from CSV and replays them onto the [`FeedBus`]
//! at a configurable pace.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::feed::{parse_timestamp, FeedBus, MarketMessage};
use crate::Symbol;

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load ticks from a `symbol,timestamp,price` CSV file.
///
/// Rows are returned in time order; rows sharing a timestamp keep file order,
/// so several instruments recorded side by side interleave correctly.
pub fn load_ticks_csv(path: impl AsRef<Path>) -> Result<Vec<MarketMessage>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open tick file {}", path.display()))?;

    let mut rows = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let symbol = record.get(0).context("Missing symbol column")?.trim();
        if symbol.is_empty() {
            anyhow::bail!("Empty symbol on row {}", row_idx + 1);
        }

        let ts_str = record.get(1).context("Missing timestamp column")?;
        let timestamp = parse_timestamp(ts_str)
            .with_context(|| format!("Failed to parse timestamp on row {}", row_idx + 1))?;

        let price: f64 = record
            .get(2)
            .context("Missing price column")?
            .trim()
            .parse()
            .context(format!("Failed to parse price on row {}", row_idx + 1))?;

        rows.push(MarketMessage::new(Symbol::new(symbol), timestamp, price));
    }

    rows.sort_by_key(|msg| match msg {
        MarketMessage::V1 { timestamp, .. } => *timestamp,
    });

    info!("Loaded {} ticks from {}", rows.len(), path.display());
    Ok(rows)
}

// =============================================================================
// Feed Replay
// =============================================================================

/// Replays recorded ticks onto the bus
pub struct FeedDistributor {
    bus: Arc<FeedBus>,
    ticks: Vec<MarketMessage>,
    speed: Duration,
    rolling: bool,
}

impl FeedDistributor {
    /// `speed` is the pause after each tick; `rolling` restarts at end of data
    pub fn new(bus: Arc<FeedBus>, ticks: Vec<MarketMessage>, speed: Duration, rolling: bool) -> Self {
        Self {
            bus,
            ticks,
            speed,
            rolling,
        }
    }

    /// Publish until the data runs out (or forever when rolling) or `cancel` is set.
    ///
    /// Returns the number of messages published.
    pub fn run(&self, cancel: &AtomicBool) -> usize {
        if self.ticks.is_empty() {
            warn!("Feed distributor has no data to replay");
            return 0;
        }

        info!(
            ticks = self.ticks.len(),
            rolling = self.rolling,
            "Starting feed distributor"
        );

        let mut sent = 0;
        loop {
            for tick in &self.ticks {
                if cancel.load(Ordering::Relaxed) {
                    info!(sent, "Feed distributor cancelled");
                    return sent;
                }

                match self.bus.publish_message(tick) {
                    Ok(receivers) => {
                        debug!(topic = %tick.topic(), receivers, "SENT");
                        sent += 1;
                    }
                    Err(e) => warn!("Failed to encode tick for {}: {}", tick.symbol(), e),
                }

                if !self.speed.is_zero() {
                    sleep(self.speed);
                }
            }

            if !self.rolling {
                break;
            }
            info!("End of dataset reached, restarting...");
        }

        info!(sent, "Feed distributor finished");
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{decode_payload, MARKET_TOPIC_PREFIX};
    use std::io::Write;

    fn write_csv(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}.csv", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_ticks_sorted_by_time() {
        let path = write_csv(
            "ticks_sorted",
            "symbol,timestamp,price\n\
             35001,2025-11-20 09:16:00,101.0\n\
             26000,2025-11-20 09:15:00,24500.0\n\
             35001,2025-11-20 09:15,100.5\n",
        );

        let ticks = load_ticks_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].symbol(), &Symbol::new("26000"));
        assert_eq!(ticks[1].symbol(), &Symbol::new("35001"));
        assert_eq!(ticks[2].topic(), "MARKET:35001");
    }

    #[test]
    fn test_load_ticks_bad_price() {
        let path = write_csv(
            "ticks_bad",
            "symbol,timestamp,price\n35001,2025-11-20 09:15:00,abc\n",
        );
        let result = load_ticks_csv(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_distributor_publishes_all_once() {
        let bus = Arc::new(FeedBus::new());
        let sub = bus.subscribe(vec![MARKET_TOPIC_PREFIX.to_string()], 16);
        let ts = parse_timestamp("2025-11-20 09:15").unwrap();
        let ticks = vec![
            MarketMessage::new(Symbol::new("1"), ts, 10.0),
            MarketMessage::new(Symbol::new("2"), ts, 20.0),
        ];

        let distributor = FeedDistributor::new(bus.clone(), ticks, Duration::ZERO, false);
        assert_eq!(distributor.run(&AtomicBool::new(false)), 2);

        let first = sub.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(decode_payload(&first.payload).unwrap().price, 10.0);
    }

    #[test]
    fn test_distributor_stops_on_cancel() {
        let bus = Arc::new(FeedBus::new());
        let ts = parse_timestamp("2025-11-20 09:15").unwrap();
        let ticks = vec![MarketMessage::new(Symbol::new("1"), ts, 10.0)];

        let distributor = FeedDistributor::new(bus, ticks, Duration::ZERO, true);
        assert_eq!(distributor.run(&AtomicBool::new(true)), 0);
    }
}
