//! Strategy receive-process loop
//!
//! One runner per strategy instance, on its own blocking thread. Bars are
//! decoded from the feed subscription and handed to the strategy one at a
//! time; the loop ends on cancellation, a terminal strategy state, or a
//! disconnected feed. The daily report is produced and sent on every exit
//! path.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::feed::{decode_payload, FeedError, FeedSubscriber};
use crate::ledger::DailySummary;
use crate::notify::notify_best_effort;
use crate::strategies::{IntradayStrategy, StrategyState};

pub struct StrategyRunner {
    strategy: Box<dyn IntradayStrategy>,
    subscriber: FeedSubscriber,
    recv_timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl StrategyRunner {
    pub fn new(
        strategy: Box<dyn IntradayStrategy>,
        subscriber: FeedSubscriber,
        recv_timeout: Duration,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            strategy,
            subscriber,
            recv_timeout,
            cancel,
        }
    }

    /// Run until done, then finalize.
    ///
    /// A strategy error or panic stops the loop; the report is still sent
    /// before the error is returned.
    pub fn run(mut self) -> Result<DailySummary, EngineError> {
        info!(
            strategy = self.strategy.name(),
            topics = ?self.subscriber.prefixes(),
            "Strategy loop started"
        );

        let mut processed = 0usize;
        let failure = loop {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Cancellation requested, stopping strategy loop");
                break None;
            }

            let packet = match self.subscriber.recv(self.recv_timeout) {
                Ok(Some(packet)) => packet,
                Ok(None) => continue,
                Err(FeedError::Disconnected) => {
                    info!("Market data feed closed");
                    break None;
                }
                Err(e) => break Some(EngineError::from(e)),
            };

            let bar = match decode_payload(&packet.payload) {
                Ok(bar) => bar,
                Err(e) => {
                    warn!(topic = %packet.topic, "Dropping malformed market data: {}", e);
                    continue;
                }
            };

            processed += 1;
            // A panicking strategy still gets finalized and reported
            let result = catch_unwind(AssertUnwindSafe(|| self.strategy.process_bar(&bar)))
                .unwrap_or_else(|payload| Err(EngineError::StrategyPanic(panic_message(payload))));

            match result {
                Ok(StrategyState::Done) => {
                    info!("Strategy reached terminal state");
                    break None;
                }
                Ok(state) => debug!(?state, symbol = %bar.symbol, "bar processed"),
                Err(e) => {
                    error!("Strategy failed on {} at {}: {}", bar.symbol, bar.timestamp, e);
                    break Some(e);
                }
            }
        };

        info!(processed, "Finalizing strategy");
        let summary = self.strategy.finalize();
        notify_best_effort(
            self.strategy.context().notifier.as_ref(),
            &summary.to_message(),
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
