//! Per-run engine context
//!
//! Everything a strategy instance talks to: its own order manager (which owns
//! the risk manager), the notifier and the session clock. Built once per run
//! and handed to the strategy by value.

use std::sync::Arc;

use crate::config::{Config, SessionConfig};
use crate::notify::{notify_best_effort, Notifier};
use crate::oms::OrderManager;

pub struct EngineContext {
    pub oms: OrderManager,
    pub notifier: Arc<dyn Notifier>,
    pub session: SessionConfig,
}

impl EngineContext {
    pub fn new(oms: OrderManager, notifier: Arc<dyn Notifier>, session: SessionConfig) -> Self {
        Self {
            oms,
            notifier,
            session,
        }
    }

    /// Fresh risk manager and execution engine from the config sections
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        let oms = OrderManager::new(config.risk.build(), config.execution.build());
        Self::new(oms, notifier, config.session)
    }

    /// Best-effort notification; failures are only logged
    pub fn notify(&self, text: &str) {
        notify_best_effort(self.notifier.as_ref(), text);
    }
}
