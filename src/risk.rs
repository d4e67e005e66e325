//! Risk management
//!
//! Pre-trade gatekeeper for every order. Tracks signed net exposure per
//! symbol and the session's realized loss tally, and admits or rejects
//! proposed orders against two limits:
//!
//! ```text
//! |net exposure after order| <= max_exposure      (checked first)
//! cumulative realized pnl    >= -max_daily_loss
//! ```
//!
//! Exposure only changes through an accepted [`RiskManager::check_order`]
//! or an explicit [`RiskManager::release_order`].

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::{Money, Quantity, Side, Symbol};

/// Configuration for RiskManager using builder pattern
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum absolute net quantity per symbol
    pub max_exposure: Quantity,
    /// Cumulative realized loss at which new orders are refused
    pub max_daily_loss: Money,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_exposure: 100,
            max_daily_loss: Money::from_i64(20_000),
        }
    }
}

impl RiskConfig {
    /// Set maximum absolute net exposure per symbol
    pub fn with_max_exposure(mut self, max: Quantity) -> Self {
        self.max_exposure = max;
        self
    }

    /// Set the cumulative realized loss limit
    pub fn with_max_daily_loss(mut self, loss: Money) -> Self {
        self.max_daily_loss = loss.abs();
        self
    }

    /// Build the RiskManager
    pub fn build(self) -> RiskManager {
        RiskManager::from_config(self)
    }
}

/// Why an order was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidQuantity,
    ExposureLimit { projected: i64, limit: Quantity },
    DailyLossLimit { realized_pnl: Money, limit: Money },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidQuantity => write!(f, "order quantity must be positive"),
            RejectReason::ExposureLimit { projected, limit } => {
                write!(f, "exposure limit exceeded: projected {} vs limit {}", projected, limit)
            }
            RejectReason::DailyLossLimit {
                realized_pnl,
                limit,
            } => write!(
                f,
                "daily loss breached: realized pnl {} below -{}",
                realized_pnl, limit
            ),
        }
    }
}

/// Outcome of a risk check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskCheck {
    Accepted,
    Rejected(RejectReason),
}

impl RiskCheck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RiskCheck::Accepted)
    }
}

/// Exposure and loss-limit gatekeeper
#[derive(Debug, Clone)]
pub struct RiskManager {
    max_exposure: Quantity,
    max_daily_loss: Money,
    exposure: HashMap<Symbol, i64>,
    realized_loss: Money,
}

impl RiskManager {
    /// Create new risk manager from config (preferred method)
    pub fn from_config(config: RiskConfig) -> Self {
        RiskManager {
            max_exposure: config.max_exposure,
            max_daily_loss: config.max_daily_loss,
            exposure: HashMap::new(),
            realized_loss: Money::ZERO,
        }
    }

    pub fn new(max_exposure: Quantity, max_daily_loss: Money) -> Self {
        RiskConfig::default()
            .with_max_exposure(max_exposure)
            .with_max_daily_loss(max_daily_loss)
            .build()
    }

    /// Evaluate an order without touching exposure.
    ///
    /// Zero quantity is refused outright. Exposure is checked before the loss
    /// limit; the first breach wins.
    pub fn preview_order(
        &self,
        symbol: &Symbol,
        side: Side,
        qty: Quantity,
        current_realized_pnl: Money,
    ) -> RiskCheck {
        if qty == 0 {
            return RiskCheck::Rejected(RejectReason::InvalidQuantity);
        }

        let current = self.exposure(symbol);
        let Some(projected) = current.checked_add(side.signed(qty)) else {
            // Out of i64 range is over any limit
            return RiskCheck::Rejected(RejectReason::ExposureLimit {
                projected: current.saturating_add(side.signed(qty)),
                limit: self.max_exposure,
            });
        };

        if projected.unsigned_abs() > self.max_exposure {
            return RiskCheck::Rejected(RejectReason::ExposureLimit {
                projected,
                limit: self.max_exposure,
            });
        }

        if current_realized_pnl < -self.max_daily_loss {
            return RiskCheck::Rejected(RejectReason::DailyLossLimit {
                realized_pnl: current_realized_pnl,
                limit: self.max_daily_loss,
            });
        }

        RiskCheck::Accepted
    }

    /// Check an order and commit its exposure when accepted
    pub fn check_order(
        &mut self,
        symbol: &Symbol,
        side: Side,
        qty: Quantity,
        price: Money,
        current_realized_pnl: Money,
    ) -> RiskCheck {
        let check = self.preview_order(symbol, side, qty, current_realized_pnl);

        match &check {
            RiskCheck::Accepted => {
                // In range: preview already did the checked add
                let net = self.exposure.entry(symbol.clone()).or_insert(0);
                *net = net.saturating_add(side.signed(qty));
                info!(
                    symbol = %symbol,
                    side = %side,
                    qty,
                    price = %price,
                    exposure = *net,
                    "RMS ACCEPTED"
                );
            }
            RiskCheck::Rejected(
                reason @ (RejectReason::InvalidQuantity | RejectReason::ExposureLimit { .. }),
            ) => {
                warn!(symbol = %symbol, side = %side, qty, "RMS REJECTED: {}", reason);
            }
            RiskCheck::Rejected(reason @ RejectReason::DailyLossLimit { .. }) => {
                error!(symbol = %symbol, side = %side, qty, "RMS REJECTED: {}", reason);
            }
        }

        check
    }

    /// Undo the exposure an accepted order applied.
    ///
    /// Callers release a given order at most once; nothing here guards against
    /// a double release.
    pub fn release_order(&mut self, symbol: &Symbol, side: Side, qty: Quantity) {
        let net = self.exposure.entry(symbol.clone()).or_insert(0);
        *net = net.saturating_sub(side.signed(qty));
        debug!(symbol = %symbol, side = %side, qty, exposure = *net, "RMS exposure released");
    }

    /// Feed back the pnl of a closing fill; only losses accumulate
    pub fn update_realized_loss(&mut self, pnl: Money) {
        if pnl.is_negative() {
            self.realized_loss += pnl.abs();
        }
    }

    /// Signed net exposure for a symbol (zero if never traded)
    pub fn exposure(&self, symbol: &Symbol) -> i64 {
        self.exposure.get(symbol).copied().unwrap_or(0)
    }

    pub fn exposures(&self) -> &HashMap<Symbol, i64> {
        &self.exposure
    }

    pub fn realized_loss(&self) -> Money {
        self.realized_loss
    }

    pub fn max_exposure(&self) -> Quantity {
        self.max_exposure
    }

    pub fn max_daily_loss(&self) -> Money {
        self.max_daily_loss
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        RiskConfig::default().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nifty() -> Symbol {
        Symbol::new("NIFTY25NOVFUT")
    }

    #[test]
    fn test_rejects_oversized_order_without_mutation() {
        let mut rm = RiskManager::default();
        let check = rm.check_order(&nifty(), Side::Buy, 150, Money::from_f64(100.0), Money::ZERO);

        assert_eq!(
            check,
            RiskCheck::Rejected(RejectReason::ExposureLimit {
                projected: 150,
                limit: 100
            })
        );
        assert_eq!(rm.exposure(&nifty()), 0);
    }

    #[test]
    fn test_accept_commits_signed_exposure() {
        let mut rm = RiskManager::default();
        assert!(rm
            .check_order(&nifty(), Side::Buy, 60, Money::from_f64(100.0), Money::ZERO)
            .is_accepted());
        assert!(rm
            .check_order(&nifty(), Side::Sell, 90, Money::from_f64(100.0), Money::ZERO)
            .is_accepted());
        assert_eq!(rm.exposure(&nifty()), -30);

        // -30 - 80 = -110 breaches on the short side
        assert!(!rm
            .check_order(&nifty(), Side::Sell, 80, Money::from_f64(100.0), Money::ZERO)
            .is_accepted());
        assert_eq!(rm.exposure(&nifty()), -30);
    }

    #[test]
    fn test_huge_order_is_rejected_not_overflowed() {
        let mut rm = RiskManager::default();
        assert!(rm
            .check_order(&nifty(), Side::Buy, 1, Money::from_f64(100.0), Money::ZERO)
            .is_accepted());

        let check = rm.check_order(&nifty(), Side::Buy, u64::MAX, Money::from_f64(100.0), Money::ZERO);
        assert_eq!(
            check,
            RiskCheck::Rejected(RejectReason::ExposureLimit {
                projected: i64::MAX,
                limit: 100
            })
        );
        assert_eq!(rm.exposure(&nifty()), 1);

        // Releasing more than was ever held saturates instead of wrapping
        rm.release_order(&nifty(), Side::Sell, u64::MAX);
        assert_eq!(rm.exposure(&nifty()), i64::MAX);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut rm = RiskManager::default();
        let check = rm.check_order(&nifty(), Side::Buy, 0, Money::from_f64(100.0), Money::ZERO);
        assert_eq!(check, RiskCheck::Rejected(RejectReason::InvalidQuantity));
        assert!(rm.exposures().is_empty());
    }

    #[test]
    fn test_exposure_limit_is_inclusive() {
        let mut rm = RiskManager::new(10, Money::from_i64(1_000));
        assert!(rm
            .check_order(&nifty(), Side::Buy, 10, Money::from_f64(1.0), Money::ZERO)
            .is_accepted());
        assert!(!rm
            .check_order(&nifty(), Side::Buy, 1, Money::from_f64(1.0), Money::ZERO)
            .is_accepted());
    }

    #[test]
    fn test_exposure_checked_before_loss() {
        let rm = RiskManager::new(10, Money::from_i64(1_000));
        let check = rm.preview_order(&nifty(), Side::Buy, 50, Money::from_i64(-5_000));
        assert!(matches!(
            check,
            RiskCheck::Rejected(RejectReason::ExposureLimit { .. })
        ));
    }

    #[test]
    fn test_daily_loss_uses_cumulative_pnl() {
        let mut rm = RiskManager::new(100, Money::from_i64(20_000));

        // exactly at the limit is still allowed
        assert!(rm
            .check_order(&nifty(), Side::Buy, 1, Money::from_f64(1.0), Money::from_i64(-20_000))
            .is_accepted());

        let check = rm.check_order(
            &nifty(),
            Side::Buy,
            1,
            Money::from_f64(1.0),
            Money::from_f64(-20_000.01),
        );
        assert!(matches!(
            check,
            RiskCheck::Rejected(RejectReason::DailyLossLimit { .. })
        ));
        assert_eq!(rm.exposure(&nifty()), 1);
    }

    #[test]
    fn test_preview_does_not_commit() {
        let rm = RiskManager::default();
        assert!(rm.preview_order(&nifty(), Side::Buy, 100, Money::ZERO).is_accepted());
        assert_eq!(rm.exposure(&nifty()), 0);
    }

    #[test]
    fn test_release_reverses_acceptance() {
        let mut rm = RiskManager::default();
        rm.check_order(&nifty(), Side::Sell, 40, Money::from_f64(1.0), Money::ZERO);
        rm.release_order(&nifty(), Side::Sell, 40);
        assert_eq!(rm.exposure(&nifty()), 0);

        rm.check_order(&nifty(), Side::Buy, 25, Money::from_f64(1.0), Money::ZERO);
        rm.release_order(&nifty(), Side::Buy, 25);
        assert_eq!(rm.exposure(&nifty()), 0);
    }

    #[test]
    fn test_realized_loss_only_counts_losses() {
        let mut rm = RiskManager::default();
        rm.update_realized_loss(Money::from_f64(500.0));
        rm.update_realized_loss(Money::from_f64(-120.5));
        rm.update_realized_loss(Money::from_f64(-79.5));
        assert_eq!(rm.realized_loss(), Money::from_f64(200.0));
    }
}
