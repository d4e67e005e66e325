//! Simulated execution: full immediate fills with bounded random slippage

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::oms::types::{Fill, Order};
use crate::Money;

/// Default slippage bound: ±0.05% of the requested price
pub const DEFAULT_SLIPPAGE_PCT: f64 = 0.0005;

/// Fill simulator drawing slippage uniformly from `[-slippage_pct, +slippage_pct]`
pub struct ExecutionEngine {
    slippage_pct: f64,
    rng: StdRng,
}

impl ExecutionEngine {
    /// Create new execution engine; a seed makes the slippage draws reproducible
    pub fn new(slippage_pct: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            slippage_pct: slippage_pct.abs(),
            rng,
        }
    }

    /// Execution with no price perturbation
    pub fn frictionless() -> Self {
        Self::new(0.0, Some(0))
    }

    pub fn slippage_pct(&self) -> f64 {
        self.slippage_pct
    }

    fn draw_slippage(&mut self) -> f64 {
        if self.slippage_pct == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.slippage_pct..=self.slippage_pct)
    }

    /// Filled price rounded to two decimals (exchange tick precision)
    pub fn fill_price(&mut self, requested: Money) -> Money {
        let slippage = self.draw_slippage();
        Money::from_f64(requested.to_f64() * (1.0 + slippage)).round_dp(2)
    }

    /// Fill the whole order immediately
    pub fn execute(&mut self, order: &Order) -> Fill {
        Fill {
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            filled_price: self.fill_price(order.price),
            timestamp: order.timestamp,
        }
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SLIPPAGE_PCT, None)
    }
}
