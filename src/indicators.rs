//! Technical indicators
//!
//! Streaming indicators over a bounded rolling window of prices. Every
//! function recomputes from the full window it is given; only the EMA
//! carries state between bars, through its recursive form.

use itertools::Itertools;
use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Fixed-capacity price window, oldest sample evicted on overflow
#[derive(Debug, Clone)]
pub struct PriceWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl PriceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// The most recent `n` samples, oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &f64> + Clone {
        self.values.iter().skip(self.values.len().saturating_sub(n))
    }
}

/// Bollinger band triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

/// Simple moving average of the last `period` samples
pub fn sma(window: &PriceWindow, period: usize) -> Option<f64> {
    if period == 0 || window.len() < period {
        return None;
    }
    Some(window.tail(period).mean())
}

/// Population standard deviation of the last `period` samples
pub fn population_std_dev(window: &PriceWindow, period: usize) -> Option<f64> {
    if period == 0 || window.len() < period {
        return None;
    }
    Some(window.tail(period).population_std_dev())
}

/// Calculate Bollinger Bands (mean ± num_std · σ over the last `period` samples)
pub fn bollinger_bands(window: &PriceWindow, period: usize, num_std: f64) -> Option<Bands> {
    let middle = sma(window, period)?;
    let std_dev = population_std_dev(window, period)?;
    Some(Bands {
        lower: middle - num_std * std_dev,
        middle,
        upper: middle + num_std * std_dev,
    })
}

/// One step of the exponential moving average, seeded with the first price
pub fn ema_step(price: f64, prev: Option<f64>, period: usize) -> f64 {
    match prev {
        None => price,
        Some(prev) => {
            let alpha = 2.0 / (period as f64 + 1.0);
            (price - prev) * alpha + prev
        }
    }
}

/// Calculate RSI over the last `period` transitions (`period + 1` samples).
///
/// Gains and losses are simple averages. A window with no losses reads 100.
pub fn rsi(window: &PriceWindow, period: usize) -> Option<f64> {
    if period == 0 || window.len() < period + 1 {
        return None;
    }

    let (gains, losses) = window
        .tail(period + 1)
        .tuple_windows()
        .map(|(prev, next)| next - prev)
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Indicator periods for [`IndicatorEngine`]
#[derive(Debug, Clone, Copy)]
pub struct IndicatorParams {
    pub window: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub rsi_period: usize,
    pub ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            window: 100,
            bb_period: 20,
            bb_std: 2.0,
            rsi_period: 14,
            ema_period: 20,
        }
    }
}

/// Indicator values after the latest sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub ema: f64,
    pub bands: Option<Bands>,
    pub rsi: Option<f64>,
}

impl IndicatorSnapshot {
    /// Bands and RSI both available
    pub fn is_ready(&self) -> bool {
        self.bands.is_some() && self.rsi.is_some()
    }
}

/// Rolling indicator state for a single instrument
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
    window: PriceWindow,
    ema: Option<f64>,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self {
            window: PriceWindow::new(params.window),
            params,
            ema: None,
        }
    }

    /// Push a price and recompute every indicator
    pub fn update(&mut self, price: f64) -> IndicatorSnapshot {
        self.window.push(price);
        let ema = ema_step(price, self.ema, self.params.ema_period);
        self.ema = Some(ema);

        IndicatorSnapshot {
            price,
            ema,
            bands: bollinger_bands(&self.window, self.params.bb_period, self.params.bb_std),
            rsi: rsi(&self.window, self.params.rsi_period),
        }
    }

    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    pub fn last_price(&self) -> Option<f64> {
        self.window.last()
    }
}
