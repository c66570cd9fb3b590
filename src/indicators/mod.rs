//! Pull-based indicators: each one is a pure function over a window of candles.

use crate::types::Candle;
use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{CommodityChannelIndex, RelativeStrengthIndex, SimpleMovingAverage};
use ta::{DataItem, Next};

pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Candles required before `compute` returns a value.
    fn period(&self) -> usize;

    /// Value at the last candle of `window`, oldest first. `None` while the window is too short.
    fn compute(&self, window: &[Candle]) -> Option<f64>;
}

fn closes(window: &[Candle]) -> impl Iterator<Item = f64> + '_ {
    window.iter().filter_map(|c| c.close.to_f64())
}

/// `None` when a price does not fit an f64 or the candle is malformed (low above high).
fn data_item(candle: &Candle) -> Option<DataItem> {
    DataItem::builder()
        .open(candle.open.to_f64()?)
        .high(candle.high.to_f64()?)
        .low(candle.low.to_f64()?)
        .close(candle.close.to_f64()?)
        .volume(candle.volume.to_f64()?)
        .build()
        .ok()
}

/// Simple moving average of closes.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "SMA"
    }

    fn period(&self) -> usize {
        self.period
    }

    fn compute(&self, window: &[Candle]) -> Option<f64> {
        if self.period == 0 || window.len() < self.period {
            return None;
        }
        let mut sma = SimpleMovingAverage::new(self.period).ok()?;
        closes(&window[window.len() - self.period..]).fold(None, |_, close| Some(sma.next(close)))
    }
}

/// Relative strength index of closes, smoothed over the whole window.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "RSI"
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, window: &[Candle]) -> Option<f64> {
        if self.period == 0 || window.len() < self.period() {
            return None;
        }
        let mut rsi = RelativeStrengthIndex::new(self.period).ok()?;
        closes(window).fold(None, |_, close| Some(rsi.next(close)))
    }
}

/// Commodity channel index over the last `period` candles.
#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        "CCI"
    }

    fn period(&self) -> usize {
        self.period
    }

    fn compute(&self, window: &[Candle]) -> Option<f64> {
        if self.period == 0 || window.len() < self.period {
            return None;
        }
        let mut cci = CommodityChannelIndex::new(self.period).ok()?;
        let mut value = None;
        for candle in &window[window.len() - self.period..] {
            value = Some(cci.next(&data_item(candle)?));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::candle;
    use rust_decimal::Decimal;

    fn window(closes: &[i64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| candle(Decimal::from(*c), i as i64))
            .collect()
    }

    #[test]
    fn sma_uses_the_last_period_closes() {
        let sma = Sma::new(3);
        assert_eq!(sma.compute(&window(&[1, 2])), None);
        let value = sma.compute(&window(&[100, 1, 2, 3])).unwrap();
        assert!((value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_bounded() {
        let rsi = Rsi::new(14);
        assert_eq!(rsi.compute(&window(&[1; 14])), None);
        let rising: Vec<i64> = (100..130).collect();
        let value = rsi.compute(&window(&rising)).unwrap();
        assert!((0.0..=100.0).contains(&value));
        assert!(value > 50.0);
    }

    #[test]
    fn cci_is_zero_for_flat_prices_and_negative_after_a_drop() {
        let cci = Cci::new(5);
        assert_eq!(cci.compute(&window(&[10, 10, 10, 10, 10])), Some(0.0));
        let value = cci.compute(&window(&[10, 10, 10, 10, 5])).unwrap();
        assert!(value < -100.0);
        assert_eq!(cci.compute(&window(&[10, 10, 10, 10])), None);
        assert_eq!(Cci::new(0).compute(&window(&[10, 10])), None);
    }

    #[test]
    fn cci_matches_the_textbook_value() {
        // typical price 8 against a mean of 28/3 and a mean deviation of 8/9
        let value = Cci::new(3).compute(&window(&[10, 10, 8])).unwrap();
        assert!((value + 100.0).abs() < 1e-9);
    }
}
