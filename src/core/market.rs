// src/core/market.rs
use crate::indicators::Indicator;
use crate::types::{Candle, TradingPair};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A strategy's view of one market: the latest candle and a bounded history per interval.
/// Indicators are evaluated on read, never on write.
#[derive(Debug, Clone)]
pub struct Market {
    exchange: String,
    pair: TradingPair,
    capacity: usize,
    history: HashMap<String, Vec<Candle>>,
}

impl Market {
    pub fn new(exchange: impl Into<String>, pair: TradingPair, capacity: usize) -> Self {
        Self {
            exchange: exchange.into(),
            pair,
            capacity: capacity.max(1),
            history: HashMap::new(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn update(&mut self, interval: &str, candle: &Candle) {
        let candles = self.history.entry(interval.to_string()).or_default();
        candles.push(candle.clone());
        // Trim in bulk so pushes stay amortized O(1).
        if candles.len() >= self.capacity * 2 {
            let excess = candles.len() - self.capacity;
            candles.drain(..excess);
        }
    }

    pub fn latest_candle(&self, interval: &str) -> Option<&Candle> {
        self.history.get(interval).and_then(|c| c.last())
    }

    pub fn latest_close(&self, interval: &str) -> Option<Decimal> {
        self.latest_candle(interval).map(|c| c.close)
    }

    /// Up to `capacity` most recent candles, oldest first.
    pub fn candles(&self, interval: &str) -> &[Candle] {
        match self.history.get(interval) {
            Some(candles) => &candles[candles.len().saturating_sub(self.capacity)..],
            None => &[],
        }
    }

    pub fn indicator(&self, indicator: &dyn Indicator, interval: &str) -> Option<f64> {
        indicator.compute(self.candles(interval))
    }
}
