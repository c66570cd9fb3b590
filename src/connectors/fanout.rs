// src/connectors/fanout.rs
use crate::connectors::traits::{CandleCallback, Subscription, SubscriptionId};
use crate::types::Candle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Callbacks per market, each under its own [`SubscriptionId`].
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    markets: Mutex<HashMap<Subscription, Vec<(SubscriptionId, CandleCallback)>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `on_candle`. The flag is true when it is the market's first subscriber.
    pub fn add(&self, subscription: &Subscription, on_candle: CandleCallback) -> (SubscriptionId, bool) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut markets = self.markets.lock().unwrap_or_else(PoisonError::into_inner);
        let callbacks = markets.entry(subscription.clone()).or_default();
        callbacks.push((id, on_candle));
        (id, callbacks.len() == 1)
    }

    /// Drops one subscriber. Returns its market and whether that market has no
    /// subscribers left; `None` for an unknown id.
    pub fn remove(&self, id: SubscriptionId) -> Option<(Subscription, bool)> {
        let mut markets = self.markets.lock().unwrap_or_else(PoisonError::into_inner);
        let subscription = markets
            .iter()
            .find(|(_, callbacks)| callbacks.iter().any(|(sid, _)| *sid == id))
            .map(|(subscription, _)| subscription.clone())?;

        let callbacks = markets.get_mut(&subscription)?;
        callbacks.retain(|(sid, _)| *sid != id);
        let last = callbacks.is_empty();
        if last {
            markets.remove(&subscription);
        }
        Some((subscription, last))
    }

    pub fn count(&self, subscription: &Subscription) -> usize {
        self.markets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription)
            .map_or(0, Vec::len)
    }

    /// Calls every callback of the market outside the lock. Returns how many were called.
    pub fn dispatch(&self, subscription: &Subscription, candle: &Candle) -> usize {
        let callbacks: Vec<CandleCallback> = self
            .markets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription)
            .map(|callbacks| callbacks.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(candle.clone());
        }
        callbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::candle;
    use crate::types::TradingPair;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn market(interval: &str) -> Subscription {
        Subscription {
            exchange: "binance".to_string(),
            pair: TradingPair::new("ETH", "BTC"),
            interval: interval.to_string(),
        }
    }

    fn counter() -> (Arc<AtomicU64>, CandleCallback) {
        let hits = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&hits);
        (hits, Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn subscribers_on_one_market_leave_independently() {
        let subscribers = Subscribers::new();
        let (first_hits, first_cb) = counter();
        let (second_hits, second_cb) = counter();

        let (first, first_is_new) = subscribers.add(&market("1m"), first_cb);
        let (second, second_is_new) = subscribers.add(&market("1m"), second_cb);
        assert!(first_is_new);
        assert!(!second_is_new);
        assert_ne!(first, second);

        assert_eq!(subscribers.remove(first), Some((market("1m"), false)));
        assert_eq!(subscribers.dispatch(&market("1m"), &candle(dec!(100), 0)), 1);
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);

        assert_eq!(subscribers.remove(second), Some((market("1m"), true)));
        assert_eq!(subscribers.remove(second), None);
        assert_eq!(subscribers.count(&market("1m")), 0);
    }

    #[test]
    fn dispatch_only_reaches_the_matching_market() {
        let subscribers = Subscribers::new();
        let (hits, cb) = counter();
        subscribers.add(&market("5m"), cb);

        assert_eq!(subscribers.dispatch(&market("1m"), &candle(dec!(100), 0)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
