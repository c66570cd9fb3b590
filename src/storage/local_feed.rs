// src/storage/local_feed.rs
use crate::connectors::fanout::Subscribers;
use crate::connectors::traits::{CandleCallback, MarketDataFeed, Subscription, SubscriptionId};
use crate::storage::CandleStore;
use crate::types::Candle;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Market data feed backed by a [`CandleStore`]. History comes from the store; live
/// candles are whatever is handed to [`LocalFeed::publish`].
pub struct LocalFeed {
    store: Arc<CandleStore>,
    subscribers: Subscribers,
}

impl LocalFeed {
    pub fn new(store: Arc<CandleStore>) -> Self {
        Self {
            store,
            subscribers: Subscribers::new(),
        }
    }

    pub fn store(&self) -> &Arc<CandleStore> {
        &self.store
    }

    pub fn subscriber_count(&self, subscription: &Subscription) -> usize {
        self.subscribers.count(subscription)
    }

    /// Stores `candle` and delivers it to every matching subscriber on the calling thread.
    /// Returns how many subscribers received it.
    pub fn publish(&self, exchange: &str, candle: Candle) -> usize {
        self.store.insert(exchange, &candle);

        let subscription = Subscription {
            exchange: exchange.to_string(),
            pair: candle.pair.clone(),
            interval: candle.interval.clone(),
        };
        self.subscribers.dispatch(&subscription, &candle)
    }
}

#[async_trait]
impl MarketDataFeed for LocalFeed {
    async fn subscribe(
        &self,
        subscription: &Subscription,
        on_candle: CandleCallback,
    ) -> Result<SubscriptionId> {
        let (id, _) = self.subscribers.add(subscription, on_candle);
        debug!("Local subscription {} to {}", id, subscription);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((subscription, _)) = self.subscribers.remove(id) {
            debug!("Local subscription {} to {} removed", id, subscription);
        }
    }

    async fn fetch_historical(&self, subscription: &Subscription, limit: usize) -> Result<Vec<Candle>> {
        Ok(self.store.candles(
            &subscription.exchange,
            &subscription.pair,
            &subscription.interval,
            limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::candle;
    use crate::types::TradingPair;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn subscription() -> Subscription {
        Subscription {
            exchange: "binance".to_string(),
            pair: TradingPair::new("ETH", "BTC"),
            interval: "1m".to_string(),
        }
    }

    #[tokio::test]
    async fn publishes_to_matching_subscribers_until_unsubscribed() {
        let feed = LocalFeed::new(Arc::new(CandleStore::new()));
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let id = feed
            .subscribe(
                &subscription(),
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        assert_eq!(feed.publish("binance", candle(dec!(100), 0)), 1);
        assert_eq!(feed.publish("kraken", candle(dec!(100), 1)), 0);
        feed.unsubscribe(id).await;
        assert_eq!(feed.publish("binance", candle(dec!(101), 2)), 0);

        assert_eq!(received.load(Ordering::SeqCst), 1);
        let history = feed.fetch_historical(&subscription(), 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
