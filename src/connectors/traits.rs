use crate::types::{Candle, OrderResponse, TradingPair};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Invoked by a feed for every finished candle, on whatever thread the feed uses.
pub type CandleCallback = Arc<dyn Fn(Candle) + Send + Sync>;

/// What a strategy listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub exchange: String,
    pub pair: TradingPair,
    pub interval: String,
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.exchange, self.pair, self.interval)
    }
}

/// Identifies one subscriber. Several subscribers may listen to the same market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn subscribe(
        &self,
        subscription: &Subscription,
        on_candle: CandleCallback,
    ) -> Result<SubscriptionId>;

    /// Removes this subscriber only; others on the same market keep receiving candles.
    async fn unsubscribe(&self, id: SubscriptionId);

    /// One finite batch of the most recent `limit` candles, oldest first.
    async fn fetch_historical(&self, subscription: &Subscription, limit: usize)
        -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn best_bid(&self, pair: &TradingPair) -> Result<Decimal>;

    async fn best_ask(&self, pair: &TradingPair) -> Result<Decimal>;

    async fn place_market_buy(&self, pair: &TradingPair, quantity: Decimal)
        -> Result<OrderResponse>;

    async fn place_market_sell(&self, pair: &TradingPair, quantity: Decimal)
        -> Result<OrderResponse>;

    async fn wallet_balance(&self, asset: &str) -> Result<Decimal>;
}
