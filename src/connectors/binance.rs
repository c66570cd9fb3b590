// src/connectors/binance.rs
use crate::connectors::fanout::Subscribers;
use crate::connectors::messages::{
    closed_rest_klines, AccountInfo, BinanceKlineEvent, BinanceOrderResponse, BookTicker,
};
use crate::connectors::traits::{
    CandleCallback, ExchangeGateway, MarketDataFeed, Subscription, SubscriptionId,
};
use crate::types::{Candle, OrderResponse, Side, TradingPair};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Largest page GET /api/v3/klines returns.
const MAX_KLINES_PER_REQUEST: usize = 1000;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct BinanceClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
    base_ws_url: String,
    subscribers: Arc<Subscribers>,
    /// One stream task per market, shared by all of its subscribers.
    streams: Mutex<HashMap<Subscription, JoinHandle<()>>>,
}

impl BinanceClient {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
            http_client: Client::new(),
            base_rest_url: "https://api.binance.com".to_string(),
            base_ws_url: "wss://stream.binance.com:9443".to_string(),
            subscribers: Arc::new(Subscribers::new()),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Points the client at other endpoints, e.g. the spot testnet.
    pub fn with_base_urls(mut self, rest_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        self.base_rest_url = rest_url.into();
        self.base_ws_url = ws_url.into();
        self
    }

    /// Markets with an open kline stream.
    pub fn active_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .context("Invalid secret key length")?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T> {
        let full_query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }

    async fn send_public_request<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!(
            "{}{}?{}",
            self.base_rest_url,
            endpoint,
            serde_urlencoded::to_string(params)?
        );
        let response = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn book_ticker(&self, pair: &TradingPair) -> Result<BookTicker> {
        self.send_public_request("/api/v3/ticker/bookTicker", &[("symbol", pair.symbol())])
            .await
            .with_context(|| format!("Failed to fetch book ticker for {}", pair))
    }

    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderResponse> {
        let side_str = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let params = vec![
            ("symbol", pair.symbol()),
            ("side", side_str.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
        ];

        info!("Sending order: {} {} {} MARKET", side_str, quantity, pair.symbol());

        let resp: BinanceOrderResponse = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        Ok(OrderResponse {
            id: resp.order_id.to_string(),
            avg_price: resp.avg_price(),
            symbol: resp.symbol,
            status: resp.status,
            executed_qty: resp.executed_qty,
        })
    }

    fn stream_url(&self, subscription: &Subscription) -> Result<Url> {
        let ws_url = format!(
            "{}/ws/{}@kline_{}",
            self.base_ws_url,
            subscription.pair.symbol().to_lowercase(),
            subscription.interval
        );
        Ok(Url::parse(&ws_url)?)
    }
}

/// Keeps a kline stream open, reconnecting after a drop, and forwards every closed kline
/// to the market's subscribers.
async fn run_kline_stream(url: Url, subscription: Subscription, subscribers: Arc<Subscribers>) {
    loop {
        match connect_async(url.clone()).await {
            Ok((ws_stream, _)) => {
                let (_, mut read) = ws_stream.split();
                info!("WebSocket connected for {}", subscription);

                while let Some(message) = read.next().await {
                    let msg = match message {
                        Ok(msg) => msg,
                        Err(e) => {
                            error!("WebSocket Error for {}: {}", subscription, e);
                            break;
                        }
                    };
                    let Ok(text) = msg.to_text() else { continue };
                    if text.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BinanceKlineEvent>(text) {
                        Ok(event) if event.kline.is_closed => {
                            match event.kline.to_candle(&subscription.pair) {
                                Ok(candle) => {
                                    subscribers.dispatch(&subscription, &candle);
                                }
                                Err(e) => warn!("Dropping kline for {}: {:#}", subscription, e),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Ignoring message on {}: {}", subscription, e),
                    }
                }
            }
            Err(e) => error!("Failed to connect WebSocket for {}: {}", subscription, e),
        }
        warn!("WebSocket for {} closed, reconnecting in {:?}", subscription, RECONNECT_DELAY);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn best_bid(&self, pair: &TradingPair) -> Result<Decimal> {
        Ok(self.book_ticker(pair).await?.bid_price)
    }

    async fn best_ask(&self, pair: &TradingPair) -> Result<Decimal> {
        Ok(self.book_ticker(pair).await?.ask_price)
    }

    async fn place_market_buy(&self, pair: &TradingPair, quantity: Decimal) -> Result<OrderResponse> {
        self.place_market_order(pair, Side::Buy, quantity).await
    }

    async fn place_market_sell(&self, pair: &TradingPair, quantity: Decimal) -> Result<OrderResponse> {
        self.place_market_order(pair, Side::Sell, quantity).await
    }

    async fn wallet_balance(&self, asset: &str) -> Result<Decimal> {
        let resp: AccountInfo = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;

        let balance = resp
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| anyhow!("Asset {} not found in account", asset))?;

        Ok(balance.free)
    }
}

#[async_trait]
impl MarketDataFeed for BinanceClient {
    async fn subscribe(
        &self,
        subscription: &Subscription,
        on_candle: CandleCallback,
    ) -> Result<SubscriptionId> {
        let url = self.stream_url(subscription)?;
        let (id, first) = self.subscribers.add(subscription, on_candle);
        if first {
            info!("Starting WebSocket task for: {}", subscription);
            let task = tokio::spawn(run_kline_stream(
                url,
                subscription.clone(),
                Arc::clone(&self.subscribers),
            ));
            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(subscription.clone(), task);
        }
        debug!("Subscriber {} added to {}", id, subscription);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let Some((subscription, last)) = self.subscribers.remove(id) else {
            return;
        };
        if !last {
            return;
        }
        let task = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription);
        if let Some(task) = task {
            task.abort();
            info!("WebSocket task finished for {}", subscription);
        }
    }

    /// Pages backwards from now until `limit` klines are collected or history runs out.
    async fn fetch_historical(&self, subscription: &Subscription, limit: usize) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::with_capacity(limit);
        let mut end_time: Option<i64> = None;

        while candles.len() < limit {
            let page_size = (limit - candles.len()).min(MAX_KLINES_PER_REQUEST);
            let mut params = vec![
                ("symbol", subscription.pair.symbol()),
                ("interval", subscription.interval.clone()),
                ("limit", page_size.to_string()),
            ];
            if let Some(end) = end_time {
                params.push(("endTime", end.to_string()));
            }

            let rows: Vec<Vec<Value>> = self
                .send_public_request("/api/v3/klines", &params)
                .await
                .with_context(|| format!("Failed to fetch klines for {}", subscription))?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            let page = closed_rest_klines(
                &rows,
                &subscription.pair,
                &subscription.interval,
                Utc::now().timestamp_millis(),
            )?;
            end_time = page.first().map(|c| c.timestamp.timestamp_millis() - 1);
            if page.is_empty() {
                break;
            }
            candles.splice(0..0, page);

            if fetched < page_size {
                break;
            }
        }

        debug!("Fetched {} historical candles for {}", candles.len(), subscription);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_btc() -> Subscription {
        Subscription {
            exchange: "binance".to_string(),
            pair: TradingPair::new("ETH", "BTC"),
            interval: "1m".to_string(),
        }
    }

    #[tokio::test]
    async fn one_stream_serves_every_subscriber_of_a_market() {
        let client = BinanceClient::new(String::new(), String::new())
            .with_base_urls("http://127.0.0.1:9", "ws://127.0.0.1:9");
        let noop: CandleCallback = Arc::new(|_| {});

        let first = client.subscribe(&eth_btc(), noop.clone()).await.unwrap();
        let second = client.subscribe(&eth_btc(), noop).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(client.active_streams(), 1);

        client.unsubscribe(first).await;
        assert_eq!(client.active_streams(), 1);

        client.unsubscribe(second).await;
        assert_eq!(client.active_streams(), 0);
    }
}
