// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strategy_engine::storage::local_feed::LocalFeed;
use strategy_engine::storage::CandleStore;
use strategy_engine::types::OrderResponse;
use strategy_engine::{
    Candle, DecisionHook, ExchangeGateway, ExecutionMode, MemorySink, RiskLimits, Services,
    StrategyConfig, StrategyContext, StrategyRegistry, TradingPair,
};

pub const EXCHANGE: &str = "binance";

pub fn pair() -> TradingPair {
    TradingPair::new("ETH", "BTC")
}

pub fn candle(close: Decimal, minute: i64) -> Candle {
    Candle {
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1),
        timestamp: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
        interval: "1m".to_string(),
        pair: pair(),
    }
}

pub fn candles(closes: &[Decimal]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| candle(*close, i as i64))
        .collect()
}

pub fn strategy_config(mode: ExecutionMode) -> StrategyConfig {
    StrategyConfig {
        interval: "1m".to_string(),
        exchange: EXCHANGE.to_string(),
        base_currency: "ETH".to_string(),
        quote_currency: "BTC".to_string(),
        mode,
        limits: RiskLimits {
            capital_base: dec!(10000),
            order_quantity: dec!(1),
            position_limit: 3,
            profit_target_percentage: dec!(0.10),
            fixed_stoploss_percentage: dec!(0.05),
            trailing_stoploss_percentage: dec!(0.03),
        },
        history_limit: 1000,
        quantity_step: Decimal::ZERO,
    }
}

pub struct Harness {
    pub feed: Arc<LocalFeed>,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<MemorySink>,
    pub registry: StrategyRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            feed: Arc::new(LocalFeed::new(Arc::new(CandleStore::new()))),
            gateway: Arc::new(FakeGateway::new(dec!(100))),
            sink: Arc::new(MemorySink::new()),
            registry: StrategyRegistry::new(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            gateway: Some(self.gateway.clone() as Arc<dyn ExchangeGateway>),
            feed: self.feed.clone(),
            sink: self.sink.clone(),
            registry: self.registry.clone(),
        }
    }

    pub fn messages_containing(&self, needle: &str) -> usize {
        self.sink.texts().iter().filter(|t| t.contains(needle)).count()
    }
}

/// Fills everything at a fixed ask, unless told to reject the next sells.
pub struct FakeGateway {
    ask: Mutex<Decimal>,
    failing_sells: AtomicUsize,
    pub buys: AtomicUsize,
    pub sells: AtomicUsize,
}

impl FakeGateway {
    pub fn new(ask: Decimal) -> Self {
        Self {
            ask: Mutex::new(ask),
            failing_sells: AtomicUsize::new(0),
            buys: AtomicUsize::new(0),
            sells: AtomicUsize::new(0),
        }
    }

    pub fn set_ask(&self, ask: Decimal) {
        *self.ask.lock().unwrap() = ask;
    }

    pub fn fail_next_sells(&self, count: usize) {
        self.failing_sells.store(count, Ordering::SeqCst);
    }

    fn order(&self, pair: &TradingPair, quantity: Decimal) -> OrderResponse {
        OrderResponse {
            id: "1".to_string(),
            symbol: pair.symbol(),
            status: "FILLED".to_string(),
            executed_qty: quantity,
            avg_price: None,
        }
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn best_bid(&self, _pair: &TradingPair) -> Result<Decimal> {
        Ok(*self.ask.lock().unwrap())
    }

    async fn best_ask(&self, _pair: &TradingPair) -> Result<Decimal> {
        Ok(*self.ask.lock().unwrap())
    }

    async fn place_market_buy(&self, pair: &TradingPair, quantity: Decimal) -> Result<OrderResponse> {
        self.buys.fetch_add(1, Ordering::SeqCst);
        Ok(self.order(pair, quantity))
    }

    async fn place_market_sell(&self, pair: &TradingPair, quantity: Decimal) -> Result<OrderResponse> {
        let remaining = self.failing_sells.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_sells.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("exchange unavailable"));
        }
        self.sells.fetch_add(1, Ordering::SeqCst);
        Ok(self.order(pair, quantity))
    }

    async fn wallet_balance(&self, _asset: &str) -> Result<Decimal> {
        Ok(dec!(1000))
    }
}

/// Records every close it sees and opens a long on the listed closes.
#[derive(Clone, Default)]
pub struct ScriptedHook {
    pub seen: Arc<Mutex<Vec<Decimal>>>,
    buy_on: BTreeSet<Decimal>,
    fail_on: BTreeSet<Decimal>,
    panic_on: BTreeSet<Decimal>,
}

impl ScriptedHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buy_on(mut self, closes: &[Decimal]) -> Self {
        self.buy_on.extend(closes.iter().copied());
        self
    }

    pub fn fail_on(mut self, close: Decimal) -> Self {
        self.fail_on.insert(close);
        self
    }

    pub fn panic_on(mut self, close: Decimal) -> Self {
        self.panic_on.insert(close);
        self
    }

    pub fn seen(&self) -> Vec<Decimal> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionHook for ScriptedHook {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn on_candle(&mut self, ctx: &mut StrategyContext, candle: &Candle) -> Result<()> {
        self.seen.lock().unwrap().push(candle.close);
        if self.panic_on.contains(&candle.close) {
            panic!("hook exploded at {}", candle.close);
        }
        if self.fail_on.contains(&candle.close) {
            return Err(anyhow!("hook rejected {}", candle.close));
        }
        if self.buy_on.contains(&candle.close) {
            ctx.open_default_long().await?;
        }
        Ok(())
    }
}
