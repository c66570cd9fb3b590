// src/storage/mod.rs
//! Candle storage: the OHLCV and trading pair tables, kept in memory and persisted as JSON.

pub mod local_feed;

use crate::types::{Candle, TradingPair};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Candle store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Candle store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Candle {id} references unknown trading pair {pair}")]
    UnknownPair { id: u64, pair: String },

    #[error("Candle {id} has an invalid timestamp {timestamp}")]
    Timestamp { id: u64, timestamp: i64 },
}

/// A row of the OHLCV table. `pair` refers to [`TradingPairRecord::pair_id`] and
/// `timestamp` is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRecord {
    pub id: u64,
    pub exchange: String,
    pub pair: String,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub interval: String,
}

/// A row of the TradingPairs table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPairRecord {
    pub pair_id: String,
    pub base_currency: String,
    pub quote_currency: String,
}

impl TradingPairRecord {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(&self.base_currency, &self.quote_currency)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    trading_pairs: Vec<TradingPairRecord>,
    #[serde(default)]
    ohlcv: Vec<OhlcvRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    pairs: BTreeMap<String, TradingPairRecord>,
    /// Keyed by (exchange, pair, interval, timestamp) so replays come out ordered.
    ohlcv: BTreeMap<(String, String, String, i64), OhlcvRecord>,
    next_id: u64,
}

/// In-memory candle store
#[derive(Debug, Default)]
pub struct CandleStore {
    inner: RwLock<Inner>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair_id(pair: &TradingPair) -> String {
        pair.to_string()
    }

    /// Registers `pair` if it is not known yet and returns its id.
    pub fn upsert_pair(&self, pair: &TradingPair) -> String {
        let pair_id = Self::pair_id(pair);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pairs
            .entry(pair_id.clone())
            .or_insert_with(|| TradingPairRecord {
                pair_id: pair_id.clone(),
                base_currency: pair.base.clone(),
                quote_currency: pair.quote.clone(),
            });
        pair_id
    }

    /// Stores `candle`, replacing any candle with the same exchange, pair, interval and
    /// timestamp. Returns the row id.
    pub fn insert(&self, exchange: &str, candle: &Candle) -> u64 {
        let pair_id = self.upsert_pair(&candle.pair);
        let timestamp = candle.timestamp.timestamp_millis();
        let key = (
            exchange.to_string(),
            pair_id.clone(),
            candle.interval.clone(),
            timestamp,
        );

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = match inner.ohlcv.get(&key) {
            Some(existing) => existing.id,
            None => {
                inner.next_id += 1;
                inner.next_id
            }
        };
        inner.ohlcv.insert(
            key,
            OhlcvRecord {
                id,
                exchange: exchange.to_string(),
                pair: pair_id,
                timestamp,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
                interval: candle.interval.clone(),
            },
        );
        id
    }

    pub fn pairs(&self) -> Vec<TradingPairRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pairs
            .values()
            .cloned()
            .collect()
    }

    /// The most recent `limit` candles for the series, oldest first.
    pub fn candles(
        &self,
        exchange: &str,
        pair: &TradingPair,
        interval: &str,
        limit: usize,
    ) -> Vec<Candle> {
        let pair_id = Self::pair_id(pair);
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut candles: Vec<Candle> = inner
            .ohlcv
            .values()
            .filter(|r| r.exchange == exchange && r.pair == pair_id && r.interval == interval)
            .rev()
            .take(limit)
            .filter_map(|r| {
                let timestamp = Utc.timestamp_millis_opt(r.timestamp).single()?;
                Some(Candle {
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                    timestamp,
                    interval: r.interval.clone(),
                    pair: pair.clone(),
                })
            })
            .collect();
        candles.reverse();
        candles
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ohlcv
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads a store written by [`CandleStore::save_json`]. Every OHLCV row must reference a
    /// known pair and carry a valid timestamp.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await?;
        let tables: Tables = serde_json::from_str(&data)?;

        let mut inner = Inner::default();
        for pair in tables.trading_pairs {
            inner.pairs.insert(pair.pair_id.clone(), pair);
        }
        for record in tables.ohlcv {
            if !inner.pairs.contains_key(&record.pair) {
                return Err(StorageError::UnknownPair {
                    id: record.id,
                    pair: record.pair,
                });
            }
            if Utc.timestamp_millis_opt(record.timestamp).single().is_none() {
                return Err(StorageError::Timestamp {
                    id: record.id,
                    timestamp: record.timestamp,
                });
            }
            inner.next_id = inner.next_id.max(record.id);
            let key = (
                record.exchange.clone(),
                record.pair.clone(),
                record.interval.clone(),
                record.timestamp,
            );
            inner.ohlcv.insert(key, record);
        }

        info!(
            "Loaded {} candles and {} trading pairs from {}",
            inner.ohlcv.len(),
            inner.pairs.len(),
            path.display()
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let data = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let tables = Tables {
                trading_pairs: inner.pairs.values().cloned().collect(),
                ohlcv: inner.ohlcv.values().cloned().collect(),
            };
            serde_json::to_string_pretty(&tables)?
        };
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::candle;
    use rust_decimal_macros::dec;

    #[test]
    fn returns_the_latest_candles_in_order() {
        let store = CandleStore::new();
        for minute in 0..5 {
            store.insert("binance", &candle(Decimal::from(100 + minute), minute));
        }
        // same timestamp replaces the row
        store.insert("binance", &candle(dec!(200), 4));
        store.insert("kraken", &candle(dec!(1), 9));

        let pair = TradingPair::new("ETH", "BTC");
        let closes: Vec<Decimal> = store
            .candles("binance", &pair, "1m", 3)
            .iter()
            .map(|c| c.close)
            .collect();
        assert_eq!(closes, vec![dec!(102), dec!(103), dec!(200)]);
        assert_eq!(store.len(), 6);
        assert_eq!(store.pairs().len(), 1);
        assert!(store.candles("binance", &pair, "5m", 3).is_empty());
    }

    #[tokio::test]
    async fn survives_a_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.json");

        let store = CandleStore::new();
        store.insert("binance", &candle(dec!(101), 0));
        store.insert("binance", &candle(dec!(102), 1));
        store.save_json(&path).await.unwrap();

        let loaded = CandleStore::load_json(&path).await.unwrap();
        let pair = TradingPair::new("ETH", "BTC");
        assert_eq!(
            loaded.candles("binance", &pair, "1m", 10),
            store.candles("binance", &pair, "1m", 10)
        );
        // ids continue after the loaded rows
        assert_eq!(loaded.insert("binance", &candle(dec!(103), 2)), 3);
    }

    #[tokio::test]
    async fn rejects_rows_with_unknown_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.json");
        let raw = r#"{"trading_pairs":[],"ohlcv":[{"id":1,"exchange":"binance","pair":"ETH/BTC",
            "timestamp":0,"open":"1","high":"1","low":"1","close":"1","volume":"1","interval":"1m"}]}"#;
        tokio::fs::write(&path, raw).await.unwrap();

        let err = CandleStore::load_json(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownPair { id: 1, .. }));
    }
}
