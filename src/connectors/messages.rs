// src/connectors/messages.rs
use crate::types::{Candle, TradingPair};
use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Kline event from wss://stream.binance.com:9443/ws/<symbol>@kline_<interval>.
/// Short field names are mapped with `rename`.
#[derive(Debug, Deserialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "e")]
    pub event_type: String, // "kline"

    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "k")]
    pub kline: BinanceKline,
}

#[derive(Debug, Deserialize)]
pub struct BinanceKline {
    #[serde(rename = "t")]
    pub open_time: i64,

    #[serde(rename = "T")]
    pub close_time: i64,

    #[serde(rename = "i")]
    pub interval: String,

    #[serde(rename = "o")]
    pub open: Decimal,

    #[serde(rename = "h")]
    pub high: Decimal,

    #[serde(rename = "l")]
    pub low: Decimal,

    #[serde(rename = "c")]
    pub close: Decimal,

    #[serde(rename = "v")]
    pub volume: Decimal,

    /// Set once the interval has finished.
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl BinanceKline {
    pub fn to_candle(&self, pair: &TradingPair) -> Result<Candle> {
        Ok(Candle {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            timestamp: millis(self.open_time)?,
            interval: self.interval.clone(),
            pair: pair.clone(),
        })
    }
}

/// Parses one row of GET /api/v3/klines:
/// `[open_time, "open", "high", "low", "close", "volume", close_time, ...]`.
pub fn rest_kline_to_candle(row: &[Value], pair: &TradingPair, interval: &str) -> Result<Candle> {
    let field = |i: usize| -> Result<Decimal> {
        let raw = row
            .get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("kline row is missing field {}", i))?;
        Ok(Decimal::from_str(raw)?)
    };
    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("kline row is missing its open time"))?;

    Ok(Candle {
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
        timestamp: millis(open_time)?,
        interval: interval.to_string(),
        pair: pair.clone(),
    })
}

/// Parses a page of REST klines, skipping rows whose close time is not before `now_ms`.
/// The newest row of a page is usually the candle still forming.
pub fn closed_rest_klines(
    rows: &[Vec<Value>],
    pair: &TradingPair,
    interval: &str,
    now_ms: i64,
) -> Result<Vec<Candle>> {
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let close_time = row
            .get(6)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("kline row is missing its close time"))?;
        if close_time >= now_ms {
            continue;
        }
        candles.push(rest_kline_to_candle(row, pair, interval)?);
    }
    Ok(candles)
}

#[derive(Debug, Deserialize)]
pub struct BookTicker {
    pub symbol: String,
    #[serde(rename = "bidPrice")]
    pub bid_price: Decimal,
    #[serde(rename = "askPrice")]
    pub ask_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BinanceOrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: Decimal,
    #[serde(rename = "cummulativeQuoteQty", default)]
    pub cumulative_quote_qty: Option<Decimal>,
}

impl BinanceOrderResponse {
    /// Quote spent divided by base filled, when anything filled.
    pub fn avg_price(&self) -> Option<Decimal> {
        let quote = self.cumulative_quote_qty?;
        if self.executed_qty.is_zero() {
            return None;
        }
        Some(quote / self.executed_qty)
    }
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<Balance>,
}

fn millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid timestamp {}", ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_a_closed_kline_event() {
        let raw = r#"{
            "e":"kline","E":1700000060000,"s":"ETHBTC",
            "k":{"t":1700000000000,"T":1700000059999,"s":"ETHBTC","i":"1m",
                 "o":"0.0510","c":"0.0520","h":"0.0530","l":"0.0500","v":"12.5",
                 "n":10,"x":true,"q":"0.64","V":"6","Q":"0.3","B":"0"}
        }"#;
        let event: BinanceKlineEvent = serde_json::from_str(raw).unwrap();
        assert!(event.kline.is_closed);

        let candle = event.kline.to_candle(&TradingPair::new("ETH", "BTC")).unwrap();
        assert_eq!(candle.close, dec!(0.0520));
        assert_eq!(candle.interval, "1m");
        assert_eq!(candle.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parses_rest_klines() {
        let raw = r#"[[1700000000000,"100.0","110.0","90.0","105.0","3.5",1700000059999,"367.5",7,"1.0","105.0","0"]]"#;
        let rows: Vec<Vec<Value>> = serde_json::from_str(raw).unwrap();
        let candle = rest_kline_to_candle(&rows[0], &TradingPair::new("ETH", "BTC"), "1m").unwrap();
        assert_eq!(candle.high, dec!(110.0));
        assert_eq!(candle.volume, dec!(3.5));
    }

    #[test]
    fn skips_the_kline_that_is_still_forming() {
        let raw = r#"[
            [1700000000000,"100","110","90","105","3",1700000059999],
            [1700000060000,"105","106","104","105.5","1",1700000119999]
        ]"#;
        let rows: Vec<Vec<Value>> = serde_json::from_str(raw).unwrap();
        let pair = TradingPair::new("ETH", "BTC");

        let mid_second_candle = 1_700_000_090_000;
        let candles = closed_rest_klines(&rows, &pair, "1m", mid_second_candle).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, dec!(105));

        let later = 1_700_000_120_000;
        assert_eq!(closed_rest_klines(&rows, &pair, "1m", later).unwrap().len(), 2);
    }

    #[test]
    fn average_fill_price() {
        let raw = r#"{"orderId":1,"symbol":"ETHBTC","status":"FILLED","executedQty":"2","cummulativeQuoteQty":"0.1"}"#;
        let order: BinanceOrderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(order.avg_price(), Some(dec!(0.05)));
    }
}
