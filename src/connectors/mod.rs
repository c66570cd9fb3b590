// src/connectors/mod.rs
pub mod binance;
pub mod fanout;
pub mod messages;
pub mod traits;
