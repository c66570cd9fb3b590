// src/lib.rs
//! Per-strategy actors that turn a stream of candles into positions with fixed stop,
//! trailing stop and profit target exits, live or against replayed history.

pub mod config;
pub mod connectors;
pub mod core;
pub mod indicators;
pub mod storage;
pub mod strategies;
pub mod types;
pub mod utils;

pub use crate::config::{AppConfig, ConfigError, HookConfig, RiskLimits, StrategyConfig};
pub use crate::connectors::traits::{
    CandleCallback, ExchangeGateway, MarketDataFeed, Subscription, SubscriptionId,
};
pub use crate::core::context::{StrategyContext, StrategySnapshot};
pub use crate::core::engine::{Services, Strategy, StrategyHandle};
pub use crate::core::error::EngineError;
pub use crate::core::position::{Position, PositionBook, PositionError, PositionId, PositionStatus};
pub use crate::core::registry::StrategyRegistry;
pub use crate::core::sink::{ChannelSink, MemorySink, MessageSink};
pub use crate::strategies::traits::DecisionHook;
pub use crate::types::{Candle, ExecutionMode, ExitReason, StrategyId, TradingPair};
