// src/strategies/traits.rs
use crate::core::context::StrategyContext;
use crate::types::Candle;
use anyhow::Result;
use async_trait::async_trait;

/// Trading logic plugged into a strategy. Called once per candle, after the market view
/// has been updated and every open position has been re-evaluated.
#[async_trait]
pub trait DecisionHook: Send + Sync {
    fn name(&self) -> String;

    async fn on_candle(&mut self, ctx: &mut StrategyContext, candle: &Candle) -> Result<()>;
}
