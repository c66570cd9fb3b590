// src/core/pipeline.rs
//! What happens to one candle: market view first, exits second, the strategy's own
//! decision last. Live updates and simulation replays both go through here.

use crate::core::actor::isolate;
use crate::core::context::StrategyContext;
use crate::strategies::traits::DecisionHook;
use crate::types::Candle;
use anyhow::Result;
use tracing::{debug, error};

pub async fn process_candle(
    ctx: &mut StrategyContext,
    hook: &mut dyn DecisionHook,
    candle: &Candle,
) -> Result<()> {
    debug!(strategy_id = %ctx.id(), close = %candle.close, ts = %candle.timestamp, "Received new candle");
    ctx.record_candle(candle);
    ctx.update_positions(candle).await?;
    hook.on_candle(ctx, candle).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub candles: usize,
    pub failed: usize,
}

/// Feeds `candles` through [`process_candle`] back to back with the simulation flag set.
/// A failing candle is logged and the replay moves on, as it would in a live run.
pub async fn replay(
    ctx: &mut StrategyContext,
    hook: &mut dyn DecisionHook,
    candles: &[Candle],
) -> ReplayReport {
    ctx.add_message(format!(
        "Simulating strategy for market {} {}",
        ctx.market().exchange(),
        ctx.market().pair()
    ));
    ctx.set_simulating(true);

    let mut report = ReplayReport::default();
    for candle in candles {
        report.candles += 1;
        if let Err(e) = isolate(process_candle(ctx, hook, candle)).await {
            report.failed += 1;
            error!(strategy_id = %ctx.id(), ts = %candle.timestamp, "Simulated candle failed: {:#}", e);
        }
    }

    ctx.set_simulating(false);
    let balance = ctx
        .quote_balance()
        .map(|b| format!(", {} balance {}", ctx.config().quote_currency, b))
        .unwrap_or_default();
    ctx.add_message(format!(
        "Simulation finished: {} candles, {} failed, {} positions open{}",
        report.candles,
        report.failed,
        ctx.open_position_count(),
        balance
    ));
    report
}
