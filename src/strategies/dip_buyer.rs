// src/strategies/dip_buyer.rs
use crate::core::context::StrategyContext;
use crate::strategies::traits::DecisionHook;
use crate::types::Candle;
use crate::utils::precision::below;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Buys when the close falls `drop_percentage` below a baseline. The baseline is the first
/// close seen and moves to the entry close after every buy. Exits are left to the
/// position's stops and target.
pub struct DipBuyer {
    drop_percentage: Decimal,
    baseline: Option<Decimal>,
}

impl DipBuyer {
    /// # Arguments
    /// * `drop_percentage` - fraction below the baseline that triggers a buy (0.02 = 2%).
    pub fn new(drop_percentage: Decimal) -> Self {
        Self {
            drop_percentage,
            baseline: None,
        }
    }

    pub fn baseline(&self) -> Option<Decimal> {
        self.baseline
    }
}

#[async_trait]
impl DecisionHook for DipBuyer {
    fn name(&self) -> String {
        format!("dip buyer {}", self.drop_percentage)
    }

    async fn on_candle(&mut self, ctx: &mut StrategyContext, candle: &Candle) -> Result<()> {
        let Some(baseline) = self.baseline else {
            info!(strategy_id = %ctx.id(), "Initializing baseline price at {}", candle.close);
            self.baseline = Some(candle.close);
            return Ok(());
        };

        let buy_target = below(baseline, self.drop_percentage);
        if candle.close > buy_target {
            return Ok(());
        }
        if ctx.open_position_count() >= ctx.limits().position_limit {
            debug!(strategy_id = %ctx.id(), "Position limit reached, skipping dip at {}", candle.close);
            return Ok(());
        }

        info!(
            strategy_id = %ctx.id(),
            "Price {} is below target {} (baseline {})", candle.close, buy_target, baseline
        );
        ctx.open_default_long().await?;
        self.baseline = Some(candle.close);
        Ok(())
    }
}
