// src/strategies/cci_reversion.rs
use crate::core::context::StrategyContext;
use crate::indicators::{Cci, Indicator};
use crate::strategies::traits::DecisionHook;
use crate::types::Candle;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Buys when the CCI crosses below `threshold` (oversold), once per crossing.
pub struct CciReversion {
    cci: Cci,
    threshold: f64,
    previous: Option<f64>,
}

impl CciReversion {
    pub fn new(period: usize, threshold: f64) -> Self {
        Self {
            cci: Cci::new(period),
            threshold,
            previous: None,
        }
    }
}

#[async_trait]
impl DecisionHook for CciReversion {
    fn name(&self) -> String {
        format!("cci reversion {} < {}", self.cci.period(), self.threshold)
    }

    async fn on_candle(&mut self, ctx: &mut StrategyContext, _candle: &Candle) -> Result<()> {
        let Some(cci) = ctx.market().indicator(&self.cci, ctx.interval()) else {
            return Ok(());
        };
        let crossed = cci < self.threshold && self.previous.map_or(true, |p| p >= self.threshold);
        self.previous = Some(cci);

        if crossed && ctx.open_position_count() < ctx.limits().position_limit {
            info!(strategy_id = %ctx.id(), "CCI {:.2} crossed below {}", cci, self.threshold);
            ctx.open_default_long().await?;
        }
        Ok(())
    }
}
