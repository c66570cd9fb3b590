// src/core/context.rs
use crate::config::{ConfigError, RiskLimits, StrategyConfig};
use crate::connectors::traits::ExchangeGateway;
use crate::core::market::Market;
use crate::core::position::{Position, PositionBook, PositionId};
use crate::core::sink::MessageSink;
use crate::core::wallet::PaperWallet;
use crate::types::{Candle, ExecutionMode, StrategyId};
use crate::utils::precision::normalize_quantity;
use anyhow::{anyhow, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where fills come from.
enum Venue {
    Exchange(Arc<dyn ExchangeGateway>),
    Paper(PaperWallet),
}

/// Everything a strategy mutates. Owned by the strategy's worker and handed to the
/// decision hook by mutable reference, so there is never more than one writer.
pub struct StrategyContext {
    id: StrategyId,
    config: StrategyConfig,
    market: Market,
    book: PositionBook,
    venue: Venue,
    sink: Arc<dyn MessageSink>,
    simulating: bool,
}

/// Point-in-time copy of a strategy's state, for readers outside the worker.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySnapshot {
    pub strategy_id: StrategyId,
    pub mode: ExecutionMode,
    pub simulating: bool,
    pub latest_close: Option<Decimal>,
    pub quote_balance: Option<Decimal>,
    pub positions: Vec<Position>,
}

impl StrategySnapshot {
    pub fn open_position_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_open()).count()
    }
}

impl StrategyContext {
    pub(crate) fn new(
        id: StrategyId,
        config: StrategyConfig,
        gateway: Option<Arc<dyn ExchangeGateway>>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let venue = match (config.mode, gateway) {
            (ExecutionMode::Simulated, _) => Venue::Paper(PaperWallet::new(
                &config.quote_currency,
                config.limits.capital_base,
            )),
            (ExecutionMode::Live, Some(gateway)) => Venue::Exchange(gateway),
            (ExecutionMode::Live, None) => {
                return Err(ConfigError::Invalid {
                    field: "mode",
                    reason: "live mode requires an exchange gateway".to_string(),
                })
            }
        };
        let market = Market::new(&config.exchange, config.pair(), config.history_limit);

        Ok(Self {
            id,
            config,
            market,
            book: PositionBook::new(),
            venue,
            sink,
            simulating: false,
        })
    }

    pub fn id(&self) -> &StrategyId {
        &self.id
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.config.limits
    }

    pub fn interval(&self) -> &str {
        &self.config.interval
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn positions(&self) -> &[Position] {
        self.book.positions()
    }

    pub fn open_position_count(&self) -> usize {
        self.book.open_position_count()
    }

    /// True while a historical batch is being replayed.
    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    /// Quote balance of the paper wallet; `None` in live mode.
    pub fn quote_balance(&self) -> Option<Decimal> {
        match &self.venue {
            Venue::Paper(wallet) => Some(wallet.quote_balance()),
            Venue::Exchange(_) => None,
        }
    }

    pub fn add_message(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        info!(strategy_id = %self.id, "{}", text);
        self.sink.add_message(&self.id, text);
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            strategy_id: self.id.clone(),
            mode: self.config.mode,
            simulating: self.simulating,
            latest_close: self.market.latest_close(&self.config.interval),
            quote_balance: self.quote_balance(),
            positions: self.book.positions().to_vec(),
        }
    }

    /// Opens a long position with the configured quantity and exit percentages.
    pub async fn open_default_long(&mut self) -> Result<PositionId> {
        let limits = self.config.limits.clone();
        self.open_long(
            limits.order_quantity,
            limits.fixed_stoploss_percentage,
            limits.trailing_stoploss_percentage,
            limits.profit_target_percentage,
        )
        .await
    }

    /// Opens a long position. Simulated: fills at the latest close and debits the paper
    /// wallet. Live: enters at the best ask and places a market buy first.
    /// `position_limit` is the caller's business.
    pub async fn open_long(
        &mut self,
        order_quantity: Decimal,
        fixed_stoploss_percent: Decimal,
        trailing_stoploss_percent: Decimal,
        profit_target_percent: Decimal,
    ) -> Result<PositionId> {
        let pair = self.config.pair();
        let latest = self.market.latest_candle(&self.config.interval);
        let opened_at = latest.map(|c| c.timestamp).unwrap_or_else(Utc::now);
        let latest_close = latest.map(|c| c.close);

        let position = match &mut self.venue {
            Venue::Paper(wallet) => {
                let entry_price = latest_close.ok_or_else(|| {
                    anyhow!("no {} candle received yet for {}", self.config.interval, pair)
                })?;
                let position = Position::open_long(
                    order_quantity,
                    entry_price,
                    fixed_stoploss_percent,
                    trailing_stoploss_percent,
                    profit_target_percent,
                    opened_at,
                )?;
                wallet.buy(order_quantity, entry_price)?;
                position
            }
            Venue::Exchange(gateway) => {
                let gateway = Arc::clone(gateway);
                let quantity = normalize_quantity(order_quantity, self.config.quantity_step);
                let entry_price = gateway.best_ask(&pair).await?;
                let position = Position::open_long(
                    quantity,
                    entry_price,
                    fixed_stoploss_percent,
                    trailing_stoploss_percent,
                    profit_target_percent,
                    opened_at,
                )?;
                let order = gateway.place_market_buy(&pair, quantity).await?;
                debug!(strategy_id = %self.id, order_id = %order.id, "Market buy filled");
                position
            }
        };

        let (quantity, entry_price) = (position.quantity(), position.entry_price());
        let id = self.book.add(position);
        self.add_message(format!("Going long on {pair}: {quantity} @ {entry_price}"));
        Ok(id)
    }

    pub(crate) fn set_simulating(&mut self, simulating: bool) {
        self.simulating = simulating;
    }

    pub(crate) fn record_candle(&mut self, candle: &Candle) {
        self.market.update(&self.config.interval, candle);
    }

    /// Update pass over every open position at `candle.close`. A failed live sell leaves
    /// the position open; the next candle evaluates it again.
    pub(crate) async fn update_positions(&mut self, candle: &Candle) -> Result<()> {
        let close = candle.close;
        let pair = self.config.pair();

        for exit in self.book.update_pass(close) {
            let fill = match &mut self.venue {
                Venue::Paper(wallet) => {
                    wallet.sell(exit.quantity, close);
                    Ok(close)
                }
                Venue::Exchange(gateway) => {
                    let gateway = Arc::clone(gateway);
                    gateway
                        .place_market_sell(&pair, exit.quantity)
                        .await
                        .map(|order| order.avg_price.unwrap_or(close))
                }
            };

            match fill {
                Ok(price) => {
                    self.book
                        .close(exit.position_id, price, exit.reason, candle.timestamp)?;
                    self.add_message(format!(
                        "Closed position {} on {} at {}",
                        exit.position_id, exit.reason, price
                    ));
                }
                Err(e) => {
                    warn!(strategy_id = %self.id, position_id = %exit.position_id, "Market sell failed: {:#}", e);
                    self.add_message(format!(
                        "Failed to close position {} on {}: {:#}. Retrying on the next candle.",
                        exit.position_id, exit.reason, e
                    ));
                }
            }
        }
        Ok(())
    }
}
