// src/config.rs

use crate::types::{ExecutionMode, TradingPair};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Per-strategy risk limits. Percentages are fractions (0.05 = 5%).
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RiskLimits {
    pub capital_base: Decimal,
    pub order_quantity: Decimal,
    pub position_limit: usize,
    pub profit_target_percentage: Decimal,
    pub fixed_stoploss_percentage: Decimal,
    pub trailing_stoploss_percentage: Decimal,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StrategyConfig {
    pub interval: String,
    pub exchange: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub mode: ExecutionMode,
    pub limits: RiskLimits,
    /// Candles requested for a simulation run.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Live order quantities are rounded down to this step; zero disables it.
    #[serde(default)]
    pub quantity_step: Decimal,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl StrategyConfig {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(&self.base_currency, &self.quote_currency)
    }

    /// Rejects parameters an actor cannot safely run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("interval", &self.interval),
            ("exchange", &self.exchange),
            ("base_currency", &self.base_currency),
            ("quote_currency", &self.quote_currency),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }

        let limits = &self.limits;
        for (field, value) in [
            ("capital_base", limits.capital_base),
            ("profit_target_percentage", limits.profit_target_percentage),
            ("fixed_stoploss_percentage", limits.fixed_stoploss_percentage),
            (
                "trailing_stoploss_percentage",
                limits.trailing_stoploss_percentage,
            ),
            ("quantity_step", self.quantity_step),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::invalid(field, format!("{value} is negative")));
            }
        }

        // A stop at or below zero can never trigger.
        if limits.fixed_stoploss_percentage >= Decimal::ONE {
            return Err(ConfigError::invalid(
                "fixed_stoploss_percentage",
                "must be below 1",
            ));
        }
        if limits.trailing_stoploss_percentage >= Decimal::ONE {
            return Err(ConfigError::invalid(
                "trailing_stoploss_percentage",
                "must be below 1",
            ));
        }
        if limits.order_quantity <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "order_quantity",
                format!("{} must be positive", limits.order_quantity),
            ));
        }
        if limits.position_limit == 0 {
            return Err(ConfigError::invalid("position_limit", "must be at least 1"));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::invalid("history_limit", "must be at least 1"));
        }
        Ok(())
    }
}

/// Which decision hook drives a configured strategy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookConfig {
    DipBuyer { drop_percentage: Decimal },
    CciReversion { period: usize, threshold: f64 },
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyEntry {
    pub id: String,
    pub hook: HookConfig,
    #[serde(flatten)]
    pub strategy: StrategyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Optional JSON candle store used as the market data feed instead of Binance.
    #[serde(default)]
    pub candle_store: Option<String>,
    #[serde(default)]
    pub strategies: Vec<StrategyEntry>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        Self::from_config(builder.build()?)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let app: AppConfig = config.try_deserialize()?;
        for entry in &app.strategies {
            entry.strategy.validate()?;
        }
        Ok(app)
    }
}
