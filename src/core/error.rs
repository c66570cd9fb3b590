use crate::config::ConfigError;
use crate::types::StrategyId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Strategy {0} has already been started")]
    AlreadyStarted(StrategyId),

    #[error("Strategy {0} has been stopped")]
    Stopped(StrategyId),

    #[error("Job queue of strategy {0} is closed")]
    QueueClosed(StrategyId),

    #[error("Strategy {0} is not running in simulated mode")]
    NotSimulated(StrategyId),

    #[error("Market data feed error: {0}")]
    Feed(String),
}
