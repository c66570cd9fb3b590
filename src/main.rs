// src/main.rs
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::sync::Arc;
use strategy_engine::connectors::binance::BinanceClient;
use strategy_engine::storage::local_feed::LocalFeed;
use strategy_engine::storage::CandleStore;
use strategy_engine::strategies::create_hook;
use strategy_engine::{
    AppConfig, ChannelSink, ExchangeGateway, MarketDataFeed, MessageSink, Services, Strategy,
    StrategyId, StrategyRegistry,
};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "engine.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::new().context("Failed to load Settings")?;
    let _log_guard = init_logging(&config.log_dir);

    println!("========================================");
    println!("     STRATEGY ENGINE - v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    for entry in &config.strategies {
        println!(
            "{:<12} {} {} {} ({:?})",
            entry.id,
            entry.strategy.exchange,
            entry.strategy.pair(),
            entry.strategy.interval,
            entry.strategy.mode
        );
    }
    println!("========================================");

    // 2. Initialize Components
    let registry = StrategyRegistry::new();
    let binance = Arc::new(BinanceClient::new(
        config.api_key.clone(),
        config.secret_key.clone(),
    ));
    let gateway: Arc<dyn ExchangeGateway> = binance.clone();
    let feed: Arc<dyn MarketDataFeed> = match &config.candle_store {
        Some(path) => {
            let store = CandleStore::load_json(path)
                .await
                .with_context(|| format!("Failed to load candle store {}", path))?;
            Arc::new(LocalFeed::new(Arc::new(store)))
        }
        None => binance,
    };

    let (sink, mut messages) = ChannelSink::new();
    let sink: Arc<dyn MessageSink> = Arc::new(sink);
    let consumer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            println!(
                "{} [{}] {}",
                message.timestamp.format("%H:%M:%S"),
                message.strategy_id,
                message.text
            );
        }
    });

    // 3. Start Strategies
    let mut strategies = Vec::with_capacity(config.strategies.len());
    for entry in config.strategies {
        let services = Services {
            gateway: Some(Arc::clone(&gateway)),
            feed: Arc::clone(&feed),
            sink: Arc::clone(&sink),
            registry: registry.clone(),
        };
        let hook = create_hook(&entry.hook);
        let mut strategy = Strategy::new(StrategyId::new(entry.id), entry.strategy, hook, services)?;
        strategy.start().await?;
        if strategy.handle().mode().is_simulated() {
            strategy.run_simulation()?;
        }
        strategies.push(strategy);
    }
    drop(sink);

    if strategies.is_empty() {
        warn!("No strategies configured, nothing to do");
    } else {
        info!("{} strategies running. Press Ctrl+C to stop.", registry.len());
    }

    // 4. Run until interrupted
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down...");
    registry.stop_all().await;
    for strategy in &mut strategies {
        strategy.join().await;
    }
    drop(strategies);
    let _ = consumer.await;

    Ok(())
}
