// src/core/engine.rs
use crate::config::{ConfigError, StrategyConfig};
use crate::connectors::traits::{
    CandleCallback, ExchangeGateway, MarketDataFeed, Subscription, SubscriptionId,
};
use crate::core::actor::{job_queue, Job, JobId, JobSender, Work, Worker};
use crate::core::context::{StrategyContext, StrategySnapshot};
use crate::core::error::EngineError;
use crate::core::registry::StrategyRegistry;
use crate::core::sink::MessageSink;
use crate::strategies::traits::DecisionHook;
use crate::types::{Candle, ExecutionMode, StrategyId};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The collaborators a strategy is wired to.
#[derive(Clone)]
pub struct Services {
    /// Required in live mode, ignored in simulated mode.
    pub gateway: Option<Arc<dyn ExchangeGateway>>,
    pub feed: Arc<dyn MarketDataFeed>,
    pub sink: Arc<dyn MessageSink>,
    pub registry: StrategyRegistry,
}

/// Cloneable remote control for a strategy. Everything goes through the job queue.
#[derive(Clone)]
pub struct StrategyHandle {
    id: StrategyId,
    mode: ExecutionMode,
    jobs: JobSender,
    running: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
    feed: Arc<dyn MarketDataFeed>,
    subscription: Subscription,
    /// This strategy's own feed subscription, set by `start`.
    subscription_id: Arc<OnceLock<SubscriptionId>>,
}

impl StrategyHandle {
    pub fn id(&self) -> &StrategyId {
        &self.id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription_id.get().copied()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.pending()
    }

    pub fn enqueue(&self, work: Work) -> Result<JobId, EngineError> {
        if self.is_stopped() {
            return Err(EngineError::Stopped(self.id.clone()));
        }
        self.jobs.enqueue(work)
    }

    pub fn update(&self, candle: Candle) -> Result<JobId, EngineError> {
        self.enqueue(Work::Update(candle))
    }

    /// Replays a caller-supplied batch through the live pipeline.
    pub fn simulate(&self, candles: Vec<Candle>) -> Result<JobId, EngineError> {
        self.enqueue(Work::Simulate(Some(candles)))
    }

    /// Replays the feed's historical window. Simulated mode only.
    pub fn run_simulation(&self) -> Result<JobId, EngineError> {
        if !self.mode.is_simulated() {
            return Err(EngineError::NotSimulated(self.id.clone()));
        }
        self.enqueue(Work::Simulate(None))
    }

    pub fn execute<F>(&self, command: F) -> Result<JobId, EngineError>
    where
        F: for<'a> FnOnce(&'a mut StrategyContext) -> BoxFuture<'a, Result<()>> + Send + 'static,
    {
        self.enqueue(Work::Command(Box::new(command)))
    }

    /// Runs `read` on the worker after every job queued before it, and returns its result.
    /// Waits for `start` if the strategy has not been started yet.
    pub async fn inspect<T, F>(&self, read: F) -> Result<T, EngineError>
    where
        F: FnOnce(&StrategyContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Work::Inspect(Box::new(move |ctx| {
            let _ = tx.send(read(ctx));
        })))?;
        rx.await.map_err(|_| EngineError::Stopped(self.id.clone()))
    }

    pub async fn open_position_count(&self) -> Result<usize, EngineError> {
        self.inspect(|ctx| ctx.open_position_count()).await
    }

    pub async fn snapshot(&self) -> Result<StrategySnapshot, EngineError> {
        self.inspect(|ctx| ctx.snapshot()).await
    }

    /// Halts the worker after its current job. Queued jobs are discarded.
    pub async fn stop(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(id) = self.subscription_id.get() {
            self.feed.unsubscribe(*id).await;
        }
        info!(strategy_id = %self.id, "Strategy stopped");
    }
}

/// Parts that move into the worker on `start`.
struct Idle {
    ctx: StrategyContext,
    hook: Box<dyn DecisionHook>,
    jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: watch::Receiver<bool>,
}

/// One configured strategy instance: created, then running, then stopped. A stopped
/// strategy cannot be started again.
pub struct Strategy {
    handle: StrategyHandle,
    registry: StrategyRegistry,
    idle: Option<Idle>,
    worker: Option<JoinHandle<()>>,
}

impl Strategy {
    /// Validates `config` and builds the strategy without starting it. This is the only
    /// place a configuration problem is reported.
    pub fn new(
        id: StrategyId,
        config: StrategyConfig,
        hook: Box<dyn DecisionHook>,
        services: Services,
    ) -> Result<Self, ConfigError> {
        let subscription = Subscription {
            exchange: config.exchange.clone(),
            pair: config.pair(),
            interval: config.interval.clone(),
        };
        let mode = config.mode;
        let ctx = StrategyContext::new(id.clone(), config, services.gateway, services.sink)?;

        let (jobs_tx, jobs_rx) = job_queue(id.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = StrategyHandle {
            id,
            mode,
            jobs: jobs_tx,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(shutdown_tx),
            feed: services.feed,
            subscription,
            subscription_id: Arc::new(OnceLock::new()),
        };

        Ok(Self {
            handle,
            registry: services.registry,
            idle: Some(Idle {
                ctx,
                hook,
                jobs: jobs_rx,
                shutdown: shutdown_rx,
            }),
            worker: None,
        })
    }

    pub fn id(&self) -> &StrategyId {
        self.handle.id()
    }

    pub fn handle(&self) -> &StrategyHandle {
        &self.handle
    }

    /// Subscribes to the feed, spawns the worker and registers the strategy.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.handle.is_stopped() {
            return Err(EngineError::Stopped(self.handle.id.clone()));
        }
        if self.idle.is_none() {
            return Err(EngineError::AlreadyStarted(self.handle.id.clone()));
        }

        let jobs = self.handle.jobs.clone();
        let strategy_id = self.handle.id.clone();
        let on_candle: CandleCallback = Arc::new(move |candle| {
            if let Err(e) = jobs.enqueue(Work::Update(candle)) {
                warn!(strategy_id = %strategy_id, "Dropping candle: {}", e);
            }
        });
        let subscription_id = self
            .handle
            .feed
            .subscribe(&self.handle.subscription, on_candle)
            .await
            .map_err(|e| EngineError::Feed(format!("{:#}", e)))?;
        if self.handle.is_stopped() {
            self.handle.feed.unsubscribe(subscription_id).await;
            return Err(EngineError::Stopped(self.handle.id.clone()));
        }
        let _ = self.handle.subscription_id.set(subscription_id);

        let Some(idle) = self.idle.take() else {
            return Err(EngineError::AlreadyStarted(self.handle.id.clone()));
        };
        self.handle.running.store(true, Ordering::SeqCst);
        let worker = Worker::new(
            idle.ctx,
            idle.hook,
            Arc::clone(&self.handle.feed),
            self.handle.subscription.clone(),
            idle.jobs,
            &self.handle.jobs,
            Arc::clone(&self.handle.running),
            idle.shutdown,
        );
        self.worker = Some(tokio::spawn(worker.run()));
        self.registry.register(self.handle.clone());

        info!(strategy_id = %self.handle.id, subscription = %self.handle.subscription, "Strategy started");
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.handle.stop().await;
        // a never-started strategy closes its queue here
        self.idle = None;
        self.registry.remove(&self.handle.id);
    }

    /// Waits for the worker task to exit.
    pub async fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(strategy_id = %self.handle.id, "Strategy worker task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn pending_jobs(&self) -> usize {
        self.handle.pending_jobs()
    }

    pub fn update(&self, candle: Candle) -> Result<JobId, EngineError> {
        self.handle.update(candle)
    }

    pub fn simulate(&self, candles: Vec<Candle>) -> Result<JobId, EngineError> {
        self.handle.simulate(candles)
    }

    pub fn run_simulation(&self) -> Result<JobId, EngineError> {
        self.handle.run_simulation()
    }

    pub fn execute<F>(&self, command: F) -> Result<JobId, EngineError>
    where
        F: for<'a> FnOnce(&'a mut StrategyContext) -> BoxFuture<'a, Result<()>> + Send + 'static,
    {
        self.handle.execute(command)
    }

    pub async fn open_position_count(&self) -> Result<usize, EngineError> {
        self.handle.open_position_count().await
    }

    pub async fn snapshot(&self) -> Result<StrategySnapshot, EngineError> {
        self.handle.snapshot().await
    }
}
