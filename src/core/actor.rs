// src/core/actor.rs
//! Per-strategy job queue and the single worker that drains it.

use crate::connectors::traits::{MarketDataFeed, Subscription};
use crate::core::context::StrategyContext;
use crate::core::error::EngineError;
use crate::core::pipeline;
use crate::strategies::traits::DecisionHook;
use crate::types::{Candle, StrategyId};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// A deferred mutation run on the worker with exclusive access to the context.
pub type Command = Box<dyn for<'a> FnOnce(&'a mut StrategyContext) -> BoxFuture<'a, Result<()>> + Send>;

/// A read run on the worker, ordered with every other job.
pub type Inspection = Box<dyn FnOnce(&StrategyContext) + Send>;

pub enum Work {
    Update(Candle),
    /// `None` fetches the historical window from the feed when the job runs.
    Simulate(Option<Vec<Candle>>),
    Command(Command),
    Inspect(Inspection),
}

impl Work {
    pub fn kind(&self) -> &'static str {
        match self {
            Work::Update(_) => "update",
            Work::Simulate(_) => "simulate",
            Work::Command(_) => "command",
            Work::Inspect(_) => "inspect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Job {
    pub id: JobId,
    pub work: Work,
}

/// Producer side of a strategy's queue. Cheap to clone, usable from any thread,
/// never blocks. The queue is unbounded.
#[derive(Clone)]
pub struct JobSender {
    strategy_id: StrategyId,
    sender: mpsc::UnboundedSender<Job>,
    next_id: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl JobSender {
    pub fn enqueue(&self, work: Work) -> Result<JobId, EngineError> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Job { id, work }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::QueueClosed(self.strategy_id.clone()));
        }
        Ok(id)
    }

    /// Jobs enqueued but not yet picked up. Advisory.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

pub(crate) fn job_queue(strategy_id: StrategyId) -> (JobSender, mpsc::UnboundedReceiver<Job>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let sender = JobSender {
        strategy_id,
        sender,
        next_id: Arc::new(AtomicU64::new(0)),
        pending: Arc::new(AtomicUsize::new(0)),
    };
    (sender, receiver)
}

/// Runs `fut`, turning a panic into an error so the caller can keep going.
pub(crate) async fn isolate<F>(fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) struct Worker {
    ctx: StrategyContext,
    hook: Box<dyn DecisionHook>,
    feed: Arc<dyn MarketDataFeed>,
    subscription: Subscription,
    jobs: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) fn new(
        ctx: StrategyContext,
        hook: Box<dyn DecisionHook>,
        feed: Arc<dyn MarketDataFeed>,
        subscription: Subscription,
        jobs: mpsc::UnboundedReceiver<Job>,
        sender: &JobSender,
        running: Arc<AtomicBool>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            hook,
            feed,
            subscription,
            jobs,
            pending: Arc::clone(&sender.pending),
            running,
            shutdown,
        }
    }

    /// Drains the queue one job at a time until stopped. A failing or panicking job is
    /// logged and skipped.
    pub(crate) async fn run(mut self) {
        self.ctx.add_message(format!(
            "Starting strategy {} ({})",
            self.ctx.id(),
            self.hook.name()
        ));

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.pending.fetch_sub(1, Ordering::SeqCst);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let kind = job.work.kind();
            if let Err(e) = isolate(self.execute(job.work)).await {
                error!(strategy_id = %self.ctx.id(), job_id = %job.id, job = kind, "Job threw error: {:#}", e);
                self.ctx
                    .add_message(format!("Job {} ({}) failed: {:#}", job.id, kind, e));
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(strategy_id = %self.ctx.id(), "Strategy worker exited");
    }

    async fn execute(&mut self, work: Work) -> Result<()> {
        match work {
            Work::Update(candle) => {
                pipeline::process_candle(&mut self.ctx, self.hook.as_mut(), &candle).await?;
                if let Some(balance) = self.ctx.quote_balance() {
                    self.ctx.add_message(format!(
                        "Simulation {} balance: {}",
                        self.ctx.config().quote_currency,
                        balance
                    ));
                }
                Ok(())
            }
            Work::Simulate(batch) => {
                let candles = match batch {
                    Some(candles) => candles,
                    None => {
                        self.feed
                            .fetch_historical(&self.subscription, self.ctx.config().history_limit)
                            .await?
                    }
                };
                pipeline::replay(&mut self.ctx, self.hook.as_mut(), &candles).await;
                Ok(())
            }
            Work::Command(command) => command(&mut self.ctx).await,
            Work::Inspect(inspect) => {
                inspect(&self.ctx);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn isolate_turns_panics_into_errors() {
        async fn explode() -> Result<()> {
            panic!("bad candle")
        }

        let err = isolate(explode()).await.unwrap_err();
        assert!(err.to_string().contains("bad candle"));

        assert!(isolate(async { Ok(()) }).await.is_ok());
        assert!(isolate(async { Err(anyhow!("nope")) }).await.is_err());
    }

    #[test]
    fn job_ids_increase_and_closed_queue_is_reported() {
        let (sender, receiver) = job_queue(StrategyId::new("s1"));
        let first = sender.enqueue(Work::Inspect(Box::new(|_| {}))).unwrap();
        let second = sender.enqueue(Work::Inspect(Box::new(|_| {}))).unwrap();
        assert!(second > first);
        assert_eq!(sender.pending(), 2);

        drop(receiver);
        assert!(matches!(
            sender.enqueue(Work::Inspect(Box::new(|_| {}))),
            Err(EngineError::QueueClosed(_))
        ));
        assert_eq!(sender.pending(), 2);
    }
}
