// tests/lifecycle.rs
mod common;

use common::{candle, strategy_config, Harness, ScriptedHook, EXCHANGE};
use futures::FutureExt;
use rust_decimal_macros::dec;
use strategy_engine::{EngineError, ExecutionMode, Strategy, StrategyId};
use tokio::sync::oneshot;

fn strategy(harness: &Harness, id: &str, hook: &ScriptedHook) -> Strategy {
    Strategy::new(
        StrategyId::new(id),
        strategy_config(ExecutionMode::Simulated),
        Box::new(hook.clone()),
        harness.services(),
    )
    .unwrap()
}

#[tokio::test]
async fn start_and_stop_maintain_the_registry() {
    let harness = Harness::new();
    let mut strategy = strategy(&harness, "alpha", &ScriptedHook::new());
    let subscription = strategy.handle().subscription().clone();
    assert!(harness.registry.is_empty());
    assert!(!strategy.is_running());

    strategy.start().await.unwrap();
    assert!(strategy.is_running());
    assert_eq!(harness.registry.ids(), vec![StrategyId::new("alpha")]);
    assert!(harness.registry.get(&StrategyId::new("alpha")).is_some());
    assert_eq!(harness.feed.subscriber_count(&subscription), 1);
    assert!(matches!(strategy.start().await, Err(EngineError::AlreadyStarted(_))));

    strategy.stop().await;
    strategy.join().await;
    assert!(harness.registry.is_empty());
    assert!(!strategy.is_running());
    assert_eq!(harness.feed.subscriber_count(&subscription), 0);
    assert!(matches!(strategy.start().await, Err(EngineError::Stopped(_))));
    assert!(matches!(
        strategy.update(candle(dec!(100), 0)),
        Err(EngineError::Stopped(_))
    ));
}

#[tokio::test]
async fn stop_discards_queued_jobs() {
    let harness = Harness::new();
    let hook = ScriptedHook::new();
    let mut strategy = strategy(&harness, "beta", &hook);
    strategy.start().await.unwrap();

    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    strategy
        .execute(move |_ctx| {
            async move {
                let _ = started_tx.send(());
                let _ = gate_rx.await;
                Ok::<_, anyhow::Error>(())
            }
            .boxed()
        })
        .unwrap();
    strategy.update(candle(dec!(100), 0)).unwrap();
    strategy.update(candle(dec!(101), 1)).unwrap();

    started_rx.await.unwrap();
    strategy.stop().await;
    gate_tx.send(()).unwrap();
    strategy.join().await;

    assert!(hook.seen().is_empty());
    assert!(matches!(strategy.snapshot().await, Err(EngineError::Stopped(_))));
}

#[tokio::test]
async fn jobs_queued_before_start_run_once_started() {
    let harness = Harness::new();
    let hook = ScriptedHook::new();
    let mut strategy = strategy(&harness, "gamma", &hook);

    strategy.update(candle(dec!(100), 0)).unwrap();
    assert_eq!(strategy.pending_jobs(), 1);
    strategy.start().await.unwrap();

    assert_eq!(strategy.open_position_count().await.unwrap(), 0);
    assert_eq!(hook.seen(), vec![dec!(100)]);
    assert_eq!(strategy.pending_jobs(), 0);
}

#[tokio::test]
async fn stop_all_stops_every_registered_strategy() {
    let harness = Harness::new();
    let mut first = strategy(&harness, "one", &ScriptedHook::new());
    let mut second = strategy(&harness, "two", &ScriptedHook::new());
    first.start().await.unwrap();
    second.start().await.unwrap();
    assert_eq!(harness.registry.len(), 2);

    harness.registry.stop_all().await;
    first.join().await;
    second.join().await;

    assert!(harness.registry.is_empty());
    assert!(first.handle().is_stopped() && second.handle().is_stopped());
    assert!(!first.is_running() && !second.is_running());
}

#[tokio::test]
async fn stopping_one_strategy_keeps_the_other_on_the_same_market_fed() {
    let harness = Harness::new();
    let a_hook = ScriptedHook::new();
    let b_hook = ScriptedHook::new();
    let mut a = strategy(&harness, "a", &a_hook);
    let mut b = strategy(&harness, "b", &b_hook);
    a.start().await.unwrap();
    b.start().await.unwrap();
    let subscription = b.handle().subscription().clone();
    assert_eq!(a.handle().subscription(), &subscription);
    assert_ne!(a.handle().subscription_id(), b.handle().subscription_id());
    assert_eq!(harness.feed.subscriber_count(&subscription), 2);

    a.stop().await;
    a.join().await;
    assert_eq!(harness.feed.subscriber_count(&subscription), 1);
    assert_eq!(harness.feed.publish(EXCHANGE, candle(dec!(100), 0)), 1);

    let snapshot = b.snapshot().await.unwrap();
    assert_eq!(snapshot.latest_close, Some(dec!(100)));
    assert_eq!(b_hook.seen(), vec![dec!(100)]);
    assert!(a_hook.seen().is_empty());
    assert!(b.is_running());

    b.stop().await;
    assert_eq!(harness.feed.subscriber_count(&subscription), 0);
}
