// src/core/sink.rs
use crate::types::{StrategyId, StrategyMessage};
use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::error;

/// Fire-and-forget delivery of operator messages. Called from the strategy's worker,
/// so messages of one strategy arrive in job order.
pub trait MessageSink: Send + Sync {
    fn add_message(&self, strategy_id: &StrategyId, text: &str);
}

/// Forwards messages to a UI or any other consumer over an unbounded channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<StrategyMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StrategyMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MessageSink for ChannelSink {
    fn add_message(&self, strategy_id: &StrategyId, text: &str) {
        let message = StrategyMessage {
            strategy_id: strategy_id.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        if self.sender.send(message).is_err() {
            error!("Message channel closed! Consumer is likely dead.");
        }
    }
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<StrategyMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StrategyMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }
}

impl MessageSink for MemorySink {
    fn add_message(&self, strategy_id: &StrategyId, text: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StrategyMessage {
                strategy_id: strategy_id.clone(),
                text: text.to_string(),
                timestamp: Utc::now(),
            });
    }
}
