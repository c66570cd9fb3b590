// src/core/registry.rs
use crate::core::engine::StrategyHandle;
use crate::types::StrategyId;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// The process's set of running strategies. Owned by whoever wires the process together
/// and passed to each `Strategy`; `start` adds, `stop` removes.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    inner: Arc<RwLock<BTreeMap<StrategyId, StrategyHandle>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, handle: StrategyHandle) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id().clone(), handle);
    }

    pub(crate) fn remove(&self, id: &StrategyId) -> Option<StrategyHandle> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &StrategyId) -> Option<StrategyHandle> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops and deregisters every strategy.
    pub async fn stop_all(&self) {
        let handles: Vec<StrategyHandle> = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *inner).into_values().collect()
        };
        info!("Stopping {} strategies", handles.len());
        for handle in handles {
            handle.stop().await;
        }
    }
}
