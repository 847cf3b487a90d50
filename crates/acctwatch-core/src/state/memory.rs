// # Memory Watch Registry
//
// In-memory implementation of WatchRegistry.
//
// ## Purpose
//
// Provides a fast registry that doesn't persist across restarts.
// Useful for testing and for deployments that re-seed their watch list
// on startup.
//
// ## Crash Behavior
//
// - All entities are lost on restart/crash
// - Re-watched entities start again at UNKNOWN, so the first sweep after a
//   restart records silently instead of alerting

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::RegistryConfig;
use crate::state::table::EntityTable;
use crate::traits::{
    EntityFilter, EntityState, NotificationTarget, WatchRegistry, WatchRegistryFactory,
    WatchedEntity,
};

/// In-memory watch registry
///
/// All entities live in one table behind a `RwLock`; each trait call takes
/// the lock once.
///
/// # Example
///
/// ```rust,no_run
/// use acctwatch_core::state::MemoryWatchRegistry;
/// use acctwatch_core::traits::{NotificationTarget, WatchRegistry};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = MemoryWatchRegistry::new();
///
///     registry.upsert("alice", &NotificationTarget::new("general")).await?;
///     assert!(registry.get("alice").await?.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryWatchRegistry {
    inner: Arc<RwLock<EntityTable>>,
}

impl MemoryWatchRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entities in the registry
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WatchRegistry for MemoryWatchRegistry {
    async fn upsert(&self, id: &str, target: &NotificationTarget) -> Result<WatchedEntity, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.upsert(id, target))
    }

    async fn deactivate(&self, id: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.deactivate(id).is_some())
    }

    async fn get(&self, id: &str) -> Result<Option<WatchedEntity>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn list_by(&self, filter: EntityFilter<'_>) -> Result<Vec<WatchedEntity>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.list_by(filter))
    }

    async fn record_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.record(id, state, observed_at))
    }

    async fn record_first_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.record_if_unknown(id, state, observed_at))
    }

    async fn retarget(
        &self,
        from: &NotificationTarget,
        to: &NotificationTarget,
    ) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.retarget(from, to))
    }

    async fn remove(&self, id: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(id))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}

/// Factory for in-memory registries
pub struct MemoryWatchRegistryFactory;

#[async_trait]
impl WatchRegistryFactory for MemoryWatchRegistryFactory {
    async fn create(&self, config: &RegistryConfig) -> Result<Arc<dyn WatchRegistry>, Error> {
        match config {
            RegistryConfig::Memory => Ok(Arc::new(MemoryWatchRegistry::new())),
            _ => Err(Error::config("Invalid config for memory registry")),
        }
    }
}
