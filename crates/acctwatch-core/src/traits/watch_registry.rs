// # Watch Registry Trait
//
// Defines the interface for the durable watch list.
//
// ## Purpose
//
// The registry is the only read-write state shared between the sweep loop
// and the command handlers. It tracks, per identifier:
// - The last known state (UNKNOWN, ACTIVE, REMOVED)
// - Whether sweeps should probe it
// - Where transitions should be reported
// - When it was last probed successfully
//
// ## Implementations
//
// - Memory: `MemoryWatchRegistry` (tests, ephemeral deployments)
// - File-based: `FileWatchRegistry` (JSON document with crash recovery)
//
// ## Usage
//
// ```rust,ignore
// use acctwatch_core::{EntityState, NotificationTarget, WatchRegistry};
//
// let registry = /* WatchRegistry implementation */;
//
// registry.upsert("alice", &NotificationTarget::new("general")).await?;
// registry.record_observation("alice", EntityState::Active, chrono::Utc::now()).await?;
// let alice = registry.get("alice").await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last known externally observable state of a watched account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityState {
    /// Never successfully probed
    #[default]
    Unknown,
    /// Reachable
    Active,
    /// Removed, banned or otherwise unavailable
    Removed,
}

impl EntityState {
    /// Upper-case label used in logs and list output
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Unknown => "UNKNOWN",
            EntityState::Active => "ACTIVE",
            EntityState::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to where transition events should be delivered
///
/// The core never interprets the value; a `Notifier` resolves it lazily
/// (a channel name, a chat id, a literal webhook URL, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationTarget(String);

impl NotificationTarget {
    /// Create a new notification target
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    /// The raw target reference
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the target is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationTarget {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NotificationTarget {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A tracked identifier with its persisted state and subscription metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEntity {
    /// Normalized (lower-cased) identifier, unique in the registry
    pub id: String,
    /// Last state recorded from a successful probe
    #[serde(rename = "state")]
    pub last_known_state: EntityState,
    /// Whether sweeps should probe this entity
    pub active: bool,
    /// Where transitions for this entity are delivered
    #[serde(rename = "target")]
    pub notification_target: NotificationTarget,
    /// Time of the most recent successful probe
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Time the entity was first watched
    pub created_at: DateTime<Utc>,
    /// Insertion sequence; defines list order
    pub seq: u64,
}

impl WatchedEntity {
    /// Create a freshly watched entity
    ///
    /// # Visibility
    ///
    /// This is `pub(crate)` so entities are only minted by registry
    /// implementations, which own sequence allocation.
    pub(crate) fn new(id: impl Into<String>, target: NotificationTarget, seq: u64) -> Self {
        Self {
            id: id.into(),
            last_known_state: EntityState::Unknown,
            active: true,
            notification_target: target,
            last_checked_at: None,
            created_at: Utc::now(),
            seq,
        }
    }
}

/// Filter applied by [`WatchRegistry::list_by`]
pub type EntityFilter<'a> = &'a (dyn Fn(&WatchedEntity) -> bool + Send + Sync);

/// Trait for watch registry implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from the scheduler and
/// any number of command handlers. Each call is atomic for the entity it
/// touches; no guarantee spans multiple calls.
///
/// ## Implementation Guidelines
///
/// - **Atomic per call**: a concurrent upsert and observation on the same id
///   must not interleave into a corrupt record
/// - **Durable before return**: persistent implementations write before
///   acknowledging a mutation
/// - **No business logic**: deciding whether a state change matters is owned
///   by the detector and the scheduler
/// - **No network I/O**: probes and notifications never happen under a
///   registry lock
#[async_trait]
pub trait WatchRegistry: Send + Sync {
    /// Insert or update an entity
    ///
    /// Sets `active = true` and replaces the notification target. An existing
    /// entity keeps its last known state and position; a new one starts at
    /// `UNKNOWN`.
    ///
    /// # Returns
    ///
    /// The entity as stored after the call
    async fn upsert(
        &self,
        id: &str,
        target: &NotificationTarget,
    ) -> Result<WatchedEntity, crate::Error>;

    /// Stop probing an entity without forgetting it
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The entity existed and is now inactive
    /// - `Ok(false)`: No such entity
    async fn deactivate(&self, id: &str) -> Result<bool, crate::Error>;

    /// Point lookup by id
    async fn get(&self, id: &str) -> Result<Option<WatchedEntity>, crate::Error>;

    /// All entities matching `filter`, in insertion order
    async fn list_by(&self, filter: EntityFilter<'_>) -> Result<Vec<WatchedEntity>, crate::Error>;

    /// Record the state seen by a successful probe
    ///
    /// Updates `last_known_state` and `last_checked_at`. Only the scheduler
    /// (or a verified watch) calls this, and never for transient failures.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Applied
    /// - `Ok(false)`: The entity no longer exists (no-op)
    async fn record_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, crate::Error>;

    /// Record an observation only if the entity is still `UNKNOWN`
    ///
    /// The state check and the write happen under one lock, so a sweep
    /// that records a state in between wins.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Applied
    /// - `Ok(false)`: Already observed, or no such entity
    async fn record_first_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool, crate::Error>;

    /// Redirect every entity delivering to `from` so it delivers to `to`
    ///
    /// Inactive entities are included. Returns the number of entities moved.
    async fn retarget(
        &self,
        from: &NotificationTarget,
        to: &NotificationTarget,
    ) -> Result<usize, crate::Error>;

    /// Hard-delete an entity
    ///
    /// # Returns
    ///
    /// Whether the entity existed
    async fn remove(&self, id: &str) -> Result<bool, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Point-in-time snapshot of entities the scheduler should probe
    async fn snapshot_active(&self) -> Result<Vec<WatchedEntity>, crate::Error> {
        self.list_by(&|entity: &WatchedEntity| entity.active).await
    }
}

/// Helper trait for constructing watch registries from configuration
#[async_trait]
pub trait WatchRegistryFactory: Send + Sync {
    /// Create a registry instance from configuration
    async fn create(
        &self,
        config: &crate::config::RegistryConfig,
    ) -> Result<std::sync::Arc<dyn WatchRegistry>, crate::Error>;
}
