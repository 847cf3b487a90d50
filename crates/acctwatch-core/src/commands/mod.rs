//! Command surface
//!
//! The calls a chat bot, CLI or HTTP front end makes into the core. Every
//! identifier is normalized here, before it can reach the registry, so
//! `watch("@Alice")` and `status("alice")` name the same entity.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::{
    EntityState, NotificationTarget, ProbeOutcome, ProbeTransport, ProxyPool, WatchRegistry,
    WatchedEntity,
};

/// Longest identifier accepted by [`normalize_id`]
pub const MAX_ID_LEN: usize = 64;

/// Normalize a user-supplied identifier
///
/// Trims whitespace, strips one leading `@` and lower-cases. The result must
/// be 1 to [`MAX_ID_LEN`] characters of `[a-z0-9._-]` with at least one
/// letter or digit, so ids like `..` can never become a path segment.
pub fn normalize_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix('@').unwrap_or(trimmed).to_lowercase();

    if id.is_empty() {
        return Err(Error::invalid_input("Identifier cannot be empty"));
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(Error::invalid_input(format!(
            "Identifier is longer than {} characters",
            MAX_ID_LEN
        )));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::invalid_input(format!(
            "Identifier contains invalid character '{}'",
            bad
        )));
    }
    if !id.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::invalid_input("Identifier must contain a letter or digit"));
    }

    Ok(id)
}

/// Which entities `list` returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Every entity, watched or not
    All,
    /// Entities sweeps still probe
    Active,
    /// Entities reporting to one target
    Target(NotificationTarget),
}

impl ListScope {
    fn matches(&self, entity: &WatchedEntity) -> bool {
        match self {
            ListScope::All => true,
            ListScope::Active => entity.active,
            ListScope::Target(target) => &entity.notification_target == target,
        }
    }
}

/// Registry-wide counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub total: usize,
    /// Entities sweeps still probe, whatever their state
    pub watching: usize,
    pub removed: usize,
    pub unknown: usize,
}

/// Command handlers over a shared registry
///
/// Cheap to clone; every clone talks to the same registry and shares one
/// default target.
#[derive(Clone)]
pub struct Commands {
    registry: Arc<dyn WatchRegistry>,
    default_target: Arc<RwLock<NotificationTarget>>,
    verifier: Option<Arc<dyn ProbeTransport>>,
    proxies: ProxyPool,
}

impl Commands {
    /// Create command handlers
    pub fn new(registry: Arc<dyn WatchRegistry>, default_target: NotificationTarget) -> Self {
        Self {
            registry,
            default_target: Arc::new(RwLock::new(default_target)),
            verifier: None,
            proxies: ProxyPool::direct(),
        }
    }

    /// Enable [`Commands::watch_verified`] with a probe transport
    pub fn with_verifier(mut self, transport: Arc<dyn ProbeTransport>, proxies: ProxyPool) -> Self {
        self.verifier = Some(transport);
        self.proxies = proxies;
        self
    }

    /// Target used when `watch` is called without one
    pub fn default_target(&self) -> NotificationTarget {
        self.default_target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Redirect every entity reporting to `from` so it reports to `to`
    ///
    /// Applies to watched and unwatched entities alike. Returns how many
    /// entities moved.
    pub async fn retarget(
        &self,
        from: &NotificationTarget,
        to: NotificationTarget,
    ) -> Result<usize> {
        if to.is_empty() {
            return Err(Error::invalid_input("Notification target cannot be empty"));
        }

        let moved = self.registry.retarget(from, &to).await?;
        info!("Retargeted {} entities from {} to {}", moved, from, to);
        Ok(moved)
    }

    /// Replace the default target and move every entity still on the old one
    ///
    /// Later `watch` calls without a target use the new default. Returns how
    /// many existing entities moved.
    pub async fn set_default_target(&self, target: NotificationTarget) -> Result<usize> {
        if target.is_empty() {
            return Err(Error::invalid_input("Notification target cannot be empty"));
        }

        let previous = {
            let mut current = self
                .default_target
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, target.clone())
        };
        self.retarget(&previous, target).await
    }

    /// Start (or resume) watching an identifier
    ///
    /// Re-watching an existing id replaces its target and reactivates it;
    /// its last known state is kept.
    pub async fn watch(
        &self,
        raw_id: &str,
        target: Option<NotificationTarget>,
    ) -> Result<WatchedEntity> {
        let id = normalize_id(raw_id)?;
        let target = self.pick_target(target);

        let entity = self.registry.upsert(&id, &target).await?;
        info!("Watching {} (target {})", entity.id, entity.notification_target);
        Ok(entity)
    }

    /// Probe once, then watch only if the account exists
    ///
    /// - `REMOVED`: rejected with [`Error::NotFound`], nothing registered
    /// - `ACTIVE`: registered; a never-observed entity is recorded `ACTIVE`
    ///   with no alert, any other keeps its state for the next sweep
    /// - transient failure: registered with its current state
    ///
    /// Falls back to [`Commands::watch`] when no verifier is configured.
    pub async fn watch_verified(
        &self,
        raw_id: &str,
        target: Option<NotificationTarget>,
    ) -> Result<WatchedEntity> {
        let id = normalize_id(raw_id)?;
        let Some(verifier) = &self.verifier else {
            return self.watch(&id, target).await;
        };

        let outcome = verifier.probe(&id, &self.proxies).await;
        debug!("Verification probe of {}: {:?}", id, outcome);

        if outcome == ProbeOutcome::Removed {
            return Err(Error::not_found(format!("Account {} does not exist", id)));
        }

        let target = self.pick_target(target);
        self.registry.upsert(&id, &target).await?;

        // Only a never-observed entity takes the verified state; anything a
        // sweep has already recorded stays the sweep's to change
        let verified = outcome == ProbeOutcome::Active
            && self
                .registry
                .record_first_observation(&id, EntityState::Active, Utc::now())
                .await?;
        if verified {
            info!("Watching {} (target {}, verified active)", id, target);
        } else {
            info!("Watching {} (target {})", id, target);
        }

        self.status(&id).await
    }

    /// Stop probing an identifier, keeping its history
    pub async fn unwatch(&self, raw_id: &str) -> Result<()> {
        let id = normalize_id(raw_id)?;
        if self.registry.deactivate(&id).await? {
            info!("Unwatched {}", id);
            Ok(())
        } else {
            Err(Error::not_found(format!("{} is not being watched", id)))
        }
    }

    /// Current record of an identifier
    pub async fn status(&self, raw_id: &str) -> Result<WatchedEntity> {
        let id = normalize_id(raw_id)?;
        self.registry
            .get(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} is not being watched", id)))
    }

    /// Entities in `scope`, in insertion order
    pub async fn list(&self, scope: ListScope) -> Result<Vec<WatchedEntity>> {
        self.registry
            .list_by(&move |entity: &WatchedEntity| scope.matches(entity))
            .await
    }

    /// Forget an identifier entirely
    pub async fn remove(&self, raw_id: &str) -> Result<()> {
        let id = normalize_id(raw_id)?;
        if self.registry.remove(&id).await? {
            info!("Removed {} from the registry", id);
            Ok(())
        } else {
            Err(Error::not_found(format!("{} is not being watched", id)))
        }
    }

    /// Counts over the whole registry
    pub async fn summary(&self) -> Result<RegistrySummary> {
        let all = self.list(ListScope::All).await?;

        let mut summary = RegistrySummary {
            total: all.len(),
            ..RegistrySummary::default()
        };
        for entity in &all {
            if entity.active {
                summary.watching += 1;
            }
            match entity.last_known_state {
                EntityState::Removed => summary.removed += 1,
                EntityState::Unknown => summary.unknown += 1,
                EntityState::Active => {}
            }
        }

        Ok(summary)
    }

    fn pick_target(&self, target: Option<NotificationTarget>) -> NotificationTarget {
        target
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_target())
    }
}
