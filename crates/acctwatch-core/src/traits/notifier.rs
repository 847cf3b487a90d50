// # Notifier Trait
//
// Defines the interface for delivering transition events.
//
// ## Implementations
//
// - Log: `LogNotifier` in this crate (emits a tracing event)
// - Webhook: `acctwatch-notify-webhook` crate
//
// ## Contract
//
// Delivery is best-effort and at-most-once. A notifier resolves the opaque
// `NotificationTarget` stored on the entity into a concrete `Endpoint` at
// delivery time, so a target that disappeared (deleted channel, revoked
// webhook) fails resolution and the event is dropped by the dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::traits::watch_registry::{EntityState, NotificationTarget};

/// A detected state change, as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    /// Entity id
    pub id: String,
    /// State before the change
    pub from: EntityState,
    /// State after the change
    pub to: EntityState,
    /// Time of the probe that observed the change
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// Short headline for the event
    pub fn headline(&self) -> &'static str {
        match (self.from, self.to) {
            (_, EntityState::Removed) => "Account removed",
            (EntityState::Removed, EntityState::Active) => "Account restored",
            (_, EntityState::Active) => "Account active",
            (_, EntityState::Unknown) => "Account status unknown",
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!("{}: {} ({} -> {})", self.headline(), self.id, self.from, self.to)
    }
}

/// A concrete delivery address produced by [`Notifier::resolve`]
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create a new endpoint
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The raw address
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Endpoints are often secret (webhook URLs embed their token)
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Endpoint(<REDACTED>)")
    }
}

/// Trait for notifier implementations
///
/// ## Implementation Guidelines
///
/// - **No retries**: a failed delivery is reported once and forgotten
/// - **No queueing**: never hold events for later
/// - **No registry access**: a dead target is not cleaned up here
/// - **Never log secrets**: endpoints may embed credentials
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Resolve an opaque target into a concrete endpoint
    ///
    /// # Returns
    ///
    /// - `Ok(Endpoint)`: Deliverable endpoint
    /// - `Err(Error::NotFound)`: The target no longer exists
    async fn resolve(&self, target: &NotificationTarget) -> Result<Endpoint, crate::Error>;

    /// Deliver one event to a resolved endpoint
    async fn deliver(&self, endpoint: &Endpoint, event: &TransitionEvent)
    -> Result<(), crate::Error>;

    /// Short name used in logs
    fn notifier_name(&self) -> &'static str;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a notifier instance from configuration
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}
