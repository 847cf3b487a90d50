//! Notification dispatch
//!
//! The dispatcher turns one detected transition into at most one delivery.
//! Resolution and delivery failures are logged and the event is dropped;
//! nothing here retries, queues, or touches the watch registry.

mod log_notifier;

pub use log_notifier::{LogNotifier, LogNotifierFactory};

use tracing::{debug, warn};

use crate::traits::{NotificationTarget, Notifier, TransitionEvent};

/// Result of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The notifier accepted the event
    Delivered,
    /// The target could not be resolved to an endpoint
    Unresolved(String),
    /// The endpoint was resolved but delivery failed
    Failed(String),
}

impl DispatchOutcome {
    /// Whether the event reached its endpoint
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Best-effort, at-most-once delivery of transition events
pub struct NotificationDispatcher {
    notifier: Box<dyn Notifier>,
}

impl NotificationDispatcher {
    /// Create a dispatcher around a notifier
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Name of the wrapped notifier
    pub fn notifier_name(&self) -> &'static str {
        self.notifier.notifier_name()
    }

    /// Resolve `target` and deliver `event` to it exactly once
    ///
    /// Never returns an error: failures come back as a non-delivered
    /// [`DispatchOutcome`] after being logged.
    pub async fn dispatch(
        &self,
        event: &TransitionEvent,
        target: &NotificationTarget,
    ) -> DispatchOutcome {
        let endpoint = match self.notifier.resolve(target).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(
                    "Dropping notification for {}: target '{}' did not resolve ({})",
                    event.id, target, e
                );
                return DispatchOutcome::Unresolved(e.to_string());
            }
        };

        match self.notifier.deliver(&endpoint, event).await {
            Ok(()) => {
                debug!(
                    "Delivered {} -> {} for {} via {}",
                    event.from,
                    event.to,
                    event.id,
                    self.notifier.notifier_name()
                );
                DispatchOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    "Dropping notification for {}: delivery via {} failed ({})",
                    event.id,
                    self.notifier.notifier_name(),
                    e
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}
