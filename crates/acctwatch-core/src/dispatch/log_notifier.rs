// # Log Notifier
//
// Delivers transition events as structured log lines. Used when no chat
// integration is configured and by embedded deployments that consume the
// scheduler event channel instead.

use async_trait::async_trait;

use crate::Error;
use crate::config::NotifierConfig;
use crate::traits::{Endpoint, NotificationTarget, Notifier, NotifierFactory, TransitionEvent};

/// Notifier that writes each event to the `tracing` log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Create a new log notifier
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn resolve(&self, target: &NotificationTarget) -> Result<Endpoint, Error> {
        if target.is_empty() {
            Ok(Endpoint::new("log"))
        } else {
            Ok(Endpoint::new(target.as_str()))
        }
    }

    async fn deliver(&self, endpoint: &Endpoint, event: &TransitionEvent) -> Result<(), Error> {
        tracing::info!(
            target: "acctwatch::notify",
            id = %event.id,
            from = %event.from,
            to = %event.to,
            at = %event.timestamp.to_rfc3339(),
            channel = endpoint.as_str(),
            "{}",
            event.summary()
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

/// Factory for the log notifier
pub struct LogNotifierFactory;

impl NotifierFactory for LogNotifierFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>, Error> {
        match config {
            NotifierConfig::Log => Ok(Box::new(LogNotifier::new())),
            _ => Err(Error::config("Invalid config for log notifier")),
        }
    }
}
