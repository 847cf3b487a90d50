//! Poll scheduler
//!
//! The PollScheduler drives periodic sweeps over the watch registry:
//! - Snapshotting the active entities at sweep start
//! - Probing each one via ProbeTransport, paced by delay + jitter
//! - Feeding outcomes through the change detector
//! - Recording observations and dispatching alert-worthy transitions
//!
//! ## Architecture
//!
//! ```text
//!            tick (interval)
//!                  │
//!                  ▼
//!          ┌───────────────┐   snapshot    ┌───────────────┐
//!          │ PollScheduler │──────────────▶│ WatchRegistry │
//!          └───────────────┘◀── record ────└───────────────┘
//!             │         │
//!       probe │         │ alert-worthy transition
//!             ▼         ▼
//! ┌────────────────┐  ┌────────────────────────┐
//! │ ProbeTransport │  │ NotificationDispatcher │
//! └────────────────┘  └────────────────────────┘
//! ```
//!
//! ## States
//!
//! `Idle` and `Sweeping`. A tick that arrives while a sweep is running is
//! skipped, so sweeps never overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{MonitorConfig, SchedulerConfig};
use crate::detector;
use crate::dispatch::{DispatchOutcome, NotificationDispatcher};
use crate::error::Result;
use crate::traits::{
    EntityState, Notifier, ProbeTransport, ProxyPool, WatchRegistry, WatchedEntity,
};

/// Events emitted by the PollScheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Scheduler loop started
    Started {
        interval_secs: u64,
    },

    /// A sweep began over a snapshot of active entities
    SweepStarted {
        entities: usize,
    },

    /// A tick arrived while a sweep was still running
    SweepSkipped,

    /// A probe returned no usable information
    ProbeFailed {
        id: String,
    },

    /// A stored state changed in a way worth alerting on
    TransitionDetected {
        id: String,
        from: EntityState,
        to: EntityState,
    },

    /// A transition notification reached its endpoint
    NotificationDelivered {
        id: String,
    },

    /// A transition notification was dropped
    NotificationDropped {
        id: String,
        reason: String,
    },

    /// A sweep completed (or was abandoned on shutdown)
    SweepFinished {
        probed: usize,
        transitions: usize,
    },

    /// Scheduler loop stopped
    Stopped {
        reason: String,
    },
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// A sweep is in progress
    Sweeping,
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// The sweep did not run because another one held the guard
    pub skipped: bool,
    /// Probes issued
    pub probed: usize,
    /// Probes that ended in a transient error
    pub transient: usize,
    /// Alert-worthy state changes recorded
    pub transitions: usize,
    /// Silent first observations of never-probed entities
    pub first_observations: usize,
    /// Notifications delivered
    pub notified: usize,
    /// Notifications dropped
    pub dropped: usize,
    /// Registry failures
    pub errors: usize,
    /// Entities left unprobed because shutdown was requested
    pub abandoned: usize,
}

impl SweepReport {
    /// Report for a tick that was skipped
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Resets the single-flight flag when a sweep ends, however it ends
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic sweep driver
///
/// ## Lifecycle
///
/// 1. Create with [`PollScheduler::new()`]
/// 2. Start with [`PollScheduler::run()`] (or drive sweeps manually with
///    [`PollScheduler::sweep()`])
/// 3. The loop runs until a shutdown signal is received
/// 4. The registry is flushed before `run()` returns
///
/// ## Locking
///
/// The scheduler never holds a registry lock across a probe: the snapshot
/// and each observation are separate registry calls.
pub struct PollScheduler {
    /// Probe transport (shared with verified watch commands)
    transport: Arc<dyn ProbeTransport>,

    /// Notification dispatcher
    dispatcher: NotificationDispatcher,

    /// Watch registry (shared with command handlers)
    registry: Arc<dyn WatchRegistry>,

    /// Egress routes handed to every probe
    proxies: ProxyPool,

    /// Scheduler settings
    config: SchedulerConfig,

    /// Single-flight guard
    sweeping: AtomicBool,

    /// Set when shutdown is requested during a sweep
    stopping: AtomicBool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SchedulerEvent>,
}

impl PollScheduler {
    /// Create a new scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, event_receiver) where event_receiver yields
    /// scheduler events
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        notifier: Box<dyn Notifier>,
        registry: Arc<dyn WatchRegistry>,
        config: &MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<SchedulerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.scheduler.event_channel_capacity);

        let scheduler = Self {
            transport,
            dispatcher: NotificationDispatcher::new(notifier),
            registry,
            proxies: config.proxies.clone(),
            config: config.scheduler.clone(),
            sweeping: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            event_tx: tx,
        };

        Ok((scheduler, rx))
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        if self.sweeping.load(Ordering::Acquire) {
            SchedulerState::Sweeping
        } else {
            SchedulerState::Idle
        }
    }

    /// The registry this scheduler sweeps
    pub fn registry(&self) -> Arc<dyn WatchRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run the scheduler until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The final registry flush failed
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the scheduler until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// Used by the daemon, which translates SIGTERM/SIGINT into the oneshot,
    /// and by tests that need deterministic shutdown.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        // A previous run may have stopped mid-sweep
        self.stopping.store(false, Ordering::Release);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        self.emit_event(SchedulerEvent::Started {
            interval_secs: self.config.interval_secs,
        });
        info!(
            "Scheduler started: sweeping every {}s via {}",
            self.config.interval_secs,
            self.transport.transport_name()
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    let sweep = self.sweep();
                    tokio::pin!(sweep);

                    tokio::select! {
                        _ = &mut sweep => {}

                        _ = &mut shutdown => {
                            info!("Shutdown signal received during sweep, finishing entity in flight");
                            self.stopping.store(true, Ordering::Release);
                            let report = sweep.await;
                            self.stopping.store(false, Ordering::Release);
                            debug!("Abandoned {} entities on shutdown", report.abandoned);
                            break;
                        }
                    }
                }
            }
        }

        self.emit_event(SchedulerEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        // Flush registry before exiting
        self.registry.flush().await?;
        info!("Registry flushed, scheduler stopped");

        Ok(())
    }

    /// Run one sweep over the active entities
    ///
    /// Returns [`SweepReport::skipped()`] without doing anything when another
    /// sweep is in progress. Failures are isolated per entity and counted in
    /// the report; this method never fails as a whole.
    pub async fn sweep(&self) -> SweepReport {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in progress, skipping tick");
            self.emit_event(SchedulerEvent::SweepSkipped);
            return SweepReport::skipped();
        }
        let _guard = SweepGuard(&self.sweeping);

        let mut report = SweepReport::default();

        let entities = match self.registry.snapshot_active().await {
            Ok(entities) => entities,
            Err(e) => {
                error!("Failed to snapshot watch registry: {}", e);
                report.errors += 1;
                self.finish(&report);
                return report;
            }
        };

        debug!("Sweep started over {} active entities", entities.len());
        self.emit_event(SchedulerEvent::SweepStarted {
            entities: entities.len(),
        });

        for (index, entity) in entities.iter().enumerate() {
            if index > 0 {
                self.pace().await;
            }

            if self.stopping.load(Ordering::Acquire) {
                report.abandoned = entities.len() - index;
                info!("Sweep abandoned with {} entities unprobed", report.abandoned);
                break;
            }

            self.process(entity, &mut report).await;
        }

        self.finish(&report);
        report
    }

    /// Probe one entity and act on the result
    async fn process(&self, entity: &WatchedEntity, report: &mut SweepReport) {
        let outcome = self.transport.probe(&entity.id, &self.proxies).await;
        report.probed += 1;

        let Some(observed) = outcome.observed_state() else {
            debug!("Probe of {} was inconclusive, keeping {}", entity.id, entity.last_known_state);
            report.transient += 1;
            self.emit_event(SchedulerEvent::ProbeFailed {
                id: entity.id.clone(),
            });
            return;
        };

        let observed_at = Utc::now();
        let transition = detector::decide(&entity.id, entity.last_known_state, outcome);

        match self
            .registry
            .record_observation(&entity.id, observed, observed_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} was removed from the registry mid-sweep", entity.id);
                return;
            }
            Err(e) => {
                error!("Failed to record observation for {}: {}", entity.id, e);
                report.errors += 1;
                return;
            }
        }

        let Some(transition) = transition else {
            return;
        };

        if !transition.is_alert_worthy(self.config.notify_on_first_observation) {
            report.first_observations += 1;
            debug!(
                "First observation of {} recorded without alert: {}",
                transition.id, transition.to
            );
            return;
        }

        report.transitions += 1;
        info!(
            "{} changed: {} -> {}",
            transition.id, transition.from, transition.to
        );
        self.emit_event(SchedulerEvent::TransitionDetected {
            id: transition.id.clone(),
            from: transition.from,
            to: transition.to,
        });

        let event = transition.into_event(observed_at);
        match self
            .dispatcher
            .dispatch(&event, &entity.notification_target)
            .await
        {
            DispatchOutcome::Delivered => {
                report.notified += 1;
                self.emit_event(SchedulerEvent::NotificationDelivered { id: event.id });
            }
            DispatchOutcome::Unresolved(reason) | DispatchOutcome::Failed(reason) => {
                report.dropped += 1;
                self.emit_event(SchedulerEvent::NotificationDropped {
                    id: event.id,
                    reason,
                });
            }
        }
    }

    /// Wait between two probes of the same sweep
    async fn pace(&self) {
        let jitter = if self.config.probe_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.probe_jitter_ms)
        } else {
            0
        };

        let delay = self.config.probe_delay_ms + jitter;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn finish(&self, report: &SweepReport) {
        info!(
            "Sweep finished: {} probed, {} transient, {} transitions, {} first seen, {} notified, {} dropped",
            report.probed,
            report.transient,
            report.transitions,
            report.first_observations,
            report.notified,
            report.dropped
        );
        self.emit_event(SchedulerEvent::SweepFinished {
            probed: report.probed,
            transitions: report.transitions,
        });
    }

    /// Emit a scheduler event
    fn emit_event(&self, event: SchedulerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
