//! Behavioral Contract Test: Change Detection
//!
//! This test verifies that sweeps turn probe outcomes into state changes
//! and notifications exactly once per real change.
//!
//! Constraints verified:
//! - A first ACTIVE observation is recorded silently
//! - ACTIVE -> REMOVED produces exactly one notification
//! - Transient failures leave state, last_checked_at and notifications untouched
//! - Repeated identical outcomes never re-notify
//!
//! If this test fails, someone has:
//! - Let TRANSIENT_ERROR reach the registry
//! - Compared against the wrong stored state
//! - Notified on unchanged state

mod common;

use acctwatch_core::traits::EntityState::{Active, Removed, Unknown};
use acctwatch_core::traits::ProbeOutcome;
use acctwatch_core::{
    Commands, MemoryWatchRegistry, NotificationTarget, PollScheduler, SchedulerEvent,
    WatchRegistry,
};
use common::*;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

struct Harness {
    scheduler: PollScheduler,
    commands: Commands,
    transport: ScriptedTransport,
    notifier: RecordingNotifier,
    registry: Arc<MemoryWatchRegistry>,
}

fn harness(fallback: ProbeOutcome) -> Harness {
    harness_with(fallback, minimal_config())
}

fn harness_with(fallback: ProbeOutcome, config: acctwatch_core::MonitorConfig) -> Harness {
    let transport = ScriptedTransport::new(fallback);
    let notifier = RecordingNotifier::new();
    let registry = Arc::new(MemoryWatchRegistry::new());

    let (scheduler, _events) = PollScheduler::new(
        Arc::new(transport.clone()),
        Box::new(notifier.clone()),
        registry.clone(),
        &config,
    )
    .expect("scheduler construction succeeds");

    let commands = Commands::new(registry.clone(), config.default_target.clone());

    Harness {
        scheduler,
        commands,
        transport,
        notifier,
        registry,
    }
}

#[tokio::test]
async fn scenario_a_first_active_observation_is_silent() {
    let h = harness(ProbeOutcome::Active);
    h.commands.watch("bob", None).await.unwrap();

    let report = h.scheduler.sweep().await;

    let bob = h.commands.status("bob").await.unwrap();
    assert_eq!(bob.last_known_state, Active);
    assert!(bob.last_checked_at.is_some());
    assert_eq!(report.transitions, 0);
    assert_eq!(report.first_observations, 1);
    assert_eq!(
        h.notifier.count(),
        0,
        "UNKNOWN -> ACTIVE must not produce a restored alert"
    );
}

#[tokio::test]
async fn scenario_b_active_to_removed_notifies_once() {
    let h = harness(ProbeOutcome::Removed);
    h.commands.watch("bob", None).await.unwrap();
    h.transport.script("bob", [ProbeOutcome::Active]);

    h.scheduler.sweep().await;
    assert_eq!(h.notifier.count(), 0);

    h.scheduler.sweep().await;
    assert_eq!(h.notifier.transitions(), vec![("bob".to_string(), Active, Removed)]);

    let (endpoint, event) = h.notifier.delivered().remove(0);
    assert_eq!(endpoint, "general");
    let bob = h.commands.status("bob").await.unwrap();
    assert_eq!(bob.last_known_state, Removed);
    assert_eq!(Some(event.timestamp), bob.last_checked_at);

    // Still removed: no further alerts
    h.scheduler.sweep().await;
    h.scheduler.sweep().await;
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn scenario_c_timeout_keeps_removed_state() {
    let h = harness(ProbeOutcome::TransientError);
    h.commands.watch("bob", None).await.unwrap();
    h.transport.script("bob", [ProbeOutcome::Active, ProbeOutcome::Removed]);

    h.scheduler.sweep().await;
    h.scheduler.sweep().await;
    let before = h.commands.status("bob").await.unwrap();
    assert_eq!(before.last_known_state, Removed);
    let notifications = h.notifier.count();

    let report = h.scheduler.sweep().await;

    let after = h.commands.status("bob").await.unwrap();
    assert_eq!(report.transient, 1);
    assert_eq!(after.last_known_state, Removed);
    assert_eq!(after.last_checked_at, before.last_checked_at);
    assert_eq!(h.notifier.count(), notifications);
}

#[tokio::test]
async fn outcome_sequence_yields_two_transitions() {
    let h = harness(ProbeOutcome::TransientError);
    h.commands.watch("bob", None).await.unwrap();
    h.transport.script(
        "bob",
        [
            ProbeOutcome::Active,
            ProbeOutcome::Active,
            ProbeOutcome::Removed,
            ProbeOutcome::Removed,
            ProbeOutcome::Active,
        ],
    );

    for _ in 0..5 {
        h.scheduler.sweep().await;
    }

    assert_eq!(h.transport.calls_for("bob"), 5);
    assert_eq!(
        h.notifier.transitions(),
        vec![
            ("bob".to_string(), Active, Removed),
            ("bob".to_string(), Removed, Active),
        ]
    );
}

#[tokio::test]
async fn transient_errors_are_idempotent_from_every_state() {
    for primed in [None, Some(ProbeOutcome::Active), Some(ProbeOutcome::Removed)] {
        let h = harness(ProbeOutcome::TransientError);
        h.commands.watch("bob", None).await.unwrap();
        if let Some(outcome) = primed {
            h.transport.script("bob", [outcome]);
            h.scheduler.sweep().await;
        }

        let before = h.registry.get("bob").await.unwrap().unwrap();
        let notifications = h.notifier.count();

        for _ in 0..3 {
            h.scheduler.sweep().await;
        }

        let after = h.registry.get("bob").await.unwrap().unwrap();
        assert_eq!(after, before, "primed with {:?}", primed);
        assert_eq!(h.notifier.count(), notifications);
    }
}

#[tokio::test]
async fn first_removed_observation_respects_setting() {
    let h = harness(ProbeOutcome::Removed);
    h.commands.watch("bob", None).await.unwrap();
    h.scheduler.sweep().await;
    assert_eq!(h.notifier.transitions(), vec![("bob".to_string(), Unknown, Removed)]);

    let mut quiet = minimal_config();
    quiet.scheduler.notify_on_first_observation = false;
    let h = harness_with(ProbeOutcome::Removed, quiet);
    h.commands.watch("bob", None).await.unwrap();
    let report = h.scheduler.sweep().await;
    assert_eq!(h.notifier.count(), 0);
    assert_eq!((report.transitions, report.first_observations), (0, 1));
    assert_eq!(h.commands.status("bob").await.unwrap().last_known_state, Removed);
}

#[tokio::test]
async fn notifications_go_to_the_entity_target() {
    let h = harness(ProbeOutcome::Removed);
    h.commands
        .watch("alice", Some(NotificationTarget::new("mods")))
        .await
        .unwrap();
    h.commands.watch("bob", None).await.unwrap();

    h.scheduler.sweep().await;

    let endpoints: Vec<String> = h
        .notifier
        .delivered()
        .into_iter()
        .map(|(endpoint, _)| endpoint)
        .collect();
    assert_eq!(endpoints, vec!["mods", "general"]);
}

#[tokio::test]
async fn sweep_emits_events_in_order() {
    let transport = ScriptedTransport::new(ProbeOutcome::Removed);
    transport.script("bob", [ProbeOutcome::Active, ProbeOutcome::Removed]);
    let registry = Arc::new(MemoryWatchRegistry::new());
    registry
        .upsert("bob", &NotificationTarget::new("general"))
        .await
        .unwrap();

    let (scheduler, events) = PollScheduler::new(
        Arc::new(transport),
        Box::new(RecordingNotifier::new()),
        registry,
        &minimal_config(),
    )
    .unwrap();

    scheduler.sweep().await;
    scheduler.sweep().await;
    drop(scheduler);

    let events: Vec<SchedulerEvent> = ReceiverStream::new(events).collect().await;
    assert_eq!(
        events,
        vec![
            SchedulerEvent::SweepStarted { entities: 1 },
            SchedulerEvent::SweepFinished {
                probed: 1,
                transitions: 0,
            },
            SchedulerEvent::SweepStarted { entities: 1 },
            SchedulerEvent::TransitionDetected {
                id: "bob".to_string(),
                from: Active,
                to: Removed,
            },
            SchedulerEvent::NotificationDelivered {
                id: "bob".to_string(),
            },
            SchedulerEvent::SweepFinished {
                probed: 1,
                transitions: 1,
            },
        ]
    );
}
