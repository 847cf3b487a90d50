//! Behavioral Contract Test: Watch Lifecycle
//!
//! This test verifies the command surface against the registry invariants.
//!
//! Constraints verified:
//! - One record per id; re-watching updates target and active only
//! - Identifiers are case-normalized before every lookup
//! - Unwatched entities are kept but never probed
//! - List order is insertion order, independent of state changes
//! - Invalid input never reaches the registry
//! - A verified watch never overwrites a state a sweep already recorded
//! - Retargeting moves every matching entity, watched or not

mod common;

use acctwatch_core::traits::EntityState::{Active, Removed, Unknown};
use acctwatch_core::traits::{ProbeOutcome, ProxyPool};
use acctwatch_core::{
    Commands, Error, FileWatchRegistry, ListScope, MemoryWatchRegistry, NotificationTarget,
    PollScheduler, WatchRegistry,
};
use common::*;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn commands_over(registry: Arc<dyn WatchRegistry>) -> Commands {
    Commands::new(registry, NotificationTarget::new("general"))
}

#[tokio::test]
async fn rewatch_updates_target_without_duplicating() {
    let commands = commands_over(Arc::new(MemoryWatchRegistry::new()));

    assert_ok!(
        commands
            .watch("alice", Some(NotificationTarget::new("t1")))
            .await
    );
    assert_ok!(
        commands
            .watch("alice", Some(NotificationTarget::new("t2")))
            .await
    );

    let all = commands.list(ListScope::All).await.unwrap();
    assert_eq!(ids(&all), vec!["alice"]);
    assert_eq!(all[0].notification_target.as_str(), "t2");
}

#[tokio::test]
async fn identifiers_are_case_normalized() {
    let commands = commands_over(Arc::new(MemoryWatchRegistry::new()));

    commands.watch("Alice", None).await.unwrap();

    let alice = assert_ok!(commands.status("alice").await);
    assert_eq!(alice.id, "alice");
    assert_eq!(commands.status("@ALICE").await.unwrap(), alice);
    assert_eq!(commands.list(ListScope::All).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unwatched_entities_are_kept_but_not_probed() {
    let transport = ScriptedTransport::new(ProbeOutcome::Removed);
    let registry = Arc::new(MemoryWatchRegistry::new());
    let commands = commands_over(registry.clone());
    let (scheduler, _events) = PollScheduler::new(
        Arc::new(transport.clone()),
        Box::new(RecordingNotifier::new()),
        registry,
        &minimal_config(),
    )
    .unwrap();

    commands.watch("alice", None).await.unwrap();
    commands.watch("bob", None).await.unwrap();
    scheduler.sweep().await;
    assert_eq!(transport.calls_for("alice"), 1);

    commands.unwatch("alice").await.unwrap();
    scheduler.sweep().await;
    scheduler.sweep().await;

    assert_eq!(transport.calls_for("alice"), 1, "unwatched entity was probed");
    assert_eq!(transport.calls_for("bob"), 3);

    let alice = commands.status("alice").await.unwrap();
    assert!(!alice.active);
    assert_eq!(alice.last_known_state, Removed);
}

#[tokio::test]
async fn rewatch_keeps_last_known_state() {
    let registry = Arc::new(MemoryWatchRegistry::new());
    let commands = commands_over(registry.clone());

    commands.watch("alice", None).await.unwrap();
    registry
        .record_observation("alice", Removed, chrono::Utc::now())
        .await
        .unwrap();
    commands.unwatch("alice").await.unwrap();

    let alice = commands.watch("alice", None).await.unwrap();
    assert!(alice.active);
    assert_eq!(alice.last_known_state, Removed);
}

#[tokio::test]
async fn scenario_d_list_keeps_insertion_order() {
    let transport = ScriptedTransport::new(ProbeOutcome::Active);
    transport.script("carol", [ProbeOutcome::Removed]);
    transport.script("alice", [ProbeOutcome::TransientError]);

    let registry = Arc::new(MemoryWatchRegistry::new());
    let commands = commands_over(registry.clone());
    let (scheduler, _events) = PollScheduler::new(
        Arc::new(transport),
        Box::new(RecordingNotifier::new()),
        registry,
        &minimal_config(),
    )
    .unwrap();

    for id in ["alice", "bob", "carol"] {
        commands.watch(id, None).await.unwrap();
    }
    scheduler.sweep().await;
    commands
        .watch("alice", Some(NotificationTarget::new("other")))
        .await
        .unwrap();

    let all = commands.list(ListScope::All).await.unwrap();
    assert_eq!(ids(&all), vec!["alice", "bob", "carol"]);
    assert_eq!(all[0].last_known_state, Unknown);
    assert_eq!(all[2].last_known_state, Removed);
}

#[tokio::test]
async fn file_registry_keeps_order_and_state_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");

    {
        let registry = Arc::new(FileWatchRegistry::new(&path).await.unwrap());
        let commands = commands_over(registry.clone());
        for id in ["carol", "alice", "bob"] {
            commands.watch(id, None).await.unwrap();
        }
        registry
            .record_observation("alice", Removed, chrono::Utc::now())
            .await
            .unwrap();
        commands.unwatch("bob").await.unwrap();
    }

    let commands = commands_over(Arc::new(FileWatchRegistry::new(&path).await.unwrap()));
    let all = commands.list(ListScope::All).await.unwrap();
    assert_eq!(ids(&all), vec!["carol", "alice", "bob"]);
    assert_eq!(all[1].last_known_state, Removed);
    assert!(!all[2].active);
}

#[tokio::test]
async fn invalid_input_never_reaches_registry() {
    let registry = Arc::new(FlakyRegistry::new(Vec::<&str>::new()));
    let commands = commands_over(registry.clone());

    for bad in ["", "  ", "two words", "semi;colon", "slash/path", "..", ".", "@-"] {
        let err = assert_err!(commands.watch(bad, None).await);
        assert!(matches!(err, Error::InvalidInput(_)), "{:?} gave {:?}", bad, err);
        assert!(matches!(
            commands.status(bad).await,
            Err(Error::InvalidInput(_))
        ));
    }

    assert!(registry
        .list_by(&|_: &acctwatch_core::WatchedEntity| true)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unwatch_and_status_report_missing_ids() {
    let commands = commands_over(Arc::new(MemoryWatchRegistry::new()));

    assert!(commands.unwatch("nobody").await.unwrap_err().is_not_found());
    assert!(commands.status("nobody").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn hard_remove_forgets_entity() {
    let commands = commands_over(Arc::new(MemoryWatchRegistry::new()));
    commands.watch("alice", None).await.unwrap();

    assert_ok!(commands.remove("ALICE").await);
    assert!(commands.status("alice").await.unwrap_err().is_not_found());
    assert!(commands.list(ListScope::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn verified_watch_racing_a_sweep_alerts_once() {
    let registry = Arc::new(PausingRegistry::new());
    let transport = ScriptedTransport::new(ProbeOutcome::Removed);
    transport.script("bob", [ProbeOutcome::Active]);
    let notifier = RecordingNotifier::new();

    let (scheduler, _events) = PollScheduler::new(
        Arc::new(transport),
        Box::new(notifier.clone()),
        registry.clone(),
        &minimal_config(),
    )
    .unwrap();

    let commands = commands_over(registry.clone());
    commands.watch("bob", None).await.unwrap();
    scheduler.sweep().await;
    assert_eq!(commands.status("bob").await.unwrap().last_known_state, Active);

    let verified = commands.clone().with_verifier(
        Arc::new(ScriptedTransport::new(ProbeOutcome::Active)),
        ProxyPool::direct(),
    );
    registry.pause_after_next_upsert();
    let watching = tokio::spawn(async move { verified.watch_verified("bob", None).await });

    // A sweep lands between the upsert and the verified write, sees bob
    // gone and alerts
    registry.wait_paused().await;
    scheduler.sweep().await;
    assert_eq!(notifier.count(), 1);
    registry.resume();

    let bob = assert_ok!(watching.await.unwrap());
    assert_eq!(bob.last_known_state, Removed);

    scheduler.sweep().await;
    assert_eq!(
        notifier.transitions(),
        vec![("bob".to_string(), Active, Removed)],
        "one real change must alert exactly once"
    );
}

#[tokio::test]
async fn retarget_moves_matching_entities() {
    let commands = commands_over(Arc::new(MemoryWatchRegistry::new()));
    commands.watch("alice", None).await.unwrap();
    commands
        .watch("bob", Some(NotificationTarget::new("mods")))
        .await
        .unwrap();
    commands.watch("carol", None).await.unwrap();
    commands.unwatch("carol").await.unwrap();

    let moved = assert_ok!(
        commands
            .retarget(
                &NotificationTarget::new("general"),
                NotificationTarget::new("alerts"),
            )
            .await
    );
    assert_eq!(moved, 2);

    let on_alerts = commands
        .list(ListScope::Target(NotificationTarget::new("alerts")))
        .await
        .unwrap();
    assert_eq!(ids(&on_alerts), vec!["alice", "carol"]);
    assert!(!on_alerts[1].active, "retarget does not reactivate");

    let err = assert_err!(
        commands
            .retarget(&NotificationTarget::new("mods"), NotificationTarget::new(""))
            .await
    );
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(
        commands.status("bob").await.unwrap().notification_target.as_str(),
        "mods"
    );
}

#[tokio::test]
async fn new_default_target_redirects_alerts() {
    let registry = Arc::new(MemoryWatchRegistry::new());
    let notifier = RecordingNotifier::new();
    let commands = commands_over(registry.clone());
    commands.watch("alice", None).await.unwrap();

    let (scheduler, _events) = PollScheduler::new(
        Arc::new(ScriptedTransport::new(ProbeOutcome::Removed)),
        Box::new(notifier.clone()),
        registry,
        &minimal_config(),
    )
    .unwrap();

    assert_eq!(
        assert_ok!(
            commands
                .set_default_target(NotificationTarget::new("alerts"))
                .await
        ),
        1
    );
    commands.watch("bob", None).await.unwrap();

    scheduler.sweep().await;

    let endpoints: Vec<String> = notifier
        .delivered()
        .into_iter()
        .map(|(endpoint, _)| endpoint)
        .collect();
    assert_eq!(endpoints, vec!["alerts", "alerts"]);
}
