//! Minimal embedding example for acctwatch-core
//!
//! This example demonstrates using acctwatch-core as a library in a custom
//! application. The scheduler lifecycle is fully managed by the application.

use acctwatch_core::traits::{ProbeOutcome, ProbeTransport, ProxyPool};
use acctwatch_core::{
    Commands, ListScope, LogNotifier, MemoryWatchRegistry, MonitorConfig, NotificationTarget,
    PollScheduler, RegistryConfig, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// A transport that answers from a table instead of the network
///
/// `flip` marks an id as removed from the next probe on.
#[derive(Clone, Default)]
struct TableTransport {
    removed: Arc<Mutex<HashMap<String, bool>>>,
}

impl TableTransport {
    fn flip(&self, id: &str) {
        if let Ok(mut removed) = self.removed.lock() {
            removed.insert(id.to_string(), true);
        }
    }
}

#[async_trait::async_trait]
impl ProbeTransport for TableTransport {
    async fn probe(&self, id: &str, _proxies: &ProxyPool) -> ProbeOutcome {
        match self.removed.lock() {
            Ok(removed) if removed.get(id).copied().unwrap_or(false) => ProbeOutcome::Removed,
            Ok(_) => ProbeOutcome::Active,
            Err(_) => ProbeOutcome::TransientError,
        }
    }

    fn transport_name(&self) -> &'static str {
        "table"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(true).init();

    println!("=== Embedded acctwatch-core Example ===\n");

    // Create custom components
    let transport = TableTransport::default();
    let registry = Arc::new(MemoryWatchRegistry::new());

    let mut config = MonitorConfig::new();
    config.registry = RegistryConfig::Memory;
    config.scheduler.interval_secs = 1;
    config.scheduler.probe_delay_ms = 0;
    config.scheduler.probe_jitter_ms = 0;

    println!("1. Watching accounts...");
    let commands = Commands::new(registry.clone(), NotificationTarget::new("general"))
        .with_verifier(Arc::new(transport.clone()), ProxyPool::direct());
    commands.watch_verified("alice", None).await?;
    commands
        .watch_verified("bob", Some(NotificationTarget::new("mods")))
        .await?;

    println!("2. Creating scheduler...");
    let (scheduler, events) = PollScheduler::new(
        Arc::new(transport.clone()),
        Box::new(LogNotifier::new()),
        registry,
        &config,
    )?;

    let event_listener = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            println!("[Event] {:?}", event);
        }
        println!("Event listener stopped");
    });

    println!("3. Starting scheduler in background...");
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_handle =
        tokio::spawn(async move { scheduler.run_with_shutdown(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("\n4. bob disappears upstream; the next sweep reports it\n");
    transport.flip("bob");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    println!("\n5. Stopping scheduler...");
    let _ = shutdown_tx.send(());
    match scheduler_handle.await {
        Ok(result) => result?,
        Err(e) => println!("Scheduler task failed: {}", e),
    }
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n6. Final watch list:");
    for entity in commands.list(ListScope::All).await? {
        println!(
            "   {} -> {} (target {})",
            entity.id, entity.last_known_state, entity.notification_target
        );
    }

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Scheduler lifecycle is fully controlled by application");
    println!("- No global state");
    println!("- All components are custom (not acctwatchd defaults)");

    Ok(())
}
