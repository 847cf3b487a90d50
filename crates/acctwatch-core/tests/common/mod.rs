//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that verify behavioral
//! contracts without real network or disk I/O.

#![allow(dead_code)]

use acctwatch_core::config::{MonitorConfig, RegistryConfig};
use acctwatch_core::error::{Error, Result};
use acctwatch_core::traits::{
    Endpoint, EntityFilter, EntityState, NotificationTarget, Notifier, ProbeOutcome,
    ProbeTransport, ProxyPool, TransitionEvent, WatchRegistry, WatchedEntity,
};
use acctwatch_core::MemoryWatchRegistry;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A transport that replays a scripted outcome sequence per id
///
/// Clones share the script and the call log.
#[derive(Clone)]
pub struct ScriptedTransport {
    scripts: Arc<Mutex<HashMap<String, VecDeque<ProbeOutcome>>>>,
    fallback: ProbeOutcome,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    /// Create a transport answering `fallback` once a script runs out
    pub fn new(fallback: ProbeOutcome) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue outcomes for one id
    pub fn script(&self, id: &str, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Number of probes issued for `id`
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    /// Number of probes issued in total
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn probe(&self, id: &str, _proxies: &ProxyPool) -> ProbeOutcome {
        self.calls.lock().unwrap().push(id.to_string());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback)
    }

    fn transport_name(&self) -> &'static str {
        "scripted"
    }
}

/// A transport whose probes block until the test releases them
#[derive(Clone)]
pub struct GatedTransport {
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
    outcome: ProbeOutcome,
}

impl GatedTransport {
    pub fn new(outcome: ProbeOutcome) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
            outcome,
        }
    }

    /// Let `n` more probes complete
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Number of probes that have started
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` probes have started
    pub async fn wait_entered(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("probes should start within 5 seconds");
    }
}

#[async_trait::async_trait]
impl ProbeTransport for GatedTransport {
    async fn probe(&self, _id: &str, _proxies: &ProxyPool) -> ProbeOutcome {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.outcome
    }

    fn transport_name(&self) -> &'static str {
        "gated"
    }
}

/// A notifier that records every delivered event
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<(String, TransitionEvent)>>>,
    dead: Arc<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets in `dead` fail to resolve, like a deleted channel
    pub fn with_dead_targets<'a>(dead: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            delivered: Arc::default(),
            dead: Arc::new(dead.into_iter().map(str::to_string).collect()),
        }
    }

    /// (endpoint, event) pairs in delivery order
    pub fn delivered(&self) -> Vec<(String, TransitionEvent)> {
        self.delivered.lock().unwrap().clone()
    }

    /// (id, from, to) triples in delivery order
    pub fn transitions(&self) -> Vec<(String, EntityState, EntityState)> {
        self.delivered()
            .into_iter()
            .map(|(_, e)| (e.id, e.from, e.to))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn resolve(&self, target: &NotificationTarget) -> Result<Endpoint> {
        if self.dead.contains(target.as_str()) {
            return Err(Error::not_found(format!("channel {} was deleted", target)));
        }
        Ok(Endpoint::new(target.as_str()))
    }

    async fn deliver(&self, endpoint: &Endpoint, event: &TransitionEvent) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((endpoint.as_str().to_string(), event.clone()));
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// A notifier that fails resolution for some targets and delivery for the rest
#[derive(Clone)]
pub struct FailingNotifier {
    unresolvable: Arc<HashSet<String>>,
    attempts: Arc<AtomicUsize>,
}

impl FailingNotifier {
    /// `unresolvable` targets fail to resolve; every other delivery fails
    pub fn new<'a>(unresolvable: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            unresolvable: Arc::new(unresolvable.into_iter().map(str::to_string).collect()),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of delivery attempts (resolved targets only)
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Notifier for FailingNotifier {
    async fn resolve(&self, target: &NotificationTarget) -> Result<Endpoint> {
        if self.unresolvable.contains(target.as_str()) {
            Err(Error::not_found(format!("channel {} was deleted", target)))
        } else {
            Ok(Endpoint::new(target.as_str()))
        }
    }

    async fn deliver(&self, _endpoint: &Endpoint, _event: &TransitionEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::notification("simulated delivery failure"))
    }

    fn notifier_name(&self) -> &'static str {
        "failing"
    }
}

/// A memory registry that fails observations for chosen ids and counts flushes
#[derive(Clone)]
pub struct FlakyRegistry {
    inner: MemoryWatchRegistry,
    failing: Arc<HashSet<String>>,
    flush_calls: Arc<AtomicUsize>,
}

impl FlakyRegistry {
    pub fn new<'a>(failing: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            inner: MemoryWatchRegistry::new(),
            failing: Arc::new(failing.into_iter().map(str::to_string).collect()),
            flush_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl WatchRegistry for FlakyRegistry {
    async fn upsert(&self, id: &str, target: &NotificationTarget) -> Result<WatchedEntity> {
        self.inner.upsert(id, target).await
    }

    async fn deactivate(&self, id: &str) -> Result<bool> {
        self.inner.deactivate(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<WatchedEntity>> {
        self.inner.get(id).await
    }

    async fn list_by(&self, filter: EntityFilter<'_>) -> Result<Vec<WatchedEntity>> {
        self.inner.list_by(filter).await
    }

    async fn record_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        if self.failing.contains(id) {
            return Err(Error::registry("simulated disk failure"));
        }
        self.inner.record_observation(id, state, observed_at).await
    }

    async fn record_first_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        if self.failing.contains(id) {
            return Err(Error::registry("simulated disk failure"));
        }
        self.inner.record_first_observation(id, state, observed_at).await
    }

    async fn retarget(&self, from: &NotificationTarget, to: &NotificationTarget) -> Result<usize> {
        self.inner.retarget(from, to).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.inner.remove(id).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A registry that can stall right after an upsert
///
/// Lets a test run a sweep between two registry calls of one command.
#[derive(Clone)]
pub struct PausingRegistry {
    inner: MemoryWatchRegistry,
    armed: Arc<AtomicBool>,
    paused: Arc<Semaphore>,
    resumed: Arc<Semaphore>,
}

impl PausingRegistry {
    pub fn new() -> Self {
        Self {
            inner: MemoryWatchRegistry::new(),
            armed: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(Semaphore::new(0)),
            resumed: Arc::new(Semaphore::new(0)),
        }
    }

    /// Stall the next upsert after it has been applied
    pub fn pause_after_next_upsert(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until an upsert is stalled
    pub async fn wait_paused(&self) {
        let permit = tokio::time::timeout(Duration::from_secs(5), self.paused.acquire())
            .await
            .expect("upsert should stall within 5 seconds")
            .expect("semaphore is never closed");
        permit.forget();
    }

    /// Let the stalled upsert return
    pub fn resume(&self) {
        self.resumed.add_permits(1);
    }
}

#[async_trait::async_trait]
impl WatchRegistry for PausingRegistry {
    async fn upsert(&self, id: &str, target: &NotificationTarget) -> Result<WatchedEntity> {
        let entity = self.inner.upsert(id, target).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.add_permits(1);
            if let Ok(permit) = self.resumed.acquire().await {
                permit.forget();
            }
        }
        Ok(entity)
    }

    async fn deactivate(&self, id: &str) -> Result<bool> {
        self.inner.deactivate(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<WatchedEntity>> {
        self.inner.get(id).await
    }

    async fn list_by(&self, filter: EntityFilter<'_>) -> Result<Vec<WatchedEntity>> {
        self.inner.list_by(filter).await
    }

    async fn record_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.record_observation(id, state, observed_at).await
    }

    async fn record_first_observation(
        &self,
        id: &str,
        state: EntityState,
        observed_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.record_first_observation(id, state, observed_at).await
    }

    async fn retarget(&self, from: &NotificationTarget, to: &NotificationTarget) -> Result<usize> {
        self.inner.retarget(from, to).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.inner.remove(id).await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Configuration with no pacing and an in-memory registry
pub fn minimal_config() -> MonitorConfig {
    let mut config = MonitorConfig::new();
    config.registry = RegistryConfig::Memory;
    config.scheduler.probe_delay_ms = 0;
    config.scheduler.probe_jitter_ms = 0;
    config
}

/// Ids of `entities`, in order
pub fn ids(entities: &[WatchedEntity]) -> Vec<String> {
    entities.iter().map(|e| e.id.clone()).collect()
}
