// # acctwatch-core
//
// Core library for the acctwatch account status monitor.
//
// ## Architecture Overview
//
// This library watches externally hosted accounts and reports when their
// observable state flips between reachable and removed:
// - **ProbeTransport**: Trait for one outbound status check of an identifier
// - **WatchRegistry**: Trait for the durable watch list (memory and file backed)
// - **detector**: Pure change detection over (previous state, probe outcome)
// - **PollScheduler**: Periodic, single-flight sweeps over active entities
// - **NotificationDispatcher**: Best-effort delivery through a `Notifier`
// - **Commands**: The watch/unwatch/status/list surface used by front ends
// - **PluginRegistry**: Factory registry so transports and notifiers plug in by name
//
// ## Design Principles
//
// 1. **Separation of Concerns**: I/O lives behind traits, decisions are pure functions
// 2. **No Globals**: The registry is constructed once and shared by `Arc`
// 3. **Failure Isolation**: One entity's failure never aborts a sweep
// 4. **Library-First**: The daemon is a thin layer over this crate

pub mod classification;
pub mod commands;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod plugins;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use classification::ClassificationPolicy;
pub use commands::{Commands, ListScope, RegistrySummary};
pub use config::{MonitorConfig, NotifierConfig, ProbeConfig, RegistryConfig, SchedulerConfig};
pub use detector::Transition;
pub use dispatch::{DispatchOutcome, LogNotifier, NotificationDispatcher};
pub use error::{Error, Result};
pub use plugins::PluginRegistry;
pub use scheduler::{PollScheduler, SchedulerEvent, SchedulerState, SweepReport};
pub use state::{FileWatchRegistry, MemoryWatchRegistry};
pub use traits::{
    EntityState, NotificationTarget, Notifier, ProbeOutcome, ProbeTransport, ProxyPool,
    TransitionEvent, WatchRegistry, WatchedEntity,
};
