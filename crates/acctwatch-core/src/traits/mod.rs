//! Core traits for the account monitor
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProbeTransport`]: Check the remote status of one identifier
//! - [`WatchRegistry`]: Durable watch list shared by sweeps and commands
//! - [`Notifier`]: Resolve targets and deliver transition events

pub mod notifier;
pub mod probe_transport;
pub mod watch_registry;

pub use notifier::{Endpoint, Notifier, NotifierFactory, TransitionEvent};
pub use probe_transport::{ProbeOutcome, ProbeTransport, ProbeTransportFactory, ProxyPool};
pub use watch_registry::{
    EntityFilter, EntityState, NotificationTarget, WatchRegistry, WatchRegistryFactory,
    WatchedEntity,
};
