// # Probe Transport Trait
//
// Defines the interface for one outbound status check of a remote identifier.
//
// ## Implementations
//
// - HTTP: `acctwatch-probe-http` crate
//
// ## Contract
//
// A probe never fails with an error: every failure mode is folded into
// `ProbeOutcome::TransientError`, which the scheduler treats as "no
// information". Only `Active` and `Removed` may ever reach the registry.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::traits::watch_registry::EntityState;

/// Classified result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    /// The account is reachable
    Active,
    /// The account is gone (not-found response or removal marker)
    Removed,
    /// Timeout, connection failure, proxy failure, unexpected status
    TransientError,
}

impl ProbeOutcome {
    /// The state this outcome establishes, if any
    ///
    /// `TransientError` maps to `None` and must never overwrite stored state.
    pub fn observed_state(self) -> Option<EntityState> {
        match self {
            ProbeOutcome::Active => Some(EntityState::Active),
            ProbeOutcome::Removed => Some(EntityState::Removed),
            ProbeOutcome::TransientError => None,
        }
    }

    /// Whether the probe produced no usable information
    pub fn is_transient(self) -> bool {
        matches!(self, ProbeOutcome::TransientError)
    }
}

/// Set of optional egress routes (proxy URLs)
///
/// An empty pool is the normal case and means direct egress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyPool {
    routes: Vec<String>,
}

impl ProxyPool {
    /// Create a pool from proxy URLs
    pub fn new(routes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(Into::<String>::into)
                .filter(|route| !route.trim().is_empty())
                .collect(),
        }
    }

    /// A pool that always uses direct egress
    pub fn direct() -> Self {
        Self::default()
    }

    /// Whether probes go out directly
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// All configured routes
    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// Pick one route uniformly at random, or `None` for direct egress
    pub fn pick(&self) -> Option<&str> {
        self.routes
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    /// Validate route URLs
    pub fn validate(&self) -> Result<(), crate::Error> {
        for route in &self.routes {
            let supported = ["http://", "https://", "socks5://", "socks5h://"]
                .iter()
                .any(|scheme| route.starts_with(scheme));
            if !supported {
                return Err(crate::Error::config(format!(
                    "Proxy route must be an http, https or socks5 URL. Got: {}",
                    route
                )));
            }
        }
        Ok(())
    }
}

/// Trait for probe transport implementations
///
/// # Thread Safety
///
/// Probes may be issued concurrently by the scheduler and by verified
/// `watch` commands.
///
/// ## Implementation Guidelines
///
/// - **Bounded**: every probe has an explicit timeout
/// - **Single-shot**: no retries inside one call; a failing proxy is a
///   transient failure
/// - **Route per probe**: pick one route from the pool per call; an empty
///   pool means direct egress, not an error
/// - **No state**: never touch the registry
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Check the remote status of `id`
    async fn probe(&self, id: &str, proxies: &ProxyPool) -> ProbeOutcome;

    /// Short name used in logs
    fn transport_name(&self) -> &'static str;
}

/// Helper trait for constructing probe transports from configuration
pub trait ProbeTransportFactory: Send + Sync {
    /// Create a transport instance from configuration
    fn create(
        &self,
        config: &crate::config::ProbeConfig,
    ) -> Result<Box<dyn ProbeTransport>, crate::Error>;
}
