//! Configuration types for the account monitor
//!
//! This module defines all configuration structures used throughout the crate.
//! The core never reads the environment or files itself; front ends build a
//! [`MonitorConfig`] once at startup and hand it over.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::classification::ClassificationPolicy;
use crate::traits::{NotificationTarget, ProxyPool};

/// Default URL template for profile probes
pub const DEFAULT_URL_TEMPLATE: &str = "https://www.instagram.com/{id}/";

/// Default outbound identity header
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Placeholder substituted with the entity id in `url_template`
pub const ID_PLACEHOLDER: &str = "{id}";

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Probe transport configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Watch registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Optional egress routes; empty means direct egress
    #[serde(default)]
    pub proxies: ProxyPool,

    /// Target used when a watch command does not name one
    #[serde(default = "default_target")]
    pub default_target: NotificationTarget,
}

impl MonitorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            probe: ProbeConfig::default(),
            notifier: NotifierConfig::default(),
            registry: RegistryConfig::default(),
            scheduler: SchedulerConfig::default(),
            proxies: ProxyPool::default(),
            default_target: default_target(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.probe.validate()?;
        self.notifier.validate()?;
        self.registry.validate()?;
        self.scheduler.validate()?;
        self.proxies.validate()?;

        if self.default_target.is_empty() {
            return Err(crate::Error::config("Default notification target cannot be empty"));
        }

        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// HTTP profile fetch
    Http {
        /// URL with an `{id}` placeholder
        #[serde(default = "default_url_template")]
        url_template: String,
        /// Fixed `User-Agent` header
        #[serde(default = "default_user_agent")]
        user_agent: String,
        /// Per-probe timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// How responses map to outcomes
        #[serde(default)]
        classification: ClassificationPolicy,
    },

    /// Custom transport
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProbeConfig {
    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProbeConfig::Http {
                url_template,
                user_agent,
                timeout_secs,
                ..
            } => {
                if url_template.is_empty() {
                    return Err(crate::Error::config("Probe URL template cannot be empty"));
                }
                if !url_template.contains(ID_PLACEHOLDER) {
                    return Err(crate::Error::config(format!(
                        "Probe URL template must contain {}. Got: {}",
                        ID_PLACEHOLDER, url_template
                    )));
                }
                if !url_template.starts_with("https://") && !url_template.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Probe URL template must use HTTP or HTTPS scheme. Got: {}",
                        url_template
                    )));
                }
                if user_agent.trim().is_empty() {
                    return Err(crate::Error::config("Probe user agent cannot be empty"));
                }
                if !(1..=60).contains(timeout_secs) {
                    return Err(crate::Error::config(format!(
                        "Probe timeout must be between 1 and 60 seconds. Got: {}",
                        timeout_secs
                    )));
                }
                Ok(())
            }
            ProbeConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom probe factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the transport type name
    pub fn type_name(&self) -> &str {
        match self {
            ProbeConfig::Http { .. } => "http",
            ProbeConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::Http {
            url_template: default_url_template(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            classification: ClassificationPolicy::default(),
        }
    }
}

/// Notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Emit transitions as log lines
    #[default]
    Log,

    /// Chat webhook delivery
    Webhook {
        /// Target name -> webhook URL
        #[serde(default)]
        routes: HashMap<String, String>,
        /// URL used for targets without a route
        #[serde(default)]
        default_url: Option<String>,
    },

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Log => Ok(()),
            NotifierConfig::Webhook {
                routes,
                default_url,
            } => {
                if routes.is_empty() && default_url.is_none() {
                    return Err(crate::Error::config(
                        "Webhook notifier requires a default URL or at least one route",
                    ));
                }
                let named = routes.iter().map(|(name, url)| (name.as_str(), url));
                let fallback = default_url.iter().map(|url| ("default", url));
                for (name, url) in named.chain(fallback) {
                    if !url.starts_with("https://") && !url.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "Webhook route '{}' must be an HTTP or HTTPS URL",
                            name
                        )));
                    }
                }
                Ok(())
            }
            NotifierConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom notifier factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Log => "log",
            NotifierConfig::Webhook { .. } => "webhook",
            NotifierConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Watch registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryConfig {
    /// File-backed registry
    File {
        /// Path to the registry document
        path: String,
    },

    /// In-memory registry (not persistent)
    Memory,

    /// Custom registry
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl RegistryConfig {
    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RegistryConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Registry file path cannot be empty"))
            }
            RegistryConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom registry factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the registry type name
    pub fn type_name(&self) -> &str {
        match self {
            RegistryConfig::File { .. } => "file",
            RegistryConfig::Memory => "memory",
            RegistryConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::File {
            path: "data.json".to_string(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between sweep starts (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Fixed pause between two probes of the same sweep (in milliseconds)
    ///
    /// Keeps the sweep under upstream rate limits. Set to 0 in tests.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    /// Random extra pause added to `probe_delay_ms` (in milliseconds)
    #[serde(default = "default_probe_jitter_ms")]
    pub probe_jitter_ms: u64,

    /// Announce an entity whose very first successful probe says `REMOVED`
    ///
    /// A first observation of `ACTIVE` is never announced.
    #[serde(default = "default_notify_on_first_observation")]
    pub notify_on_first_observation: bool,

    /// Capacity of the scheduler event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_delay_ms: default_probe_delay_ms(),
            probe_jitter_ms: default_probe_jitter_ms(),
            notify_on_first_observation: default_notify_on_first_observation(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_target() -> NotificationTarget {
    NotificationTarget::new("general")
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    300
}

fn default_probe_delay_ms() -> u64 {
    1000
}

fn default_probe_jitter_ms() -> u64 {
    500
}

fn default_notify_on_first_observation() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}
