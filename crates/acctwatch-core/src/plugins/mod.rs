//! Plugin registry
//!
//! The registry maps type names to factories so probe transports, notifiers
//! and watch registries can be selected from configuration at runtime,
//! avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use acctwatch_core::PluginRegistry;
//!
//! let plugins = PluginRegistry::with_builtins();
//! acctwatch_probe_http::register(&plugins);
//! acctwatch_notify_webhook::register(&plugins);
//!
//! let transport = plugins.create_probe_transport(&config.probe)?;
//! let notifier = plugins.create_notifier(&config.notifier)?;
//! let registry = plugins.create_registry(&config.registry).await?;
//! ```
//!
//! ## Registration
//!
//! Satellite crates register themselves during initialization:
//!
//! ```rust,ignore
//! pub fn register(plugins: &PluginRegistry) {
//!     plugins.register_probe_transport("http", Box::new(HttpProbeFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{NotifierConfig, ProbeConfig, RegistryConfig};
use crate::dispatch::LogNotifierFactory;
use crate::error::{Error, Result};
use crate::state::{FileWatchRegistryFactory, MemoryWatchRegistryFactory};
use crate::traits::{
    Notifier, NotifierFactory, ProbeTransport, ProbeTransportFactory, WatchRegistry,
    WatchRegistryFactory,
};

/// Factory registry for plugin-based construction
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered probe transport factories
    transports: RwLock<HashMap<String, Box<dyn ProbeTransportFactory>>>,

    /// Registered notifier factories
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,

    /// Registered watch registry factories
    registries: RwLock<HashMap<String, Arc<dyn WatchRegistryFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-crate implementations registered
    ///
    /// - registries: `memory`, `file`
    /// - notifiers: `log`
    pub fn with_builtins() -> Self {
        let plugins = Self::new();
        plugins.register_registry("memory", Box::new(MemoryWatchRegistryFactory));
        plugins.register_registry("file", Box::new(FileWatchRegistryFactory));
        plugins.register_notifier("log", Box::new(LogNotifierFactory));
        plugins
    }

    /// Register a probe transport factory
    ///
    /// # Parameters
    ///
    /// - `name`: Transport type name (e.g., "http")
    /// - `factory`: Factory object for creating transport instances
    pub fn register_probe_transport(
        &self,
        name: impl Into<String>,
        factory: Box<dyn ProbeTransportFactory>,
    ) {
        let mut transports = self
            .transports
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        transports.insert(name.into(), factory);
    }

    /// Register a notifier factory
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        let mut notifiers = self
            .notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.insert(name.into(), factory);
    }

    /// Register a watch registry factory
    pub fn register_registry(
        &self,
        name: impl Into<String>,
        factory: Box<dyn WatchRegistryFactory>,
    ) {
        let mut registries = self
            .registries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        registries.insert(name.into(), Arc::from(factory));
    }

    /// Create a probe transport from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ProbeTransport>)`: Created transport instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_probe_transport(&self, config: &ProbeConfig) -> Result<Box<dyn ProbeTransport>> {
        let type_name = config.type_name();
        let transports = self
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = transports
            .get(type_name)
            .ok_or_else(|| Error::config(format!("Unknown probe transport type: {}", type_name)))?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let type_name = config.type_name();
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = notifiers
            .get(type_name)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", type_name)))?;

        factory.create(config)
    }

    /// Create a watch registry from configuration
    pub async fn create_registry(&self, config: &RegistryConfig) -> Result<Arc<dyn WatchRegistry>> {
        let type_name = config.type_name();

        let factory = {
            let registries = self
                .registries
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            registries
                .get(type_name)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown registry type: {}", type_name)))?
        };

        // Lock released before the async create
        factory.create(config).await
    }

    /// List all registered probe transport types
    pub fn list_probe_transports(&self) -> Vec<String> {
        let transports = self
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        transports.keys().cloned().collect()
    }

    /// List all registered notifier types
    pub fn list_notifiers(&self) -> Vec<String> {
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.keys().cloned().collect()
    }

    /// List all registered registry types
    pub fn list_registries(&self) -> Vec<String> {
        let registries = self
            .registries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registries.keys().cloned().collect()
    }

    /// Check if a probe transport type is registered
    pub fn has_probe_transport(&self, name: &str) -> bool {
        let transports = self
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        transports.contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.contains_key(name)
    }

    /// Check if a registry type is registered
    pub fn has_registry(&self, name: &str) -> bool {
        let registries = self
            .registries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registries.contains_key(name)
    }
}
