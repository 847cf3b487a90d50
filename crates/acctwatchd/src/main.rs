// # acctwatchd - Account Watch Daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add probing, change detection, or delivery logic here
// - All monitoring logic lives in acctwatch-core
// - Configuration is via environment variables ONLY
//
// The acctwatchd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime
// 3. Registering the probe transport and notifier plugins
// 4. Seeding the watch list and starting the scheduler
//
// ## Configuration
//
// ### Probe
// - `ACCTWATCH_PROBE_URL_TEMPLATE`: Profile URL with an `{id}` placeholder
// - `ACCTWATCH_USER_AGENT`: Fixed User-Agent header
// - `ACCTWATCH_PROBE_TIMEOUT_SECS`: Per-probe timeout in seconds
// - `ACCTWATCH_REMOVED_MARKER`: Body text that means the account is gone
// - `ACCTWATCH_NOT_FOUND_IS_REMOVED`: Treat 404/410 as removed (true/false)
// - `ACCTWATCH_PROXIES`: Comma-separated proxy URLs (empty = direct egress)
//
// ### Notifier
// - `ACCTWATCH_NOTIFIER_TYPE`: Notifier type (webhook, log)
// - `ACCTWATCH_WEBHOOK_URL`: Default webhook URL
// - `ACCTWATCH_WEBHOOK_ROUTES`: Named webhooks, `name=url,name=url`
// - `ACCTWATCH_DEFAULT_TARGET`: Target for watches that name none
//
// ### Registry
// - `ACCTWATCH_REGISTRY_TYPE`: Type of registry (file, memory)
// - `ACCTWATCH_REGISTRY_PATH`: Path to the registry file (for file registry)
// - `ACCTWATCH_WATCH`: Comma-separated ids to watch at startup
//
// ### Scheduler
// - `ACCTWATCH_POLL_INTERVAL_SECS`: Seconds between sweep starts
// - `ACCTWATCH_PROBE_DELAY_MS`: Pause between two probes of a sweep
// - `ACCTWATCH_PROBE_JITTER_MS`: Random extra pause between probes
// - `ACCTWATCH_NOTIFY_ON_FIRST_OBSERVATION`: Announce ids first seen removed
//
// ## Example
//
// ```bash
// export ACCTWATCH_WEBHOOK_URL=https://discord.com/api/webhooks/...
// export ACCTWATCH_REGISTRY_PATH=/var/lib/acctwatch/data.json
// export ACCTWATCH_WATCH=alice,bob
//
// acctwatchd
// ```

use acctwatch_core::config::{
    DEFAULT_URL_TEMPLATE, DEFAULT_USER_AGENT, MonitorConfig, NotifierConfig, ProbeConfig,
    RegistryConfig, SchedulerConfig,
};
use acctwatch_core::{
    ClassificationPolicy, Commands, NotificationTarget, PluginRegistry, PollScheduler,
    ProxyPool, SchedulerEvent,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for the in-flight entity's notification
const DELIVERY_ALLOWANCE: Duration = Duration::from_secs(10);

/// Time allowed for the final registry flush
const FLUSH_ALLOWANCE: Duration = Duration::from_secs(5);

/// Probe bound assumed for transports that do not declare one
const MAX_PROBE_TIMEOUT_SECS: u64 = 60;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum AcctwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<AcctwatchExitCode> for ExitCode {
    fn from(code: AcctwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    url_template: String,
    user_agent: String,
    probe_timeout_secs: u64,
    removed_marker: Option<String>,
    not_found_is_removed: bool,
    proxies: Vec<String>,
    notifier_type: String,
    webhook_url: Option<String>,
    webhook_routes: HashMap<String, String>,
    default_target: String,
    registry_type: String,
    registry_path: String,
    seed_ids: Vec<String>,
    poll_interval_secs: u64,
    probe_delay_ms: u64,
    probe_jitter_ms: u64,
    notify_on_first_observation: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let parse = |name: &str, default: u64| -> Result<u64> {
            parse_or(name, get(name), default)
        };
        let flag = |name: &str, default: bool| -> Result<bool> {
            parse_or(name, get(name), default)
        };

        Ok(Self {
            url_template: get("ACCTWATCH_PROBE_URL_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_URL_TEMPLATE.to_string()),
            user_agent: get("ACCTWATCH_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            probe_timeout_secs: parse("ACCTWATCH_PROBE_TIMEOUT_SECS", 10)?,
            removed_marker: lookup("ACCTWATCH_REMOVED_MARKER"),
            not_found_is_removed: flag("ACCTWATCH_NOT_FOUND_IS_REMOVED", true)?,
            proxies: split_list(get("ACCTWATCH_PROXIES").as_deref()),
            notifier_type: get("ACCTWATCH_NOTIFIER_TYPE")
                .unwrap_or_else(|| "webhook".to_string()),
            webhook_url: get("ACCTWATCH_WEBHOOK_URL"),
            webhook_routes: parse_routes(get("ACCTWATCH_WEBHOOK_ROUTES").as_deref())?,
            default_target: get("ACCTWATCH_DEFAULT_TARGET")
                .unwrap_or_else(|| "general".to_string()),
            registry_type: get("ACCTWATCH_REGISTRY_TYPE").unwrap_or_else(|| "file".to_string()),
            registry_path: get("ACCTWATCH_REGISTRY_PATH")
                .unwrap_or_else(|| "data.json".to_string()),
            seed_ids: split_list(get("ACCTWATCH_WATCH").as_deref()),
            poll_interval_secs: parse("ACCTWATCH_POLL_INTERVAL_SECS", 300)?,
            probe_delay_ms: parse("ACCTWATCH_PROBE_DELAY_MS", 1000)?,
            probe_jitter_ms: parse("ACCTWATCH_PROBE_JITTER_MS", 500)?,
            notify_on_first_observation: flag("ACCTWATCH_NOTIFY_ON_FIRST_OBSERVATION", true)?,
            log_level: get("ACCTWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the settings the core does not check itself
    fn validate(&self) -> Result<()> {
        match self.notifier_type.as_str() {
            "webhook" => {
                if self.webhook_url.is_none() && self.webhook_routes.is_empty() {
                    anyhow::bail!(
                        "ACCTWATCH_WEBHOOK_URL or ACCTWATCH_WEBHOOK_ROUTES is required \
                        when ACCTWATCH_NOTIFIER_TYPE=webhook. \
                        Set it via: export ACCTWATCH_WEBHOOK_URL=https://..."
                    );
                }
            }
            "log" => {}
            _ => anyhow::bail!(
                "ACCTWATCH_NOTIFIER_TYPE '{}' is not supported. \
                Supported types: webhook, log",
                self.notifier_type
            ),
        }

        match self.registry_type.as_str() {
            "file" => {
                if let Some(parent) = std::path::Path::new(&self.registry_path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "ACCTWATCH_REGISTRY_PATH parent directory does not exist: {}. \
                        Create it first: mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "ACCTWATCH_REGISTRY_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.registry_type
            ),
        }

        if !(10..=86_400).contains(&self.poll_interval_secs) {
            anyhow::bail!(
                "ACCTWATCH_POLL_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.poll_interval_secs
            );
        }

        if !(1..=60).contains(&self.probe_timeout_secs) {
            anyhow::bail!(
                "ACCTWATCH_PROBE_TIMEOUT_SECS must be between 1 and 60 seconds. Got: {}",
                self.probe_timeout_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ACCTWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the core configuration
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut classification = ClassificationPolicy::default();
        if let Some(marker) = &self.removed_marker {
            classification.removed_marker = marker.clone();
        }
        classification.not_found_is_removed = self.not_found_is_removed;

        let notifier = match self.notifier_type.as_str() {
            "log" => NotifierConfig::Log,
            _ => NotifierConfig::Webhook {
                routes: self.webhook_routes.clone(),
                default_url: self.webhook_url.clone(),
            },
        };

        let registry = match self.registry_type.as_str() {
            "memory" => RegistryConfig::Memory,
            _ => RegistryConfig::File {
                path: self.registry_path.clone(),
            },
        };

        let config = MonitorConfig {
            probe: ProbeConfig::Http {
                url_template: self.url_template.clone(),
                user_agent: self.user_agent.clone(),
                timeout_secs: self.probe_timeout_secs,
                classification,
            },
            notifier,
            registry,
            scheduler: SchedulerConfig {
                interval_secs: self.poll_interval_secs,
                probe_delay_ms: self.probe_delay_ms,
                probe_jitter_ms: self.probe_jitter_ms,
                notify_on_first_observation: self.notify_on_first_observation,
                ..SchedulerConfig::default()
            },
            proxies: ProxyPool::new(self.proxies.clone()),
            default_target: NotificationTarget::new(self.default_target.clone()),
        };

        config.validate().context("Invalid monitor configuration")?;
        Ok(config)
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
    }
}

/// Split a comma-separated list, dropping empty items
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `name=url,name=url` webhook routes
fn parse_routes(value: Option<&str>) -> Result<HashMap<String, String>> {
    let mut routes = HashMap::new();
    for item in split_list(value) {
        let Some((name, url)) = item.split_once('=') else {
            anyhow::bail!(
                "ACCTWATCH_WEBHOOK_ROUTES entries must look like name=url. Got an entry without '='"
            );
        };
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            anyhow::bail!("ACCTWATCH_WEBHOOK_ROUTES entries need both a name and a URL");
        }
        routes.insert(name.to_string(), url.to_string());
    }
    Ok(routes)
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return AcctwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return AcctwatchExitCode::ConfigError.into();
    }

    let monitor_config = match config.monitor_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return AcctwatchExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AcctwatchExitCode::ConfigError.into();
    }

    info!("Starting acctwatchd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AcctwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(monitor_config, config.seed_ids).await {
            Ok(()) => AcctwatchExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                AcctwatchExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: MonitorConfig, seed_ids: Vec<String>) -> Result<()> {
    let plugins = PluginRegistry::with_builtins();

    #[cfg(feature = "http")]
    {
        info!("Registering HTTP probe transport");
        acctwatch_probe_http::register(&plugins);
    }

    #[cfg(feature = "webhook")]
    {
        info!("Registering webhook notifier");
        acctwatch_notify_webhook::register(&plugins);
    }

    info!("Probe transport: {}", config.probe.type_name());
    info!("Notifier: {}", config.notifier.type_name());
    info!("Registry: {}", config.registry.type_name());
    if config.proxies.is_empty() {
        info!("Egress: direct");
    } else {
        info!("Egress: {} proxy route(s)", config.proxies.len());
    }

    let transport: Arc<_> = Arc::from(plugins.create_probe_transport(&config.probe)?);
    let notifier = plugins.create_notifier(&config.notifier)?;
    let registry = plugins.create_registry(&config.registry).await?;

    let commands = Commands::new(Arc::clone(&registry), config.default_target.clone())
        .with_verifier(Arc::clone(&transport), config.proxies.clone());
    seed_watch_list(&commands, &seed_ids).await?;

    let summary = commands.summary().await?;
    info!(
        "Watch list loaded: {} total, {} watching, {} removed, {} unknown",
        summary.total, summary.watching, summary.removed, summary.unknown
    );

    let grace = shutdown_grace(&config);
    let (scheduler, events) = PollScheduler::new(transport, notifier, registry, &config)?;
    let logger = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut run = tokio::spawn(async move { scheduler.run_with_shutdown(shutdown_rx).await });

    info!("Daemon initialized successfully");

    tokio::select! {
        result = &mut run => {
            result??;
            warn!("Scheduler stopped before a shutdown signal");
            let _ = logger.await;
            return Ok(());
        }
        signal = wait_for_shutdown_signal() => {
            info!("Received shutdown signal: {}", signal?);
            let _ = shutdown_tx.send(());
        }
    }

    info!("Shutting down daemon");
    match tokio::time::timeout(grace, run).await {
        Ok(joined) => joined??,
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", grace),
    }

    // The scheduler owned the event sender; the logger ends with it
    let _ = logger.await;
    Ok(())
}

/// How long the scheduler may take to stop after a signal
///
/// The stop flag is checked after the pause that follows the entity in
/// flight, so the grace covers that probe, its notification, one pause at
/// full jitter and the flush.
fn shutdown_grace(config: &MonitorConfig) -> Duration {
    let probe_secs = match &config.probe {
        ProbeConfig::Http { timeout_secs, .. } => *timeout_secs,
        _ => MAX_PROBE_TIMEOUT_SECS,
    };
    let pacing_ms = config
        .scheduler
        .probe_delay_ms
        .saturating_add(config.scheduler.probe_jitter_ms);

    Duration::from_secs(probe_secs)
        + Duration::from_millis(pacing_ms)
        + DELIVERY_ALLOWANCE
        + FLUSH_ALLOWANCE
}

/// Watch the startup ids that are not registered yet
///
/// Ids already in the registry keep their record untouched. New ids are
/// verified first, so a name that does not exist is skipped with a warning.
async fn seed_watch_list(commands: &Commands, seed_ids: &[String]) -> Result<()> {
    for raw in seed_ids {
        match commands.status(raw).await {
            Ok(entity) => {
                debug!("{} is already watched", entity.id);
                continue;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        match commands.watch_verified(raw, None).await {
            Ok(entity) => info!("Seeded {} ({})", entity.id, entity.last_known_state),
            Err(e) if e.is_not_found() => warn!("Not watching {}: {}", raw, e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Log scheduler events until the scheduler goes away
async fn log_events(mut events: mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::Started { interval_secs } => {
                info!("Scheduler started (every {}s)", interval_secs)
            }
            SchedulerEvent::TransitionDetected { id, from, to } => {
                info!("{}: {} -> {}", id, from, to)
            }
            SchedulerEvent::NotificationDropped { id, reason } => {
                warn!("Notification for {} dropped: {}", id, reason)
            }
            SchedulerEvent::SweepFinished {
                probed,
                transitions,
            } => info!(
                "Sweep finished: {} probed, {} transition(s)",
                probed, transitions
            ),
            SchedulerEvent::Stopped { reason } => info!("Scheduler stopped: {}", reason),
            other => debug!("Scheduler event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
