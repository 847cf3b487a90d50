// # Webhook Notifier
//
// This crate delivers transition events to chat webhooks (Discord-style
// `{content, embeds}` payloads).
//
// ## Target Resolution
//
// A `NotificationTarget` resolves, in order, to:
// 1. Itself, when it already is an `http(s)://` URL
// 2. The URL of the route with the same name
// 3. The configured default URL
//
// Anything else is `Error::NotFound` and the dispatcher drops the event.
//
// ## Constraints
//
// - One POST per event, no retries
// - Webhook URLs embed their token and NEVER appear in logs or errors

use acctwatch_core::PluginRegistry;
use acctwatch_core::config::NotifierConfig;
use acctwatch_core::traits::{
    Endpoint, EntityState, NotificationTarget, Notifier, NotifierFactory, TransitionEvent,
};
use acctwatch_core::{Error, Result};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default HTTP timeout for webhook deliveries
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook message payload
#[derive(Debug, Serialize)]
pub struct WebhookMessage {
    /// Plain text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Rich embeds
    pub embeds: Vec<WebhookEmbed>,
}

/// Embed for rich messages
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEmbed {
    pub title: String,
    pub description: String,
    /// Color (as decimal integer)
    pub color: u32,
    pub fields: Vec<WebhookEmbedField>,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
}

/// Embed field
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Embed color constants (decimal)
pub mod colors {
    /// Removed - red
    pub const REMOVED: u32 = 15158332; // #E74C3C
    /// Active or restored - green
    pub const ACTIVE: u32 = 3066993; // #2ECC71
    /// Unknown - grey
    pub const UNKNOWN: u32 = 9807270; // #95A5A6
}

impl WebhookMessage {
    /// Render a transition event
    pub fn from_event(event: &TransitionEvent) -> Self {
        let color = match event.to {
            EntityState::Removed => colors::REMOVED,
            EntityState::Active => colors::ACTIVE,
            EntityState::Unknown => colors::UNKNOWN,
        };

        let field = |name: &str, value: String| WebhookEmbedField {
            name: name.to_string(),
            value,
            inline: true,
        };

        let embed = WebhookEmbed {
            title: event.headline().to_string(),
            description: format!("**{}** is now {}", event.id, event.to),
            color,
            fields: vec![
                field("Account", event.id.clone()),
                field("Previous", event.from.to_string()),
                field("Current", event.to.to_string()),
            ],
            timestamp: event.timestamp.to_rfc3339(),
        };

        Self {
            content: Some(event.summary()),
            embeds: vec![embed],
        }
    }
}

/// Chat webhook notifier
pub struct WebhookNotifier {
    /// Target name -> webhook URL
    /// ⚠️ NEVER log these values
    routes: HashMap<String, String>,

    /// URL for targets without a route
    default_url: Option<String>,

    /// HTTP client for deliveries
    client: reqwest::Client,
}

// Custom Debug implementation that hides webhook URLs
impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.routes.keys().collect();
        names.sort();
        f.debug_struct("WebhookNotifier")
            .field("routes", &names)
            .field(
                "default_url",
                &self.default_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    ///
    /// # Parameters
    ///
    /// - `routes`: Target name -> webhook URL
    /// - `default_url`: URL for targets that have no route
    pub fn new(routes: HashMap<String, String>, default_url: Option<String>) -> Result<Self> {
        if routes.is_empty() && default_url.is_none() {
            return Err(Error::config(
                "Webhook notifier requires a default URL or at least one route",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::notification(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            routes,
            default_url,
            client,
        })
    }

    /// Names of the configured routes
    pub fn route_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn resolve(&self, target: &NotificationTarget) -> Result<Endpoint> {
        let target = target.as_str().trim();

        if is_url(target) {
            return Ok(Endpoint::new(target));
        }
        if let Some(url) = self.routes.get(target) {
            return Ok(Endpoint::new(url.clone()));
        }
        if let Some(url) = &self.default_url {
            return Ok(Endpoint::new(url.clone()));
        }

        Err(Error::not_found(format!(
            "No webhook route for target '{}'",
            target
        )))
    }

    async fn deliver(&self, endpoint: &Endpoint, event: &TransitionEvent) -> Result<()> {
        let payload = WebhookMessage::from_event(event);

        let response = self
            .client
            .post(endpoint.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                Error::notification(format!("Webhook request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Webhook accepted event for {} ({})", event.id, status);
            return Ok(());
        }

        Err(match status.as_u16() {
            429 => Error::notification("Webhook rate limited (429)"),
            404 => Error::not_found("Webhook no longer exists (404)"),
            code => Error::notification(format!("Webhook returned {}", code)),
        })
    }

    fn notifier_name(&self) -> &'static str {
        "webhook"
    }
}

/// Factory for creating webhook notifiers
pub struct WebhookNotifierFactory;

impl NotifierFactory for WebhookNotifierFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Webhook {
                routes,
                default_url,
            } => {
                config.validate()?;
                Ok(Box::new(WebhookNotifier::new(
                    routes.clone(),
                    default_url.clone(),
                )?))
            }
            _ => Err(Error::config("Invalid config for webhook notifier")),
        }
    }
}

/// Register the webhook notifier with a plugin registry
///
/// # Example
///
/// ```rust
/// use acctwatch_core::PluginRegistry;
///
/// let plugins = PluginRegistry::with_builtins();
/// acctwatch_notify_webhook::register(&plugins);
/// assert!(plugins.has_notifier("webhook"));
/// ```
pub fn register(plugins: &PluginRegistry) {
    plugins.register_notifier("webhook", Box::new(WebhookNotifierFactory));
}
