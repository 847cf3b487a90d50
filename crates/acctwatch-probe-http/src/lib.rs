// # HTTP Probe Transport
//
// This crate provides the HTTP-based ProbeTransport for the account monitor.
//
// ## Behavior
//
// One GET per probe against `url_template` with `{id}` substituted
// (percent-encoded, dot segments refused), sent with a fixed `User-Agent`
// and a bounded timeout. The response is handed
// to the core `ClassificationPolicy`; every transport-level failure
// (DNS, connect, TLS, timeout, proxy) is `TransientError`.
//
// ## Egress Routes
//
// Each probe picks one route from the `ProxyPool` at random. An empty pool
// means direct egress, which also ignores `HTTP_PROXY`-style environment
// variables. A client is built once per route and reused.
//
// ## Constraints
//
// - No retries inside one probe (a failing proxy is just a transient result)
// - No background tasks
// - Proxy credentials never appear in logs

use acctwatch_core::PluginRegistry;
use acctwatch_core::classification::ClassificationPolicy;
use acctwatch_core::config::{ID_PLACEHOLDER, ProbeConfig};
use acctwatch_core::traits::{ProbeOutcome, ProbeTransport, ProbeTransportFactory, ProxyPool};
use acctwatch_core::{Error, Result};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// HTTP probe transport
pub struct HttpProbeTransport {
    /// URL with an `{id}` placeholder
    url_template: String,

    /// Fixed outbound identity header
    user_agent: String,

    /// Per-probe timeout
    timeout: Duration,

    /// How responses map to outcomes
    policy: ClassificationPolicy,

    /// Client for direct egress
    direct: reqwest::Client,

    /// Clients per proxy route, built on first use
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl std::fmt::Debug for HttpProbeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbeTransport")
            .field("url_template", &self.url_template)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl HttpProbeTransport {
    /// Create a new HTTP probe transport
    ///
    /// # Parameters
    ///
    /// - `url_template`: Profile URL containing `{id}`
    /// - `user_agent`: Value of the `User-Agent` header
    /// - `timeout`: Bound on the whole request, body included
    /// - `policy`: Response classification rule
    pub fn new(
        url_template: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
        policy: ClassificationPolicy,
    ) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains(ID_PLACEHOLDER) {
            return Err(Error::config(format!(
                "Probe URL template must contain {}",
                ID_PLACEHOLDER
            )));
        }

        let user_agent = user_agent.into();
        let direct = build_client(&user_agent, timeout, None)?;

        Ok(Self {
            url_template,
            user_agent,
            timeout,
            policy,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// URL probed for `id`
    ///
    /// The id is percent-encoded into a single path segment. Ids that would
    /// resolve to a different path (`""`, `.`, `..`) are rejected.
    pub fn probe_url(&self, id: &str) -> Result<String> {
        if matches!(id, "" | "." | "..") {
            return Err(Error::invalid_input(format!(
                "Identifier {:?} cannot be used as a path segment",
                id
            )));
        }
        Ok(self.url_template.replace(ID_PLACEHOLDER, &encode_segment(id)))
    }

    /// Client for a route, building and caching proxy clients on first use
    fn client_for(&self, route: Option<&str>) -> Result<reqwest::Client> {
        let Some(route) = route else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(route) {
            return Ok(client.clone());
        }

        let client = build_client(&self.user_agent, self.timeout, Some(route))?;
        proxied.insert(route.to_string(), client.clone());
        Ok(client)
    }
}

/// Build a client with the identity header and timeout applied
fn build_client(user_agent: &str, timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout);

    let builder = match proxy {
        Some(route) => {
            let proxy = reqwest::Proxy::all(route).map_err(|e| {
                Error::config(format!("Invalid proxy route {}: {}", redact_route(route), e))
            })?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| Error::probe(format!("Failed to build HTTP client: {}", e)))
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Strip credentials from a proxy URL for logging
pub fn redact_route(route: &str) -> String {
    match (route.split_once("://"), route.rfind('@')) {
        (Some((scheme, _)), Some(at)) => format!("{}://<REDACTED>@{}", scheme, &route[at + 1..]),
        _ => route.to_string(),
    }
}

/// Short description of a reqwest failure
fn failure_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "request"
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn probe(&self, id: &str, proxies: &ProxyPool) -> ProbeOutcome {
        let url = match self.probe_url(id) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Probe of {:?} not sent: {}", id, e);
                return ProbeOutcome::TransientError;
            }
        };

        let route = proxies.pick();
        let via = route.map(redact_route).unwrap_or_else(|| "direct".to_string());

        let client = match self.client_for(route) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Probe of {} via {} not sent: {}", id, via, e);
                return ProbeOutcome::TransientError;
            }
        };

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Probe of {} via {} failed ({}): {}", id, via, failure_kind(&e), e);
                return ProbeOutcome::TransientError;
            }
        };

        let status = response.status().as_u16();
        let body = if self.policy.needs_body(status) {
            match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Probe of {} via {} lost body ({}): {}", id, via, failure_kind(&e), e);
                    return ProbeOutcome::TransientError;
                }
            }
        } else {
            String::new()
        };

        let outcome = self.policy.classify(status, &body);
        if outcome.is_transient() {
            tracing::warn!("Probe of {} via {} got unexpected status {}", id, via, status);
        } else {
            tracing::debug!("Probe of {} via {}: {} -> {:?}", id, via, status, outcome);
        }
        outcome
    }

    fn transport_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP probe transports
pub struct HttpProbeFactory;

impl ProbeTransportFactory for HttpProbeFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn ProbeTransport>> {
        match config {
            ProbeConfig::Http {
                url_template,
                user_agent,
                timeout_secs,
                classification,
            } => Ok(Box::new(HttpProbeTransport::new(
                url_template.clone(),
                user_agent.clone(),
                Duration::from_secs(*timeout_secs),
                classification.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP probe transport")),
        }
    }
}

/// Register the HTTP probe transport with a plugin registry
///
/// # Example
///
/// ```rust
/// use acctwatch_core::PluginRegistry;
///
/// let plugins = PluginRegistry::with_builtins();
/// acctwatch_probe_http::register(&plugins);
/// assert!(plugins.has_probe_transport("http"));
/// ```
pub fn register(plugins: &PluginRegistry) {
    plugins.register_probe_transport("http", Box::new(HttpProbeFactory));
}
