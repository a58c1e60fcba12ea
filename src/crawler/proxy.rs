//! Proxy acquisition
//!
//! A `ProxySource` supplies candidate `ip:port` addresses, a `ProxyCache`
//! keeps the last list for a bounded time, and the `ProxyConnector` probes
//! candidates against a reference link until one answers or the attempt
//! ceiling is reached.

use crate::crawler::link::Link;
use crate::crawler::session::{random_user_agent, HttpSession};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

/// How long a fetched proxy list stays usable
pub const DEFAULT_PROXY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Timeout applied to a single probe request
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of probes before falling back to a direct connection
pub const DEFAULT_CONNECTION_LIMIT: u32 = 50;

const CHECKER_PROXY_ARCHIVE: &str = "https://checkerproxy.net/api/archive";

/// Supplies proxy candidates
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Returns candidate addresses as `ip:port`; an empty list means none are
    /// currently available
    async fn candidates(&self) -> Vec<String>;
}

/// Returns true for a well-formed `ipv4:port` pair with a non-zero port
pub fn is_valid_proxy_addr(addr: &str) -> bool {
    addr.trim()
        .parse::<SocketAddrV4>()
        .map(|socket| socket.port() != 0)
        .unwrap_or(false)
}

/// Time-bounded cache of the last fetched proxy list
#[derive(Debug)]
pub struct ProxyCache {
    ttl: Duration,
    entry: Option<(Instant, Vec<String>)>,
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new(DEFAULT_PROXY_TTL)
    }
}

impl ProxyCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Returns the cached list while it is fresh and non-empty
    pub fn get(&self) -> Option<&[String]> {
        match &self.entry {
            Some((stored, proxies)) if stored.elapsed() < self.ttl && !proxies.is_empty() => {
                Some(proxies)
            }
            _ => None,
        }
    }

    /// Replaces the cached list, keeping only valid addresses
    pub fn store(&mut self, proxies: Vec<String>) {
        let valid = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| is_valid_proxy_addr(p))
            .collect();
        self.entry = Some((Instant::now(), valid));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveEntry {
    addr: String,
    #[serde(rename = "type")]
    kind: serde_json::Value,
}

impl ArchiveEntry {
    fn kind(&self) -> Option<i64> {
        match &self.kind {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Daily public proxy archive from checkerproxy.net
///
/// Only entries of type 2 (HTTPS-capable) are kept.
pub struct CheckerProxySource {
    client: reqwest::Client,
    base_url: String,
}

impl CheckerProxySource {
    pub fn new() -> Self {
        Self::with_base_url(CHECKER_PROXY_ARCHIVE)
    }

    /// Points the source at another archive endpoint
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn archive_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url,
            chrono::Local::now().format("%Y-%m-%d")
        )
    }
}

impl Default for CheckerProxySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySource for CheckerProxySource {
    async fn candidates(&self) -> Vec<String> {
        let url = self.archive_url();
        tracing::info!("Fetching proxy list {}", url);

        let entries: Vec<ArchiveEntry> = match self.client.get(&url).send().await {
            Ok(response) => match response.json().await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Proxy list from {} is not valid JSON: {}", url, e);
                    return Vec::new();
                }
            },
            Err(e) => {
                tracing::warn!("Failed to fetch proxy list {}: {}", url, e);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter(|entry| entry.kind() == Some(2) && is_valid_proxy_addr(&entry.addr))
            .map(|entry| entry.addr)
            .collect()
    }
}

/// Fixed candidate list, mostly useful for tests and pinned proxy pools
#[derive(Debug, Clone, Default)]
pub struct StaticProxySource {
    proxies: Vec<String>,
}

impl StaticProxySource {
    pub fn new(proxies: Vec<String>) -> Self {
        Self { proxies }
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn candidates(&self) -> Vec<String> {
        self.proxies.clone()
    }
}

/// Result of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// A proxy answered the reference link and is pinned on the session
    Connected(String),
    /// The attempt ceiling was hit; the session is back to a direct connection
    Exhausted,
}

/// Probes proxy candidates until one works
pub struct ProxyConnector {
    source: Box<dyn ProxySource>,
    cache: ProxyCache,
    limit: u32,
}

impl ProxyConnector {
    pub fn new(source: Box<dyn ProxySource>, limit: u32) -> Self {
        Self {
            source,
            cache: ProxyCache::default(),
            limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Finds a working proxy for `link`
    ///
    /// Each probe pins a random candidate on the session and sends the link
    /// with a short timeout. A non-error response, or a 404, counts as
    /// connected. The session's configured
    /// timeout is restored after every probe.
    ///
    /// # Arguments
    ///
    /// * `session` - The session the proxy is pinned on
    /// * `link` - Reference link used for probing
    /// * `user_agent` - Current agent, re-picked per probe when `rotate` is set
    /// * `rotate` - Whether the downloader rotates user agents
    ///
    /// # Returns
    ///
    /// `Connected(addr)` on success, `Exhausted` once `limit` probes failed. In
    /// the latter case the session no longer uses any proxy.
    pub async fn connect(
        &mut self,
        session: &mut HttpSession,
        link: &Link,
        user_agent: &mut String,
        rotate: bool,
    ) -> ProxyOutcome {
        let mut attempts = 0;

        loop {
            if rotate {
                *user_agent = random_user_agent().to_string();
            }

            if attempts >= self.limit {
                tracing::warn!(
                    "No working proxy after {} attempts, using direct connection",
                    attempts
                );
                if let Err(e) = session.set_proxy(None) {
                    tracing::error!("Failed to reset proxy: {}", e);
                }
                return ProxyOutcome::Exhausted;
            }

            if let Some(addr) = self.probe(session, link, user_agent).await {
                tracing::info!("Use proxy: {}", addr);
                return ProxyOutcome::Connected(addr);
            }
            attempts += 1;
        }
    }

    async fn probe(
        &mut self,
        session: &mut HttpSession,
        link: &Link,
        user_agent: &str,
    ) -> Option<String> {
        let candidate = self.pick_candidate().await?;
        if let Err(e) = session.set_proxy(Some(&candidate)) {
            tracing::debug!("Skipping proxy {}: {}", candidate, e);
            return None;
        }

        let configured = session.timeout();
        session.set_timeout(PROBE_TIMEOUT);
        let result = session.request(link, user_agent).await;
        session.set_timeout(configured);

        match result {
            Ok(response) if response.status < 400 || response.status == 404 => Some(candidate),
            Ok(response) => {
                tracing::debug!("Proxy response code: {}", response.status);
                None
            }
            Err(e) => {
                tracing::debug!("Proxy {} failed: {}", candidate, e);
                None
            }
        }
    }

    async fn pick_candidate(&mut self) -> Option<String> {
        if self.cache.get().is_none() {
            let fetched = self.source.candidates().await;
            self.cache.store(fetched);
        }

        let proxies = self.cache.get()?;
        Some(proxies[fastrand::usize(..proxies.len())].clone())
    }
}
