//! Batch downloader
//!
//! Fetches batches of links concurrently on a bounded task set and classifies
//! failures. Blocked (403/430), server-error and proxy-transport failures are
//! requeued and resolved by a sequential retry pass before `fetch` returns, so
//! every call is a barrier for its batch.

use crate::config::{CrawlConfig, VendorConfig};
use crate::crawler::auth;
use crate::crawler::data::{Data, FetchOutput, FetchedLink};
use crate::crawler::link::{Link, Method, ParamEncoding};
use crate::crawler::proxy::{CheckerProxySource, ProxyConnector, ProxyOutcome, ProxySource};
use crate::crawler::session::{prepare_request, random_user_agent, send, HttpSession, RawResponse};
use crate::state::ProxyState;
use crate::FeedError;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Attempts per requeued link in the retry pass
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Backoff before retrying a blocked (403/430) link
pub const BLOCKED_BACKOFF: Duration = Duration::from_secs(3);

/// A link waiting for the retry pass
#[derive(Debug, Clone)]
pub struct ErrorRetryEntry {
    pub link: Link,
    pub backoff: Duration,
}

/// What to do with an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Surface the body as data
    Accept,
    /// Surface the body as data and log a diagnostic
    Report,
    /// Drop the proxy session and requeue with the given backoff
    Requeue { backoff: Duration, drop_proxy: bool },
    /// Nothing is returned for the link
    Discard,
}

/// Classifies a response status
///
/// Statuses below 400 and 404 are plain data. 403/430 mean the vendor blocked
/// us: requeue when proxy mode or error-link processing is on, drop the link
/// otherwise. 5xx are requeued without backoff when error-link processing is
/// on. Everything else is reported and still surfaced.
pub fn classify_status(
    status: u16,
    use_proxy: bool,
    process_error_links: bool,
    blocked_backoff: Duration,
) -> StatusAction {
    match status {
        s if s < 400 => StatusAction::Accept,
        403 | 430 => {
            if use_proxy || process_error_links {
                StatusAction::Requeue {
                    backoff: blocked_backoff,
                    drop_proxy: true,
                }
            } else {
                StatusAction::Discard
            }
        }
        s if s >= 500 && process_error_links => StatusAction::Requeue {
            backoff: Duration::ZERO,
            drop_proxy: false,
        },
        404 => StatusAction::Accept,
        _ => StatusAction::Report,
    }
}

/// Tunables for a downloader
#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    pub timeout: Duration,
    pub delay: Duration,
    pub max_in_flight: usize,
    pub static_user_agent: bool,
    pub use_proxy: bool,
    pub process_error_links: bool,
    pub proxy_connection_limit: u32,
    pub blocked_backoff: Duration,
    pub headers: BTreeMap<String, String>,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            delay: Duration::ZERO,
            max_in_flight: 20,
            static_user_agent: false,
            use_proxy: false,
            process_error_links: true,
            proxy_connection_limit: crate::crawler::proxy::DEFAULT_CONNECTION_LIMIT,
            blocked_backoff: BLOCKED_BACKOFF,
            headers: BTreeMap::new(),
        }
    }
}

impl DownloaderOptions {
    /// Builds options from the crawl section and extra headers of a vendor config
    pub fn from_config(crawl: &CrawlConfig, headers: &BTreeMap<String, String>) -> Self {
        Self {
            timeout: Duration::from_secs(crawl.request_timeout_s),
            delay: Duration::try_from_secs_f64(crawl.delay_s).unwrap_or(Duration::ZERO),
            max_in_flight: crawl.max_in_flight,
            static_user_agent: crawl.static_user_agent,
            use_proxy: crawl.use_proxy,
            process_error_links: crawl.process_error_links,
            proxy_connection_limit: crawl.proxy_connection_limit,
            blocked_backoff: BLOCKED_BACKOFF,
            headers: headers.clone(),
        }
    }
}

/// One vendor run's HTTP front end
pub struct Downloader {
    session: HttpSession,
    options: DownloaderOptions,
    user_agent: String,
    proxy_state: ProxyState,
    connector: ProxyConnector,
}

impl Downloader {
    /// Creates a downloader for a vendor source
    ///
    /// # Arguments
    ///
    /// * `source` - Vendor storefront root (cookie domain)
    /// * `options` - Concurrency, timeout, proxy and header settings
    ///
    /// # Returns
    ///
    /// * `Ok(Downloader)` - Ready downloader; no request has been sent yet
    /// * `Err(FeedError)` - Invalid source URL, header, or client build failure
    pub fn new(source: &str, options: DownloaderOptions) -> Result<Self, FeedError> {
        let mut session = HttpSession::new(source, options.timeout)?;
        session.set_headers(&options.headers)?;

        let connector = ProxyConnector::new(
            Box::new(CheckerProxySource::new()),
            options.proxy_connection_limit,
        );

        Ok(Self {
            session,
            user_agent: random_user_agent().to_string(),
            proxy_state: ProxyState::Disconnected,
            connector,
            options,
        })
    }

    /// Builds the downloader for a vendor and runs its login flow, if any
    ///
    /// A failed login is logged and the downloader is returned anyway.
    pub async fn from_config(
        config: &VendorConfig,
        proxy_source: Option<Box<dyn ProxySource>>,
    ) -> Result<Self, FeedError> {
        let options = DownloaderOptions::from_config(&config.crawl, &config.headers);
        let mut downloader = Self::new(&config.vendor.source, options)?;
        if let Some(source) = proxy_source {
            downloader = downloader.with_proxy_source(source);
        }

        if let Some(auth_config) = &config.auth {
            if !auth_config.credentials.is_empty() {
                auth::authenticate(&mut downloader, auth_config).await;
            }
        }

        Ok(downloader)
    }

    /// Replaces where proxy candidates come from
    pub fn with_proxy_source(mut self, source: Box<dyn ProxySource>) -> Self {
        self.connector = ProxyConnector::new(source, self.options.proxy_connection_limit);
        self
    }

    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut HttpSession {
        &mut self.session
    }

    pub fn proxy_state(&self) -> ProxyState {
        self.proxy_state
    }

    pub fn uses_proxy(&self) -> bool {
        self.options.use_proxy
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetches a batch of links
    ///
    /// Requests run concurrently, at most `max_in_flight` at a time, with the
    /// configured delay between submissions. Requeued links are retried
    /// sequentially afterwards and their results appended.
    ///
    /// # Arguments
    ///
    /// * `links` - The batch
    /// * `associative` - `true` returns a list carrying each link's URL and
    ///   parameters, `false` a map keyed by identity URL
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutput)` - One entry per resolved link
    /// * `Err(FeedError)` - A fetch task failed; the batch should be retried
    pub async fn fetch(
        &mut self,
        links: &[Link],
        associative: bool,
    ) -> Result<FetchOutput, FeedError> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        for (index, link) in links.iter().enumerate() {
            if self.options.use_proxy && !self.proxy_state.is_connected() {
                tracing::info!("Check proxies");
                self.init_proxy(link).await;
            }

            let agent = self.next_user_agent();
            let request = prepare_request(
                &self.session.client(),
                link,
                self.session.headers().clone(),
                &agent,
                self.session.timeout(),
            );
            let permits = Arc::clone(&semaphore);
            let link = link.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = send(request).await;
                (index, link, result)
            });

            tokio::time::sleep(self.options.delay).await;
        }

        let mut completed = Vec::with_capacity(links.len());
        while let Some(joined) = tasks.join_next().await {
            completed.push(joined?);
        }
        completed.sort_by_key(|(index, _, _)| *index);

        let mut resolved = Vec::with_capacity(completed.len());
        let mut retries = Vec::new();
        for (_, link, result) in completed {
            match self.classify(&link, result) {
                Resolution::Data(data) => resolved.push((link, data)),
                Resolution::Retry(entry) => retries.push(entry),
                Resolution::Discard => {}
            }
        }

        if !retries.is_empty() {
            tracing::debug!("Retrying {} links", retries.len());
            resolved.extend(self.process_error_links(retries).await);
        }

        Ok(collect_output(resolved, associative))
    }

    /// Fetches a batch keyed by identity URL
    pub async fn fetch_map(&mut self, links: &[Link]) -> Result<IndexMap<String, Data>, FeedError> {
        match self.fetch(links, false).await? {
            FetchOutput::ByUrl(map) => Ok(map),
            FetchOutput::List(list) => Ok(list.into_iter().map(|f| (f.url, f.data)).collect()),
        }
    }

    /// Fetches a single link
    pub async fn fetch_link(&mut self, link: Link) -> Result<Data, FeedError> {
        Ok(self.fetch(&[link], false).await?.into_first())
    }

    /// GETs a URL with query parameters
    pub async fn get(
        &mut self,
        url: &str,
        params: IndexMap<String, String>,
    ) -> Result<Data, FeedError> {
        self.fetch_link(Link::with_params(url, Method::Get, params))
            .await
    }

    /// POSTs parameters to a URL as a form or JSON body
    pub async fn post(
        &mut self,
        url: &str,
        params: IndexMap<String, String>,
        encoding: ParamEncoding,
    ) -> Result<Data, FeedError> {
        self.fetch_link(Link::post(url, params).encoded_as(encoding))
            .await
    }

    fn next_user_agent(&mut self) -> String {
        if !self.options.static_user_agent {
            self.user_agent = random_user_agent().to_string();
        }
        self.user_agent.clone()
    }

    fn set_proxy_state(&mut self, next: ProxyState) {
        if self.proxy_state == next {
            return;
        }
        if !self.proxy_state.can_transition_to(next) {
            tracing::warn!("Unexpected proxy transition {} -> {}", self.proxy_state, next);
        }
        tracing::debug!("Proxy {} -> {}", self.proxy_state, next);
        self.proxy_state = next;
    }

    async fn init_proxy(&mut self, link: &Link) {
        self.set_proxy_state(ProxyState::Probing);
        let rotate = !self.options.static_user_agent;
        let outcome = self
            .connector
            .connect(&mut self.session, link, &mut self.user_agent, rotate)
            .await;

        match outcome {
            ProxyOutcome::Connected(_) => self.set_proxy_state(ProxyState::Connected),
            ProxyOutcome::Exhausted => {
                self.options.use_proxy = false;
                self.set_proxy_state(ProxyState::Disconnected);
            }
        }
    }

    fn classify(
        &mut self,
        link: &Link,
        result: Result<RawResponse, reqwest::Error>,
    ) -> Resolution {
        let response = match result {
            Ok(response) => response,
            Err(e) if self.options.use_proxy => {
                tracing::debug!("No response for {} through proxy: {}", link.url(), e);
                self.set_proxy_state(ProxyState::Disconnected);
                return Resolution::Retry(ErrorRetryEntry {
                    link: link.clone(),
                    backoff: Duration::ZERO,
                });
            }
            Err(e) => {
                tracing::warn!("Request failed for {}: {}", link.url(), e);
                return Resolution::Data(Data::default());
            }
        };

        let action = classify_status(
            response.status,
            self.options.use_proxy,
            self.options.process_error_links,
            self.options.blocked_backoff,
        );

        match action {
            StatusAction::Accept => {
                Resolution::Data(Data::with_status(response.body, response.status))
            }
            StatusAction::Report => {
                log_error_response(link, &response);
                Resolution::Data(Data::with_status(response.body, response.status))
            }
            StatusAction::Requeue { backoff, drop_proxy } => {
                if drop_proxy {
                    self.set_proxy_state(ProxyState::Disconnected);
                }
                Resolution::Retry(ErrorRetryEntry {
                    link: link.clone(),
                    backoff,
                })
            }
            StatusAction::Discard => {
                tracing::warn!(
                    "Blocked with status {} on {}, link dropped",
                    response.status,
                    link.url()
                );
                Resolution::Discard
            }
        }
    }

    /// Sequential retry pass over requeued links
    async fn process_error_links(&mut self, entries: Vec<ErrorRetryEntry>) -> Vec<(Link, Data)> {
        let mut resolved = Vec::with_capacity(entries.len());

        for entry in entries {
            let agent = self.next_user_agent();
            let mut data = None;
            let mut error_data = None;
            let mut last_error = None;

            for attempt in 1..=MAX_RETRY_ATTEMPTS {
                if self.options.use_proxy && !self.proxy_state.is_connected() {
                    tracing::info!("Check proxies");
                    self.init_proxy(&entry.link).await;
                } else {
                    tokio::time::sleep(entry.backoff).await;
                }

                match self.session.request(&entry.link, &agent).await {
                    Ok(response) if response.status < 400 => {
                        data = Some(Data::with_status(response.body, response.status));
                        break;
                    }
                    Ok(response) => {
                        last_error = Some(format!(
                            "status {} {}",
                            response.status, response.reason
                        ));
                        error_data = Some(Data::with_status(response.body, response.status));
                    }
                    Err(e) => last_error = Some(e.to_string()),
                }

                tracing::debug!(
                    "Retry {}/{} failed for {}",
                    attempt,
                    MAX_RETRY_ATTEMPTS,
                    entry.link.url()
                );
                self.set_proxy_state(ProxyState::Disconnected);
            }

            if data.is_none() {
                if let Some(error) = &last_error {
                    tracing::warn!(
                        "Giving up on {} after {} attempts: {}",
                        entry.link.url(),
                        MAX_RETRY_ATTEMPTS,
                        error
                    );
                }
            }

            let data = data.or(error_data).unwrap_or_default();
            resolved.push((entry.link, data));
        }

        resolved
    }
}

enum Resolution {
    Data(Data),
    Retry(ErrorRetryEntry),
    Discard,
}

fn log_error_response(link: &Link, response: &RawResponse) {
    tracing::warn!(
        "Parser error: {} (status {}) for {}",
        response.reason,
        response.status,
        link.url()
    );
}

fn collect_output(resolved: Vec<(Link, Data)>, associative: bool) -> FetchOutput {
    if associative {
        FetchOutput::List(
            resolved
                .into_iter()
                .map(|(link, data)| FetchedLink {
                    url: link.url(),
                    params: link.params().clone(),
                    data,
                })
                .collect(),
        )
    } else {
        FetchOutput::ByUrl(
            resolved
                .into_iter()
                .map(|(link, data)| (link.url(), data))
                .collect(),
        )
    }
}
