//! HTTP session state
//!
//! The session owns the reqwest client together with everything that is
//! shared by every request of a vendor run: the cookie jar, custom headers,
//! the request timeout and the pinned proxy. Changing the proxy or clearing
//! cookies rebuilds the client; the jar survives proxy rebuilds.

use crate::crawler::link::{Link, Method, ParamEncoding};
use crate::url::{cookie_domain, parse_source};
use crate::FeedError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Proxy, RequestBuilder};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// User agents rotated between requests
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.2; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Picks a user agent from the rotation pool
pub fn random_user_agent() -> &'static str {
    USER_AGENTS[fastrand::usize(..USER_AGENTS.len())]
}

/// Outcome of a single request
///
/// Non-2xx statuses are not errors here; classification happens in the
/// downloader.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

/// Shared HTTP state for one vendor run
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    source: Url,
    cookie_domain: String,
    headers: HeaderMap,
    timeout: Duration,
    proxy: Option<String>,
}

impl HttpSession {
    /// Creates a session for a vendor source
    ///
    /// # Arguments
    ///
    /// * `source` - The vendor storefront root, used as the cookie domain
    /// * `timeout` - Per-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(HttpSession)` - Session with an empty cookie jar and no proxy
    /// * `Err(FeedError)` - The source URL or the client could not be built
    pub fn new(source: &str, timeout: Duration) -> Result<Self, FeedError> {
        let source_url = parse_source(source)?;
        let cookie_domain = cookie_domain(source)?;
        let jar = Arc::new(Jar::default());
        let client = build_client(&jar, None)?;

        Ok(Self {
            client,
            jar,
            source: source_url,
            cookie_domain,
            headers: HeaderMap::new(),
            timeout,
            proxy: None,
        })
    }

    /// Returns a cheap handle for issuing a request from a spawned task
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Pins (or clears) the outbound proxy, rebuilding the client
    ///
    /// `addr` is an `ip:port` pair; the proxy is spoken to over plain HTTP.
    pub fn set_proxy(&mut self, addr: Option<&str>) -> Result<(), FeedError> {
        self.client = build_client(&self.jar, addr)?;
        self.proxy = addr.map(str::to_string);
        Ok(())
    }

    /// Sets one request header, replacing any previous value
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), FeedError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| FeedError::InvalidHeader {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| FeedError::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Merges a set of headers into the session
    pub fn set_headers<'a, I>(&mut self, headers: I) -> Result<(), FeedError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in headers {
            self.set_header(name, value)?;
        }
        Ok(())
    }

    /// Returns a header value if it is set and printable
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    /// Installs a cookie for the vendor domain and its `www.` variant
    ///
    /// An IP address source has no `www.` variant.
    pub fn set_cookie(&self, name: &str, value: &str) -> Result<(), FeedError> {
        let cookie = format!("{}={}; Path=/", name, value);
        let mut hosts = vec![self.cookie_domain.clone()];
        if self.cookie_domain.parse::<IpAddr>().is_err() {
            hosts.push(format!("www.{}", self.cookie_domain));
        }
        for host in hosts {
            let mut url = self.source.clone();
            url.set_host(Some(&host))?;
            self.jar.add_cookie_str(&cookie, &url);
        }
        Ok(())
    }

    /// Returns the value of a cookie the jar would send to the source URL
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Returns every cookie the jar would send to the source URL
    pub fn cookies(&self) -> Vec<(String, String)> {
        let Some(header) = self.jar.cookies(&self.source) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };
        header
            .split(';')
            .filter_map(|pair| {
                let (key, value) = pair.trim().split_once('=')?;
                Some((key.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Drops every cookie by starting a fresh jar
    pub fn clear_cookies(&mut self) -> Result<(), FeedError> {
        self.jar = Arc::new(Jar::default());
        self.client = build_client(&self.jar, self.proxy.as_deref())?;
        Ok(())
    }

    /// Builds the request for a link with the session's headers
    pub fn build_request(&self, link: &Link, user_agent: &str) -> RequestBuilder {
        prepare_request(
            &self.client,
            link,
            self.headers.clone(),
            user_agent,
            self.timeout,
        )
    }

    /// Sends one request and reads the whole body
    ///
    /// # Returns
    ///
    /// * `Ok(RawResponse)` - Any HTTP response, whatever its status
    /// * `Err(reqwest::Error)` - No response at all (connect failure, timeout, ...)
    pub async fn request(
        &self,
        link: &Link,
        user_agent: &str,
    ) -> Result<RawResponse, reqwest::Error> {
        send(self.build_request(link, user_agent)).await
    }
}

/// Builds a request builder without borrowing the session
///
/// Used by the batch fetcher, whose tasks outlive any borrow of the session.
pub fn prepare_request(
    client: &Client,
    link: &Link,
    mut headers: HeaderMap,
    user_agent: &str,
    timeout: Duration,
) -> RequestBuilder {
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }

    let url = link.url();
    let builder = match link.method() {
        Method::Get => client.get(&url),
        Method::Post => client.post(&url),
    }
    .headers(headers)
    .timeout(timeout);

    if link.method() == Method::Post && !link.params().is_empty() {
        match link.encoding() {
            ParamEncoding::Json => builder.json(link.params()),
            ParamEncoding::Form | ParamEncoding::Default => builder.form(link.params()),
        }
    } else {
        builder
    }
}

/// Sends a prepared request and collects status, reason and body
pub async fn send(request: RequestBuilder) -> Result<RawResponse, reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    Ok(RawResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        body: body.to_vec(),
    })
}

/// Builds the underlying client, optionally routed through a proxy
fn build_client(jar: &Arc<Jar>, proxy: Option<&str>) -> Result<Client, FeedError> {
    let mut builder = Client::builder()
        .cookie_provider(Arc::clone(jar))
        .connect_timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(true)
        .gzip(true)
        .brotli(true);

    if let Some(addr) = proxy {
        builder = builder.proxy(Proxy::all(format!("http://{}", addr))?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> HttpSession {
        HttpSession::new("https://www.example.com/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_new_session() {
        let session = session();
        assert!(session.proxy().is_none());
        assert_eq!(session.timeout(), Duration::from_secs(5));
        assert!(session.cookies().is_empty());
    }

    #[test]
    fn test_headers_roundtrip() {
        let mut session = session();
        session.set_header("X-Requested-With", "XMLHttpRequest").unwrap();
        assert_eq!(
            session.header("x-requested-with").as_deref(),
            Some("XMLHttpRequest")
        );

        session.remove_header("X-Requested-With");
        assert!(session.header("X-Requested-With").is_none());
    }

    #[test]
    fn test_invalid_header_name() {
        let mut session = session();
        let result = session.set_header("bad header", "x");
        assert!(matches!(result, Err(FeedError::InvalidHeader { .. })));
    }

    #[test]
    fn test_cookie_set_and_get() {
        let session = session();
        session.set_cookie("sucuri_cloudproxy_uuid_abc", "123").unwrap();
        assert_eq!(
            session.cookie("sucuri_cloudproxy_uuid_abc").as_deref(),
            Some("123")
        );
        assert!(session.cookie("missing").is_none());
    }

    #[test]
    fn test_cookie_on_ip_source() {
        let session = HttpSession::new("http://127.0.0.1:8080/", Duration::from_secs(5)).unwrap();
        session.set_cookie("token", "abc").unwrap();
        assert_eq!(session.cookie("token").as_deref(), Some("abc"));
    }

    #[test]
    fn test_non_http_source_is_rejected() {
        let result = HttpSession::new("ftp://example.com/", Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(FeedError::Link(crate::LinkError::InvalidScheme(_)))
        ));
    }

    #[test]
    fn test_clear_cookies() {
        let mut session = session();
        session.set_cookie("a", "1").unwrap();
        session.clear_cookies().unwrap();
        assert!(session.cookies().is_empty());
    }

    #[test]
    fn test_set_and_clear_proxy() {
        let mut session = session();
        session.set_proxy(Some("127.0.0.1:3128")).unwrap();
        assert_eq!(session.proxy(), Some("127.0.0.1:3128"));
        session.set_proxy(None).unwrap();
        assert!(session.proxy().is_none());
    }

    #[test]
    fn test_random_user_agent_from_pool() {
        let agent = random_user_agent();
        assert!(USER_AGENTS.contains(&agent));
    }
}
