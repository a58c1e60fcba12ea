//! Downloader behavior against a mock storefront

use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vendor_feed::config::parse_config;
use vendor_feed::crawler::auth::authenticate;
use vendor_feed::crawler::{Downloader, DownloaderOptions, FetchOutput, Link, StaticProxySource};
use vendor_feed::ProxyState;
use wiremock::matchers::{body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn options(process_error_links: bool) -> DownloaderOptions {
    DownloaderOptions {
        timeout: Duration::from_secs(5),
        process_error_links,
        blocked_backoff: Duration::from_millis(10),
        ..DownloaderOptions::default()
    }
}

async fn downloader(server: &MockServer, process_error_links: bool) -> Downloader {
    Downloader::new(&server.uri(), options(process_error_links)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_200_and_404_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/found"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>found</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<p>missing</p>"))
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, true).await;
    let found = format!("{}/found", server.uri());
    let missing = format!("{}/missing", server.uri());
    let pages = downloader
        .fetch_map(&[Link::new(&found), Link::new(&missing)])
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[&found].text(), "<p>found</p>");
    assert_eq!(pages[&missing].text(), "<p>missing</p>");
    assert_eq!(pages[&missing].status(), 404);
}

#[tokio::test]
async fn test_blocked_link_is_requeued_until_it_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, true).await;
    let data = downloader
        .fetch_link(Link::new(format!("{}/product", server.uri())))
        .await
        .unwrap();

    assert_eq!(data.text(), "ok");
}

#[tokio::test]
async fn test_blocked_link_dropped_without_error_processing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, false).await;
    let output = downloader
        .fetch(&[Link::new(format!("{}/product", server.uri()))], true)
        .await
        .unwrap();

    assert!(output.is_empty());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, true).await;
    let output = downloader
        .fetch(&[Link::new(format!("{}/flaky", server.uri()))], true)
        .await
        .unwrap();

    let FetchOutput::List(list) = output else {
        panic!("associative fetch should return a list");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].data.text(), "recovered");
}

#[tokio::test]
async fn test_retry_gives_up_with_last_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .expect(6)
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, true).await;
    let data = downloader
        .fetch_link(Link::new(format!("{}/down", server.uri())))
        .await
        .unwrap();

    assert_eq!(data.text(), "maintenance");
    assert_eq!(data.status(), 500);
}

#[tokio::test]
async fn test_unreachable_host_yields_empty_data() {
    let mut downloader = Downloader::new("http://127.0.0.1:1/", options(true)).unwrap();
    let data = downloader
        .fetch_link(Link::new("http://127.0.0.1:1/product"))
        .await
        .unwrap();

    assert!(data.is_empty());
}

#[tokio::test]
async fn test_post_sends_form_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_string_contains("q=ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(1)
        .mount(&server)
        .await;

    let mut downloader = downloader(&server, true).await;
    let mut params = IndexMap::new();
    params.insert("q".to_string(), "ghost".to_string());
    let data = downloader
        .post(
            &format!("{}/search", server.uri()),
            params,
            vendor_feed::crawler::ParamEncoding::Form,
        )
        .await
        .unwrap();

    assert_eq!(data.text(), "results");
}

fn auth_config(server: &MockServer, marker: &str) -> vendor_feed::VendorConfig {
    parse_config(&format!(
        r#"
[vendor]
supplier-id = 42
name = "Hot Stuff"
prefix = "HSD-"
source = "{uri}/"

[crawl]
seeds = ["{uri}/store"]

[auth]
login-url = "{uri}/login"
success-marker = "{marker}"

[auth.credentials]
"login[username]" = "user"
"login[password]" = "secret"
"#,
        uri = server.uri(),
        marker = marker
    ))
    .unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><form action="/login" method="post">
                <input type="hidden" name="form_key" value="abc123">
                <input name="login[username]" value="">
                <input name="login[password]" type="password">
            </form></body></html>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("form_key=abc123"))
        .and(body_string_contains("secret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><a>Log Out</a></body></html>"),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_submits_hidden_form_fields() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let config = auth_config(&server, "log out");
    let Some(auth) = config.auth.clone() else {
        panic!("auth section should parse");
    };
    let mut downloader = Downloader::new(&config.vendor.source, options(true)).unwrap();

    assert!(authenticate(&mut downloader, &auth).await);
}

#[tokio::test]
async fn test_login_failure_is_not_fatal() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let config = auth_config(&server, "My Account");
    let downloader = Downloader::from_config(&config, None).await;

    assert!(downloader.is_ok());
}

fn proxy_options(limit: u32) -> DownloaderOptions {
    DownloaderOptions {
        use_proxy: true,
        proxy_connection_limit: limit,
        ..options(true)
    }
}

/// Answers 403 to the second request it sees and 200 to every other one
struct BlockSecondRequest {
    hits: AtomicUsize,
}

impl Respond for BlockSecondRequest {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.hits.fetch_add(1, Ordering::SeqCst) == 1 {
            ResponseTemplate::new(403)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

#[tokio::test]
async fn test_proxy_mode_fetches_through_working_proxy() {
    let proxy = MockServer::start().await;
    // proxy check, then the real request
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(2)
        .mount(&proxy)
        .await;

    let addr = proxy.address().to_string();
    let mut downloader = Downloader::new("http://shop.test/", proxy_options(3))
        .unwrap()
        .with_proxy_source(Box::new(StaticProxySource::new(vec![addr.clone()])));

    let data = downloader
        .fetch_link(Link::new("http://shop.test/product"))
        .await
        .unwrap();

    assert_eq!(data.text(), "via proxy");
    assert!(downloader.uses_proxy());
    assert_eq!(downloader.proxy_state(), ProxyState::Connected);
    assert_eq!(downloader.session().proxy(), Some(addr.as_str()));
}

#[tokio::test]
async fn test_blocked_link_reconnects_proxy_before_retry() {
    let proxy = MockServer::start().await;
    // proxy check, blocked request, second check, retried request
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(BlockSecondRequest {
            hits: AtomicUsize::new(0),
        })
        .expect(4)
        .mount(&proxy)
        .await;

    let mut downloader = Downloader::new("http://shop.test/", proxy_options(3))
        .unwrap()
        .with_proxy_source(Box::new(StaticProxySource::new(vec![proxy
            .address()
            .to_string()])));

    let data = downloader
        .fetch_link(Link::new("http://shop.test/product"))
        .await
        .unwrap();

    assert_eq!(data.text(), "ok");
    assert!(downloader.uses_proxy());
    assert_eq!(downloader.proxy_state(), ProxyState::Connected);
}

async fn assert_falls_back_to_direct(proxies: Vec<String>) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
        .expect(1)
        .mount(&server)
        .await;

    let mut downloader = Downloader::new(&server.uri(), proxy_options(2))
        .unwrap()
        .with_proxy_source(Box::new(StaticProxySource::new(proxies)));

    let data = downloader
        .fetch_link(Link::new(format!("{}/product", server.uri())))
        .await
        .unwrap();

    assert_eq!(data.text(), "direct");
    assert!(!downloader.uses_proxy());
    assert_eq!(downloader.proxy_state(), ProxyState::Disconnected);
    assert!(downloader.session().proxy().is_none());
}

#[tokio::test]
async fn test_empty_proxy_list_falls_back_to_direct() {
    assert_falls_back_to_direct(Vec::new()).await;
}

#[tokio::test]
async fn test_dead_proxies_fall_back_to_direct() {
    assert_falls_back_to_direct(vec!["127.0.0.1:1".to_string()]).await;
}

const CHALLENGE_PAGE: &str = r#"<html><head><script>
    var sucuri_cloudproxy_js = '';
    document.cookie = 'sucuri_cloudproxy_uuid_3f2a=9bc1e0' + ';path=/';
</script></head></html>"#;

#[tokio::test]
async fn test_login_resubmits_after_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header_regex("cookie", "sucuri_cloudproxy_uuid_3f2a=9bc1e0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><a>Log Out</a></body></html>"),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "visitor=v1; Path=/")
                .set_body_string(CHALLENGE_PAGE),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = auth_config(&server, "log out");
    let Some(mut auth) = config.auth.clone() else {
        panic!("auth section should parse");
    };
    auth.find_form_fields = false;
    let mut downloader = Downloader::new(&config.vendor.source, options(true)).unwrap();

    assert!(authenticate(&mut downloader, &auth).await);
    let session = downloader.session();
    assert_eq!(
        session.cookie("sucuri_cloudproxy_uuid_3f2a").as_deref(),
        Some("9bc1e0")
    );
    assert_eq!(session.cookie("visitor").as_deref(), Some("v1"));
}
