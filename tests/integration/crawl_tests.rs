//! Full vendor runs against a mock storefront

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vendor_feed::config::parse_config;
use vendor_feed::feed::SelectorParser;
use vendor_feed::storage::{
    FileStorage, JsonLinesStorage, RunContext, StorageError, StorageMode, StorageResult,
    StorageSink,
};
use vendor_feed::{FeedError, ProcessorEngine, ProcessorState, ProductRecord, VendorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vendor_config(server: &MockServer, work_dir: &Path, debug: &str) -> VendorConfig {
    parse_config(&format!(
        r#"
[vendor]
supplier-id = 42
name = "Hot Stuff"
prefix = "HSD-"
source = "{uri}/"

[crawl]
seeds = ["{uri}/store/all"]
category-selectors = ["div.pager a"]
product-selectors = ["td.product a"]
request-timeout-s = 5

[parser]
product = "h1.title"
mpn = "span.sku"
cost = "span.price"

[output]
dir = "{out}"
log-dir = "{logs}"

{debug}
"#,
        uri = server.uri(),
        out = work_dir.join("feeds").display(),
        logs = work_dir.join("logs").display(),
        debug = debug
    ))
    .unwrap()
}

fn page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

async fn mount_storefront(server: &MockServer, page2_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/store/all"))
        .respond_with(page(
            r#"<div class="pager"><a href="/store/page2">2</a></div>
               <table>
                 <tr><td class="product"><a href="/p/ghost">Ghost</a></td></tr>
                 <tr><td class="product"><a href="/p/reaper">Reaper</a></td></tr>
               </table>"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/store/page2"))
        .respond_with(page(
            r#"<div class="pager"><a href="/store/all">1</a></div>
               <table><tr><td class="product"><a href="/p/ghost">Ghost</a></td></tr></table>"#,
        ))
        .expect(page2_hits)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/ghost"))
        .respond_with(page(
            r#"<h1 class="title">Ghost Pepper Sauce</h1>
               <span class="sku">GP-100</span>
               <span class="price">$9.99</span>"#,
        ))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/reaper"))
        .respond_with(page(
            r#"<h1 class="title">Reaper Sauce</h1>
               <span class="sku">RP-200</span>
               <span class="price">$12.50</span>"#,
        ))
        .expect(1)
        .mount(server)
        .await;
}

fn engine(config: VendorConfig, dev: bool, storage: Box<dyn StorageSink>) -> ProcessorEngine {
    let parser = SelectorParser::from_config(&config).unwrap();
    ProcessorEngine::new(config, dev, Arc::new(parser), storage).unwrap()
}

fn price_item(mpn: &str, cost: f64) -> ProductRecord {
    ProductRecord {
        mpn: mpn.to_string(),
        cost_to_us: cost,
        ..ProductRecord::default()
    }
}

#[tokio::test]
async fn test_full_run_writes_feed_with_price_list_cost() {
    let server = MockServer::start().await;
    mount_storefront(&server, 1).await;
    let work_dir = tempfile::tempdir().unwrap();
    let feeds = work_dir.path().join("feeds");

    let config = vendor_config(&server, work_dir.path(), "");
    let mut engine = engine(config, false, Box::new(FileStorage::new(&feeds)))
        .with_price_items([price_item("GP-100", 7.5)]);

    let summary = engine.run().await.unwrap();
    assert_eq!(engine.state(), ProcessorState::Done);
    assert_eq!(summary.products_saved, 2);
    assert!(summary.report.is_none());

    let json = std::fs::read_to_string(feeds.join("feed42p.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(document["products_in_feed"], 2);
    assert_eq!(document["supplier_name"], "Hot Stuff");
    assert_eq!(document["feed_source"], "site");

    let products = document["products"].as_array().unwrap();
    let ghost = products.iter().find(|p| p["mpn"] == "GP-100").unwrap();
    let reaper = products.iter().find(|p| p["mpn"] == "RP-200").unwrap();
    assert_eq!(ghost["cost_to_us"], 7.5);
    assert_eq!(ghost["productcode"], "HSD-GP-100");
    assert_eq!(ghost["brand_name"], "Hot Stuff");
    assert_eq!(reaper["cost_to_us"], 12.5);

    assert!(feeds.join("feed42p.sha256").exists());
    assert!(feeds.join("feed42p.md5").exists());
}

#[tokio::test]
async fn test_dev_run_stops_discovery_at_product_cap() {
    let server = MockServer::start().await;
    mount_storefront(&server, 0).await;
    let work_dir = tempfile::tempdir().unwrap();
    let feeds = work_dir.path().join("feeds");

    let config = vendor_config(&server, work_dir.path(), "[debug]\nmax-products = 1");
    let mut engine = engine(config, true, Box::new(FileStorage::new(&feeds)));

    let summary = engine.run().await.unwrap();
    assert!(summary.products_saved >= 1);

    let report = summary.report.unwrap();
    let error_log = work_dir.path().join("logs").join("HSD_error.log");
    assert_eq!(error_log.exists(), !report.passed());
}

#[tokio::test]
async fn test_streaming_run_writes_one_row_per_product() {
    let server = MockServer::start().await;
    mount_storefront(&server, 1).await;
    let work_dir = tempfile::tempdir().unwrap();
    let stream = work_dir.path().join("feed42p.jsonl");

    let config = vendor_config(&server, work_dir.path(), "");
    let mut engine = engine(config, false, Box::new(JsonLinesStorage::new(&stream)))
        .with_price_items([price_item("RP-200", 11.0)]);

    let summary = engine.run().await.unwrap();
    assert_eq!(summary.records_saved, 2);

    let content = std::fs::read_to_string(&stream).unwrap();
    let rows: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    let reaper = rows.iter().find(|row| row["mpn"] == "RP-200").unwrap();
    assert_eq!(reaper["cost_to_us"], 11.0);
}

#[tokio::test]
async fn test_engine_runs_once() {
    let server = MockServer::start().await;
    mount_storefront(&server, 1).await;
    let work_dir = tempfile::tempdir().unwrap();

    let config = vendor_config(&server, work_dir.path(), "");
    let mut engine = engine(
        config,
        false,
        Box::new(FileStorage::new(work_dir.path().join("feeds"))),
    );

    engine.run().await.unwrap();
    assert!(engine.run().await.is_err());
}

/// Streaming sink whose queue is down
struct UnavailableQueue {
    shut_down: Arc<AtomicBool>,
}

impl StorageSink for UnavailableQueue {
    fn mode(&self) -> StorageMode {
        StorageMode::Streaming
    }

    fn save_feed(&mut self, _run: &RunContext, _records: &[ProductRecord]) -> StorageResult<()> {
        Err(StorageError::Unsupported("queue unavailable".to_string()))
    }

    fn shutdown(&mut self) -> StorageResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_run_still_shuts_storage_down() {
    let server = MockServer::start().await;
    mount_storefront(&server, 1).await;
    let work_dir = tempfile::tempdir().unwrap();
    let shut_down = Arc::new(AtomicBool::new(false));

    let config = vendor_config(&server, work_dir.path(), "");
    let sink = UnavailableQueue {
        shut_down: Arc::clone(&shut_down),
    };
    let mut engine = engine(config, false, Box::new(sink));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, FeedError::Storage(_)));
    assert!(shut_down.load(Ordering::SeqCst));
    assert_ne!(engine.state(), ProcessorState::Done);
}
