use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for one vendor run
#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    pub vendor: VendorInfo,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub debug: DebugConfig,
    /// Extra request headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub output: OutputConfig,
    /// Field selectors for the generic product page parser
    #[serde(default)]
    pub parser: Option<SelectorParserConfig>,
}

/// Kind of feed a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Product,
    Inventory,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Inventory => "inventory",
        }
    }
}

impl Default for FeedType {
    fn default() -> Self {
        Self::Product
    }
}

/// Where a feed's records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Crawled from the vendor storefront
    Site,
    /// Read from a vendor price list
    Price,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Price => "price",
        }
    }
}

impl Default for FeedSource {
    fn default() -> Self {
        Self::Site
    }
}

/// Vendor identity
#[derive(Debug, Clone, Deserialize)]
pub struct VendorInfo {
    /// Numeric supplier id used in feed file names
    #[serde(rename = "supplier-id")]
    pub supplier_id: u32,

    /// Human readable supplier name
    pub name: String,

    /// Product code prefix (e.g. "HSD-")
    pub prefix: String,

    /// Vendor storefront root
    pub source: String,

    #[serde(rename = "feed-type", default)]
    pub feed_type: FeedType,

    #[serde(rename = "feed-source", default)]
    pub feed_source: FeedSource,

    /// Overrides the generated feed file name stem
    #[serde(rename = "feed-file-name", default)]
    pub feed_file_name: Option<String>,

    /// Fields the downstream importer must not overwrite
    #[serde(rename = "dont-update-fields", default)]
    pub dont_update_fields: Vec<String>,
}

/// Link discovery strategy for category pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    Html,
    Sitemap,
}

impl Default for DiscoveryMode {
    fn default() -> Self {
        Self::Html
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Seed pages pushed into the frontier as categories
    #[serde(default)]
    pub seeds: Vec<String>,

    #[serde(rename = "category-selectors", default)]
    pub category_selectors: Vec<String>,

    #[serde(rename = "product-selectors", default)]
    pub product_selectors: Vec<String>,

    #[serde(default)]
    pub discovery: DiscoveryMode,

    /// Number of links fetched per batch
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-s", default = "default_request_timeout")]
    pub request_timeout_s: u64,

    /// Delay between request submissions inside a batch (seconds)
    #[serde(rename = "delay-s", default)]
    pub delay_s: f64,

    /// Maximum number of requests in flight
    #[serde(rename = "max-in-flight", default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Keep one user agent for the whole run instead of rotating per request
    #[serde(rename = "static-user-agent", default)]
    pub static_user_agent: bool,

    #[serde(rename = "use-proxy", default)]
    pub use_proxy: bool,

    /// Probe attempts before falling back to a direct connection
    #[serde(rename = "proxy-connection-limit", default = "default_proxy_limit")]
    pub proxy_connection_limit: u32,

    /// Requeue 403/430/5xx responses for the retry pass
    #[serde(rename = "process-error-links", default = "default_true")]
    pub process_error_links: bool,

    /// Give up on a batch after this many fetch failures (unbounded when unset)
    #[serde(rename = "max-batch-retries", default)]
    pub max_batch_retries: Option<u32>,
}

/// Login flow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Endpoint the credentials are posted to
    #[serde(rename = "login-url")]
    pub login_url: String,

    /// Page holding the login form, when it differs from the login URL
    #[serde(rename = "form-url", default)]
    pub form_url: Option<String>,

    /// Crawl the form page for hidden fields before submitting
    #[serde(rename = "find-form-fields", default = "default_true")]
    pub find_form_fields: bool,

    #[serde(default)]
    pub payload: AuthPayload,

    /// Text present on the page after a successful login
    #[serde(rename = "success-marker", default)]
    pub success_marker: Option<String>,

    /// Credential fields, first entry identifies the login form
    #[serde(default)]
    pub credentials: indexmap::IndexMap<String, String>,
}

/// Body encoding for the login request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPayload {
    Form,
    Json,
}

impl Default for AuthPayload {
    fn default() -> Self {
        Self::Form
    }
}

/// Development-only limits
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Stop once this many product records are collected
    #[serde(rename = "max-products", default)]
    pub max_products: Option<usize>,

    /// Product pages crawled instead of the discovered catalogue
    #[serde(rename = "custom-products", default)]
    pub custom_products: Vec<String>,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory feed files are written to
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Directory validation reports are written to
    #[serde(rename = "log-dir", default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// CSS selectors driving the generic product page parser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorParserConfig {
    pub product: Option<String>,
    pub mpn: Option<String>,
    pub brand: Option<String>,
    pub cost: Option<String>,
    #[serde(rename = "list-price")]
    pub list_price: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "short-description")]
    pub short_description: Option<String>,
    pub images: Option<String>,
    pub categories: Option<String>,
    pub upc: Option<String>,
    pub avail: Option<String>,
    /// Rows of `key: value` attribute text
    pub attributes: Option<String>,
}

fn default_chunk_size() -> usize {
    20
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    20
}

fn default_proxy_limit() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> String {
    "storage".to_string()
}

fn default_log_dir() -> String {
    "storage/logs".to_string()
}
