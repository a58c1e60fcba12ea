//! Parser contract for product pages
//!
//! A vendor adapter implements [`ProductSource`] for one product page and
//! overrides only the accessors it can answer; every other field falls back
//! to the provided default. [`ParserAdapter`] turns a fetched document into
//! finished records.

use crate::crawler::Data;
use crate::feed::item::ProductRecord;
use crate::feed::text::get_money;
use crate::url::normalize_src_link;
use chrono::NaiveDate;
use indexmap::IndexMap;
use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Failure to turn a product page into a record
#[derive(Debug, Clone, Error)]
#[error("Failed to parse {url}: {message}")]
pub struct ParseError {
    pub url: String,
    pub message: String,
}

impl ParseError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Per-page facts the record builder needs besides the page itself
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// URL of the product page
    pub url: String,
    /// Vendor product code prefix
    pub prefix: String,
    /// Vendor name, used as the brand of last resort for group children
    pub supplier_name: String,
}

impl ParseContext {
    pub fn new(url: impl Into<String>, prefix: impl Into<String>, supplier_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefix: prefix.into(),
            supplier_name: supplier_name.into(),
        }
    }
}

/// Field accessors for one product page
pub trait ProductSource {
    /// Rejects the page before any field is read
    fn before_parse(&self) -> Result<(), ParseError> {
        Ok(())
    }

    fn product(&self) -> String {
        String::new()
    }

    /// Long description; the product name when the page has none
    fn description(&self) -> String {
        self.product()
    }

    fn short_description(&self) -> Vec<String> {
        Vec::new()
    }

    fn brand(&self) -> Option<String> {
        None
    }

    fn brand_normalized(&self) -> bool {
        false
    }

    fn mpn(&self) -> String {
        String::new()
    }

    /// Overrides the generated `prefix + mpn` product code
    fn product_code(&self) -> Option<String> {
        None
    }

    /// Vendor-side identifier; the page URL when absent
    fn internal_id(&self) -> Option<String> {
        None
    }

    fn list_price(&self) -> Option<f64> {
        None
    }

    fn cost(&self) -> f64 {
        0.0
    }

    fn min_price(&self) -> Option<f64> {
        None
    }

    fn upc(&self) -> Option<String> {
        None
    }

    fn asin(&self) -> Option<String> {
        None
    }

    fn images(&self) -> Vec<String> {
        Vec::new()
    }

    fn alt_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn min_amount(&self) -> Option<u32> {
        Some(1)
    }

    fn categories(&self) -> Vec<String> {
        Vec::new()
    }

    fn avail(&self) -> Option<i64> {
        None
    }

    fn forsale(&self) -> String {
        "Y".to_string()
    }

    fn is_group(&self) -> bool {
        false
    }

    fn weight(&self) -> Option<f64> {
        None
    }

    fn shipping_weight(&self) -> Option<f64> {
        None
    }

    fn dim_x(&self) -> Option<f64> {
        None
    }

    fn dim_y(&self) -> Option<f64> {
        None
    }

    fn dim_z(&self) -> Option<f64> {
        None
    }

    fn shipping_dim_x(&self) -> Option<f64> {
        None
    }

    fn shipping_dim_y(&self) -> Option<f64> {
        None
    }

    fn shipping_dim_z(&self) -> Option<f64> {
        None
    }

    fn attributes(&self) -> Option<IndexMap<String, Value>> {
        None
    }

    fn eta_date(&self) -> Option<NaiveDate> {
        None
    }

    fn lead_time_message(&self) -> Option<String> {
        None
    }

    /// Each entry is an object with `name` and `link`
    fn product_files(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Option name to value or list of values
    fn options(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }

    /// Each entry is an object with `name`, `video` and `provider`
    fn videos(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Builds the children of a group record
    fn child_products(&self, _parent: &ProductRecord, _ctx: &ParseContext) -> Result<Vec<ProductRecord>, ParseError> {
        Ok(Vec::new())
    }

    /// Last adjustment of the finished record
    fn after_parse(&self, _record: &mut ProductRecord) {}
}

/// Turns a fetched product page into records
pub trait ParserAdapter: Send + Sync {
    /// # Arguments
    ///
    /// * `data` - Fetched page
    /// * `ctx` - Page URL and vendor facts
    ///
    /// # Returns
    ///
    /// The records found on the page; records that fail to build are logged
    /// and left out.
    fn parse(&self, data: &Data, ctx: &ParseContext) -> Result<Vec<ProductRecord>, ParseError>;
}

/// Builds a record and logs the failure instead of returning it
pub fn build_record(source: &dyn ProductSource, ctx: &ParseContext) -> Option<ProductRecord> {
    match ProductRecord::from_source(source, ctx) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Skipping product {}: {}", ctx.url, e.message.trim());
            None
        }
    }
}

/// CSS query helpers over a parsed HTML page
///
/// Invalid selectors behave as selectors that match nothing.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    pub fn from_data(data: &Data) -> Self {
        Self::parse(&data.text())
    }

    fn selector(css: &str) -> Option<Selector> {
        match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::debug!("Invalid selector {}: {:?}", css, e);
                None
            }
        }
    }

    /// True when at least one element matches
    pub fn exists(&self, css: &str) -> bool {
        Self::selector(css).map_or(false, |s| self.html.select(&s).next().is_some())
    }

    /// Trimmed text of the first match, empty when nothing matches
    pub fn text(&self, css: &str) -> String {
        self.contents(css).into_iter().next().unwrap_or_default()
    }

    /// Inner HTML of the first match
    pub fn html(&self, css: &str) -> String {
        Self::selector(css)
            .and_then(|s| self.html.select(&s).next().map(|e| e.inner_html().trim().to_string()))
            .unwrap_or_default()
    }

    /// Amount in the text of the first match, `0.0` when absent
    pub fn money(&self, css: &str) -> f64 {
        get_money(&self.text(css))
    }

    /// Trimmed text of every match
    pub fn contents(&self, css: &str) -> Vec<String> {
        let Some(selector) = Self::selector(css) else {
            return Vec::new();
        };
        self.html
            .select(&selector)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .collect()
    }

    pub fn attr(&self, css: &str, name: &str) -> Option<String> {
        self.attrs(css, name).into_iter().next()
    }

    /// Values of `name` on every match that carries it
    pub fn attrs(&self, css: &str, name: &str) -> Vec<String> {
        let Some(selector) = Self::selector(css) else {
            return Vec::new();
        };
        self.html
            .select(&selector)
            .filter_map(|e| e.value().attr(name))
            .map(|v| v.trim().to_string())
            .collect()
    }

    /// `href` values of every match
    pub fn links(&self, css: &str) -> Vec<String> {
        self.attrs(css, "href")
    }

    /// Absolute image URLs of every match, in document order, without repeats
    ///
    /// Lazy-loading `data-src` wins over `src`.
    pub fn image_srcs(&self, css: &str, source: &str) -> Vec<String> {
        let Some(selector) = Self::selector(css) else {
            return Vec::new();
        };

        let mut images: Vec<String> = Vec::new();
        for element in self.html.select(&selector) {
            let value = element.value();
            let Some(src) = value.attr("data-src").or_else(|| value.attr("src")) else {
                continue;
            };
            if src.trim().is_empty() {
                continue;
            }
            match normalize_src_link(src.trim(), source) {
                Ok(url) if !images.contains(&url) => images.push(url),
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping image {}: {}", src, e),
            }
        }
        images
    }
}
