//! Configuration-driven product page parser
//!
//! Reads each field with a CSS selector from the `[parser]` table of the
//! vendor config. Vendors with unusual pages implement [`ProductSource`]
//! themselves instead.

use crate::config::{SelectorParserConfig, VendorConfig};
use crate::crawler::Data;
use crate::feed::item::ProductRecord;
use crate::feed::source::{build_record, HtmlDocument, ParseContext, ParseError, ParserAdapter, ProductSource};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// [`ParserAdapter`] over the `[parser]` selectors
#[derive(Debug, Clone)]
pub struct SelectorParser {
    selectors: SelectorParserConfig,
    source: String,
}

impl SelectorParser {
    pub fn new(selectors: SelectorParserConfig, source: impl Into<String>) -> Self {
        Self {
            selectors,
            source: source.into(),
        }
    }

    /// `None` when the vendor config has no `[parser]` table
    pub fn from_config(config: &VendorConfig) -> Option<Self> {
        config
            .parser
            .clone()
            .map(|selectors| Self::new(selectors, config.vendor.source.clone()))
    }
}

impl ParserAdapter for SelectorParser {
    fn parse(&self, data: &Data, ctx: &ParseContext) -> Result<Vec<ProductRecord>, ParseError> {
        if data.is_empty() {
            return Err(ParseError::new(&ctx.url, "empty document"));
        }

        let page = SelectorPage {
            doc: HtmlDocument::from_data(data),
            selectors: &self.selectors,
            source: &self.source,
            url: &ctx.url,
        };
        Ok(build_record(&page, ctx).into_iter().collect())
    }
}

struct SelectorPage<'a> {
    doc: HtmlDocument,
    selectors: &'a SelectorParserConfig,
    source: &'a str,
    url: &'a str,
}

impl SelectorPage<'_> {
    fn text(&self, selector: &Option<String>) -> Option<String> {
        let selector = selector.as_deref()?;
        let text = self.doc.text(selector);
        (!text.is_empty()).then_some(text)
    }
}

impl ProductSource for SelectorPage<'_> {
    fn before_parse(&self) -> Result<(), ParseError> {
        match self.selectors.product.as_deref() {
            Some(selector) if !self.doc.exists(selector) => {
                Err(ParseError::new(self.url, "product name element not found"))
            }
            _ => Ok(()),
        }
    }

    fn product(&self) -> String {
        self.text(&self.selectors.product).unwrap_or_default()
    }

    fn description(&self) -> String {
        match self.selectors.description.as_deref() {
            Some(selector) if self.doc.exists(selector) => self.doc.html(selector),
            _ => self.product(),
        }
    }

    fn short_description(&self) -> Vec<String> {
        self.selectors
            .short_description
            .as_deref()
            .map(|selector| self.doc.contents(selector))
            .unwrap_or_default()
    }

    fn brand(&self) -> Option<String> {
        self.text(&self.selectors.brand)
    }

    fn mpn(&self) -> String {
        self.text(&self.selectors.mpn).unwrap_or_default()
    }

    fn list_price(&self) -> Option<f64> {
        let selector = self.selectors.list_price.as_deref()?;
        let price = self.doc.money(selector);
        (price > 0.0).then_some(price)
    }

    fn cost(&self) -> f64 {
        self.selectors
            .cost
            .as_deref()
            .map_or(0.0, |selector| self.doc.money(selector))
    }

    fn upc(&self) -> Option<String> {
        self.text(&self.selectors.upc)
    }

    fn images(&self) -> Vec<String> {
        self.selectors
            .images
            .as_deref()
            .map(|selector| self.doc.image_srcs(selector, self.source))
            .unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        self.selectors
            .categories
            .as_deref()
            .map(|selector| self.doc.contents(selector))
            .unwrap_or_default()
            .into_iter()
            .filter(|category| !category.is_empty())
            .collect()
    }

    fn avail(&self) -> Option<i64> {
        let text = self.text(&self.selectors.avail)?;
        FIRST_INTEGER.find(&text)?.as_str().parse().ok()
    }

    fn attributes(&self) -> Option<IndexMap<String, Value>> {
        let selector = self.selectors.attributes.as_deref()?;
        let attributes: IndexMap<String, Value> = self
            .doc
            .contents(selector)
            .iter()
            .filter_map(|row| row.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), Value::String(value.trim().to_string())))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        (!attributes.is_empty()).then_some(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> SelectorParserConfig {
        toml::from_str(
            r#"
            product = "h1.title"
            mpn = "span.sku"
            brand = "span.brand"
            cost = "span.price"
            list-price = "span.msrp"
            description = "div.desc"
            short-description = "ul.bullets li"
            images = "img.gallery"
            categories = "nav.crumbs a"
            avail = "span.stock"
            attributes = "table.specs tr"
            "#,
        )
        .unwrap()
    }

    const PRODUCT_PAGE: &str = r#"
        <html><body>
          <nav class="crumbs"><a href="/">HOME</a><a href="/s">Hot Sauces</a></nav>
          <h1 class="title">Ghost Pepper Sauce</h1>
          <span class="sku">GP-100</span>
          <span class="brand">hot stuff</span>
          <span class="price">$9.99</span>
          <span class="msrp">$0.00</span>
          <span class="stock">14 in stock</span>
          <ul class="bullets"><li>Very hot</li><li>Vegan</li></ul>
          <div class="desc"><p>Smoky.</p></div>
          <img class="gallery" src="/img/gp.jpg">
          <table class="specs"><tr><td>Heat: Extreme</td></tr><tr><td>Origin: USA</td></tr></table>
        </body></html>"#;

    fn ctx() -> ParseContext {
        ParseContext::new("https://www.example.com/p/ghost", "HSD-", "Hot Stuff")
    }

    #[test]
    fn test_parse_product_page() {
        let parser = SelectorParser::new(selectors(), "https://www.example.com/");
        let records = parser.parse(&Data::new(PRODUCT_PAGE), &ctx()).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.product, "Ghost Pepper Sauce");
        assert_eq!(record.mpn, "GP-100");
        assert_eq!(record.productcode, "HSD-GP-100");
        assert_eq!(record.brand_name.as_deref(), Some("Hot Stuff"));
        assert_eq!(record.cost_to_us, 9.99);
        assert_eq!(record.list_price, None);
        assert_eq!(record.r_avail, Some(14));
        assert_eq!(record.fulldescr, "<p>Smoky.</p>");
        assert_eq!(record.descr.as_deref(), Some("<ul><li>Very hot</li><li>Vegan</li></ul>"));
        assert_eq!(record.images, vec!["https://www.example.com/img/gp.jpg"]);
        assert_eq!(record.supplier_categories, vec!["Home", "Hot sauces"]);
        assert_eq!(record.supplier_internal_id, "https://www.example.com/p/ghost");

        let attributes = record.attributes.as_ref().unwrap();
        assert_eq!(attributes.get("Heat"), Some(&Value::String("Extreme".to_string())));
        assert_eq!(attributes.get("Origin"), Some(&Value::String("USA".to_string())));
    }

    #[test]
    fn test_missing_product_element_skips_record() {
        let parser = SelectorParser::new(selectors(), "https://www.example.com/");
        let records = parser
            .parse(&Data::new("<html><body><p>Not found</p></body></html>"), &ctx())
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_document_is_error() {
        let parser = SelectorParser::new(selectors(), "https://www.example.com/");
        let err = parser.parse(&Data::default(), &ctx()).unwrap_err();
        assert_eq!(err.url, "https://www.example.com/p/ghost");
    }
}
