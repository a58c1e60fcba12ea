//! Link discovery on category pages
//!
//! HTML mode runs the vendor's CSS selectors and resolves each `href` against
//! the page URL. Sitemap mode reads `<loc>` entries: nested sitemaps become
//! category links, every `<loc>` is a product candidate.

use crate::config::{CrawlConfig, DiscoveryMode};
use crate::crawler::data::Data;
use crate::crawler::hooks::VendorHooks;
use crate::crawler::link::Link;
use crate::feed::text::decode_entities;
use crate::url::resolve_link;
use crate::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static SITEMAP_LOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"<loc>([^<]*)</loc>").unwrap());

const SITEMAP_CATEGORY_SELECTOR: &str = "sitemap loc";

/// Links found on one category page
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiscoveredLinks {
    pub categories: Vec<Link>,
    pub products: Vec<Link>,
}

/// Compiled discovery rules for a vendor
#[derive(Debug)]
pub struct LinkDiscovery {
    mode: DiscoveryMode,
    category: Option<Selector>,
    product: Option<Selector>,
}

impl LinkDiscovery {
    /// Compiles the selectors of a crawl config
    ///
    /// Selectors of one kind are joined into a single group so matches come
    /// back in document order.
    pub fn from_config(crawl: &CrawlConfig) -> Result<Self, ConfigError> {
        let category = match crawl.discovery {
            DiscoveryMode::Sitemap if crawl.category_selectors.is_empty() => {
                compile(&[SITEMAP_CATEGORY_SELECTOR.to_string()])?
            }
            _ => compile(&crawl.category_selectors)?,
        };

        Ok(Self {
            mode: crawl.discovery,
            category,
            product: compile(&crawl.product_selectors)?,
        })
    }

    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// Extracts category and product links from a fetched page
    ///
    /// Vendor normalizers are applied to every link and the product filter
    /// runs last. Duplicates within the page are kept; the frontier drops them.
    pub fn discover(&self, data: &Data, page_url: &str, hooks: &dyn VendorHooks) -> DiscoveredLinks {
        let body = data.text();
        let document = Html::parse_document(&body);

        let (categories, products) = match self.mode {
            DiscoveryMode::Html => {
                let base = Url::parse(page_url).ok();
                (
                    select_hrefs(&document, self.category.as_ref(), base.as_ref()),
                    select_hrefs(&document, self.product.as_ref(), base.as_ref()),
                )
            }
            DiscoveryMode::Sitemap => (
                select_text(&document, self.category.as_ref()),
                sitemap_locs(&body),
            ),
        };

        DiscoveredLinks {
            categories: categories
                .into_iter()
                .map(|url| Link::new(hooks.normalize_category_link(url)))
                .collect(),
            products: products
                .into_iter()
                .map(|url| Link::new(hooks.normalize_product_link(url)))
                .filter(|link| hooks.filter_product_link(link))
                .collect(),
        }
    }
}

fn compile(selectors: &[String]) -> Result<Option<Selector>, ConfigError> {
    if selectors.is_empty() {
        return Ok(None);
    }
    let group = selectors.join(", ");
    Selector::parse(&group)
        .map(Some)
        .map_err(|e| ConfigError::InvalidSelector(format!("{}: {:?}", group, e)))
}

fn select_hrefs(document: &Html, selector: Option<&Selector>, base: Option<&Url>) -> Vec<String> {
    let Some(selector) = selector else {
        return Vec::new();
    };

    document
        .select(selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| match base {
            Some(base) => resolve_link(href, base),
            None => Url::parse(href.trim()).ok().map(|u| u.to_string()),
        })
        .collect()
}

fn select_text(document: &Html, selector: Option<&Selector>) -> Vec<String> {
    let Some(selector) = selector else {
        return Vec::new();
    };

    document
        .select(selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Every `<loc>` value of a sitemap document, entity-decoded
pub fn sitemap_locs(body: &str) -> Vec<String> {
    SITEMAP_LOC
        .captures_iter(body)
        .map(|captures| decode_entities(captures[1].trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::hooks::DefaultHooks;

    fn crawl_config(toml_str: &str) -> CrawlConfig {
        toml::from_str(toml_str).unwrap()
    }

    fn urls(links: &[Link]) -> Vec<String> {
        links.iter().map(Link::url).collect()
    }

    const LISTING: &str = r##"
        <html><body>
          <div id="nav"><a href="/store/sauces">Sauces</a><a href="/store/rubs#top">Rubs</a></div>
          <table>
            <tr class="item"><td><a href="/p/ghost-pepper">Ghost</a></td></tr>
            <tr class="item"><td><a href="https://www.example.com/p/habanero">Hab</a></td></tr>
            <tr class="item"><td><a href="javascript:void(0)">Nope</a></td></tr>
          </table>
        </body></html>"##;

    #[test]
    fn test_html_discovery_resolves_links() {
        let config = crawl_config(
            r#"
            category-selectors = ["div#nav a"]
            product-selectors = ["tr.item a"]
            "#,
        );
        let discovery = LinkDiscovery::from_config(&config).unwrap();
        let found = discovery.discover(
            &Data::new(LISTING),
            "https://www.example.com/store/all",
            &DefaultHooks,
        );

        assert_eq!(
            urls(&found.categories),
            vec![
                "https://www.example.com/store/sauces",
                "https://www.example.com/store/rubs"
            ]
        );
        assert_eq!(
            urls(&found.products),
            vec![
                "https://www.example.com/p/ghost-pepper",
                "https://www.example.com/p/habanero"
            ]
        );
    }

    struct OnlyGhost;

    impl VendorHooks for OnlyGhost {
        fn filter_product_link(&self, link: &Link) -> bool {
            link.url().contains("ghost")
        }

        fn normalize_product_link(&self, url: String) -> String {
            format!("{}?view=full", url)
        }
    }

    #[test]
    fn test_hooks_normalize_and_filter_products() {
        let config = crawl_config(r#"product-selectors = ["tr.item a"]"#);
        let discovery = LinkDiscovery::from_config(&config).unwrap();
        let found = discovery.discover(
            &Data::new(LISTING),
            "https://www.example.com/store/all",
            &OnlyGhost,
        );

        assert!(found.categories.is_empty());
        assert_eq!(
            urls(&found.products),
            vec!["https://www.example.com/p/ghost-pepper?view=full"]
        );
    }

    #[test]
    fn test_sitemap_discovery() {
        let config = crawl_config(r#"discovery = "sitemap""#);
        let discovery = LinkDiscovery::from_config(&config).unwrap();
        let body = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://e.com/p/1?a=1&amp;b=2</loc></url>
              <url><loc>https://e.com/p/2</loc></url>
            </urlset>"#;

        let found = discovery.discover(&Data::new(body), "https://e.com/sitemap.xml", &DefaultHooks);
        assert_eq!(
            urls(&found.products),
            vec!["https://e.com/p/1?a=1&b=2", "https://e.com/p/2"]
        );
    }

    #[test]
    fn test_sitemap_index_yields_categories() {
        let config = crawl_config(r#"discovery = "sitemap""#);
        let discovery = LinkDiscovery::from_config(&config).unwrap();
        let body = r#"<sitemapindex>
              <sitemap><loc>https://e.com/sitemap-products-1.xml</loc></sitemap>
            </sitemapindex>"#;

        let found = discovery.discover(&Data::new(body), "https://e.com/sitemap.xml", &DefaultHooks);
        assert_eq!(
            urls(&found.categories),
            vec!["https://e.com/sitemap-products-1.xml"]
        );
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let config = crawl_config(r#"product-selectors = ["tr[[["]"#);
        assert!(matches!(
            LinkDiscovery::from_config(&config),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_empty_page_finds_nothing() {
        let config = crawl_config(r#"product-selectors = ["a"]"#);
        let discovery = LinkDiscovery::from_config(&config).unwrap();
        let found = discovery.discover(&Data::default(), "https://e.com/", &DefaultHooks);
        assert_eq!(found, DiscoveredLinks::default());
    }
}
