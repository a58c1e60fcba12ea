//! Vendor customization points
//!
//! Every method has a no-op default, so a vendor overrides only what it needs.

use crate::crawler::frontier::Frontier;
use crate::crawler::link::Link;
use crate::feed::ProductRecord;

/// Per-vendor adjustments applied by the processor engine
pub trait VendorHooks: Send + Sync {
    /// Runs after seeding, before the first batch is fetched
    fn before_process(&self, _frontier: &mut Frontier) {}

    /// Runs once the frontier is drained
    fn after_process(&self) {}

    /// Runs after each fetched document has been dispatched
    fn after_item(&self, _url: &str) {}

    /// Adjusts a record after price-list reconciliation
    fn after_merge(&self, _record: &mut ProductRecord) {}

    /// Records failing this predicate are dropped before persisting
    fn is_valid(&self, _record: &ProductRecord) -> bool {
        true
    }

    /// Product links failing this predicate never enter the frontier
    fn filter_product_link(&self, link: &Link) -> bool {
        !link.url().is_empty()
    }

    fn normalize_category_link(&self, url: String) -> String {
        url
    }

    fn normalize_product_link(&self, url: String) -> String {
        url
    }
}

/// Hooks that change nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl VendorHooks for DefaultHooks {}
