//! URL handling module for Vendor-Feed
//!
//! Link resolution for discovered hrefs, asset link normalization and the
//! cookie domain derived from a vendor's source URL.

mod domain;
mod normalize;

pub use domain::{cookie_domain, extract_domain, parse_source};
pub use normalize::{normalize_src_link, resolve_link};
