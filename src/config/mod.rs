//! Configuration module for Vendor-Feed
//!
//! This module handles loading, parsing, and validating per-vendor TOML
//! configuration files.
//!
//! # Example
//!
//! ```no_run
//! use vendor_feed::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("vendors/HSD.toml")).unwrap();
//! println!("Batch size: {}", config.crawl.chunk_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, AuthPayload, CrawlConfig, DebugConfig, DiscoveryMode, FeedSource, FeedType,
    OutputConfig, SelectorParserConfig, VendorConfig, VendorInfo,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, vendor_config_path,
};
