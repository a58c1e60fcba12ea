//! Vendor-Feed: crawl vendor storefronts and emit normalized product feeds
//!
//! This crate walks a vendor site from its seed pages, fetches category and
//! product pages in bounded batches, turns product pages into normalized
//! product records, reconciles them with price-list records, runs a QA pass
//! and hands the result to a storage sink.

pub mod config;
pub mod crawler;
pub mod feed;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Vendor-Feed operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ProcessorState,
        to: state::ProcessorState,
    },

    #[error("Batch fetch gave up after {attempts} attempts")]
    BatchRetriesExhausted { attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Link-specific errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Vendor-Feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for link operations
pub type LinkResult<T> = std::result::Result<T, LinkError>;

// Re-export commonly used types
pub use config::VendorConfig;
pub use crawler::{Data, Downloader, Frontier, Link, LinkKind, ProcessorEngine};
pub use feed::{ParseContext, ParseError, ParserAdapter, ProductRecord, ProductSource};
pub use state::{ProcessorState, ProxyState};
pub use storage::{FileStorage, RunContext, StorageSink};
