//! Crawler module for vendor storefront fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with bounded concurrency, retries and proxy rotation
//! - The vendor login flow
//! - The deduplicated link frontier
//! - Link discovery on category pages
//! - Overall run coordination

pub mod auth;
pub mod data;
pub mod discovery;
pub mod downloader;
pub mod frontier;
pub mod hooks;
pub mod link;
mod processor;
pub mod proxy;
pub mod session;

pub use data::{Data, FetchOutput, FetchedLink};
pub use discovery::{DiscoveredLinks, LinkDiscovery};
pub use downloader::{Downloader, DownloaderOptions};
pub use frontier::{Frontier, FrontierEntry, LinkKind};
pub use hooks::{DefaultHooks, VendorHooks};
pub use link::{Link, Method, ParamEncoding};
pub use processor::{ProcessorEngine, RunSummary};
pub use proxy::{CheckerProxySource, ProxyCache, ProxySource, StaticProxySource};
pub use session::HttpSession;
