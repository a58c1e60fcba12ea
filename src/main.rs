//! Vendor-Feed main entry point
//!
//! This is the command-line interface that runs one vendor's crawl.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vendor_feed::config::{load_config_with_hash, vendor_config_path, VendorConfig};
use vendor_feed::feed::{load_price_list, SelectorParser};
use vendor_feed::storage::{FileStorage, JsonLinesStorage, RunContext, StorageMode, StorageSink};
use vendor_feed::ProcessorEngine;

/// Vendor-Feed: crawl a vendor storefront into a product feed
///
/// Loads `<config-dir>/<vendor>.toml`, crawls the storefront from its seeds,
/// parses product pages and writes the resulting feed.
#[derive(Parser, Debug)]
#[command(name = "vendor-feed")]
#[command(version = "1.0.0")]
#[command(about = "Crawl a vendor storefront into a product feed", long_about = None)]
struct Cli {
    /// Vendor name; selects the configuration file
    #[arg(value_name = "VENDOR")]
    vendor: String,

    /// Run mode: dev applies debug limits and runs the QA pass
    #[arg(value_name = "MODE", default_value = "production", value_parser = ["dev", "production"])]
    mode: String,

    /// Output: file writes one feed document, stream writes a row per product
    #[arg(value_name = "STORAGE", default_value = "file", value_parser = ["file", "stream"])]
    storage: String,

    /// Directory holding vendor configuration files
    #[arg(long, default_value = "vendors")]
    config_dir: PathBuf,

    /// Overrides the configured output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// JSON array of price-list records merged into crawled records by mpn
    #[arg(long)]
    price_list: Option<PathBuf>,

    /// Validate config and exit without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let path = vendor_config_path(&cli.config_dir, &cli.vendor);
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = match load_config_with_hash(&path) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let dev = cli.mode == "dev";
    let mode = StorageMode::parse(&cli.storage).unwrap_or(StorageMode::Batch);
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));

    let Some(parser) = SelectorParser::from_config(&config) else {
        bail!("vendor {} has no [parser] section", cli.vendor);
    };

    let storage = build_storage(&config, dev, mode, &output_dir);
    let price_items = match &cli.price_list {
        Some(path) => load_price_list(path)
            .with_context(|| format!("failed to load price list {}", path.display()))?,
        None => Vec::new(),
    };
    tracing::info!("{} price-list records loaded", price_items.len());

    let mut engine = ProcessorEngine::new(config, dev, Arc::new(parser), storage)?
        .with_price_items(price_items);

    match engine.run().await {
        Ok(summary) => {
            tracing::info!(
                "Run completed: {} batches, {} products saved",
                summary.batches,
                summary.products_saved
            );
            if let Some(report) = summary.report.filter(|report| !report.passed()) {
                tracing::warn!("{} validation problems", report.failure_count());
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("vendor_feed=info,warn"),
            1 => EnvFilter::new("vendor_feed=debug,info"),
            2 => EnvFilter::new("vendor_feed=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_storage(
    config: &VendorConfig,
    dev: bool,
    mode: StorageMode,
    output_dir: &Path,
) -> Box<dyn StorageSink> {
    let files = FileStorage::new(output_dir);
    match mode {
        StorageMode::Batch => Box::new(files),
        StorageMode::Streaming => {
            let run = RunContext::from_config(config, dev);
            Box::new(JsonLinesStorage::new(files.file_path(&run, "jsonl")))
        }
    }
}

fn print_dry_run(config: &VendorConfig) {
    println!("=== Vendor-Feed Dry Run ===\n");

    println!("Vendor:");
    println!("  Name: {}", config.vendor.name);
    println!("  Supplier id: {}", config.vendor.supplier_id);
    println!("  Prefix: {}", config.vendor.prefix);
    println!("  Source: {}", config.vendor.source);
    println!("  Feed type: {}", config.vendor.feed_type.as_str());
    println!("  Feed source: {}", config.vendor.feed_source.as_str());

    println!("\nCrawl:");
    println!("  Chunk size: {}", config.crawl.chunk_size);
    println!("  Max in flight: {}", config.crawl.max_in_flight);
    println!("  Request timeout: {}s", config.crawl.request_timeout_s);
    println!("  Use proxy: {}", config.crawl.use_proxy);
    println!("  Login: {}", config.auth.is_some());

    println!("\nSeeds ({}):", config.crawl.seeds.len());
    for seed in &config.crawl.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}
