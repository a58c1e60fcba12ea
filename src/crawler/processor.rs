//! Processor engine - one vendor run from seeds to a persisted feed
//!
//! The engine owns the frontier and drives the run through its states:
//! - Building the downloader (authentication happens here)
//! - Seeding the frontier
//! - Fetching batches and dispatching pages to discovery or the parser
//! - Reconciling records with price-list records
//! - Running the QA pass in development
//! - Handing the records to the storage sink

use crate::config::VendorConfig;
use crate::crawler::data::{Data, FetchOutput};
use crate::crawler::discovery::LinkDiscovery;
use crate::crawler::downloader::Downloader;
use crate::crawler::frontier::{Frontier, LinkKind};
use crate::crawler::hooks::{DefaultHooks, VendorHooks};
use crate::crawler::link::Link;
use crate::crawler::proxy::ProxySource;
use crate::feed::{error_log_path, merge, FeedValidator, ParseContext, ParserAdapter, ProductRecord, ValidationReport};
use crate::state::ProcessorState;
use crate::storage::{count_products, RunContext, StorageMode, StorageSink};
use crate::{FeedError, Result};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BATCH_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// What a finished run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Batches fetched successfully
    pub batches: usize,
    /// Records handed to the storage sink
    pub records_saved: usize,
    /// Products those records stand for (groups count their children)
    pub products_saved: usize,
    /// QA report, present for development runs
    pub report: Option<ValidationReport>,
}

/// Drives one vendor run
pub struct ProcessorEngine {
    config: VendorConfig,
    dev: bool,
    adapter: Arc<dyn ParserAdapter>,
    storage: Box<dyn StorageSink>,
    hooks: Box<dyn VendorHooks>,
    proxy_source: Option<Box<dyn ProxySource>>,
    discovery: LinkDiscovery,
    price_items: IndexMap<String, ProductRecord>,
    frontier: Frontier,
    records: IndexMap<String, ProductRecord>,
    streamed: Vec<ProductRecord>,
    run: RunContext,
    state: ProcessorState,
}

impl ProcessorEngine {
    /// Creates an engine for a vendor
    ///
    /// # Arguments
    ///
    /// * `config` - Validated vendor configuration
    /// * `dev` - Development run: debug limits apply and the QA pass runs
    /// * `adapter` - Turns product pages into records
    /// * `storage` - Where finished records go
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessorEngine)` - Engine in the `Init` state
    /// * `Err(FeedError)` - Discovery selectors failed to compile
    pub fn new(
        config: VendorConfig,
        dev: bool,
        adapter: Arc<dyn ParserAdapter>,
        storage: Box<dyn StorageSink>,
    ) -> Result<Self> {
        let discovery = LinkDiscovery::from_config(&config.crawl)?;
        let run = RunContext::from_config(&config, dev);

        Ok(Self {
            config,
            dev,
            adapter,
            storage,
            hooks: Box::new(DefaultHooks),
            proxy_source: None,
            discovery,
            price_items: IndexMap::new(),
            frontier: Frontier::new(),
            records: IndexMap::new(),
            streamed: Vec::new(),
            run,
            state: ProcessorState::Init,
        })
    }

    pub fn with_hooks(mut self, hooks: Box<dyn VendorHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Price-list records to reconcile crawled records with
    pub fn with_price_items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = ProductRecord>,
    {
        self.price_items = items
            .into_iter()
            .map(|item| (item.mpn.clone(), item))
            .collect();
        self
    }

    pub fn with_proxy_source(mut self, source: Box<dyn ProxySource>) -> Self {
        self.proxy_source = Some(source);
        self
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// Runs the vendor from seeds to a persisted feed
    ///
    /// The storage sink is shut down however the run ends, so a streaming sink
    /// keeps the rows written before a failure.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.state != ProcessorState::Init {
            return Err(FeedError::InvalidTransition {
                from: self.state,
                to: ProcessorState::Seeding,
            });
        }

        tracing::info!(
            "Start vendor {} ({}) in {} mode",
            self.config.vendor.name,
            self.config.vendor.supplier_id,
            if self.dev { "dev" } else { "production" }
        );

        let outcome = self.execute().await;
        let shutdown = self.storage.shutdown();
        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(shutdown_error) = shutdown {
                    tracing::error!("Storage shutdown failed: {}", shutdown_error);
                }
                return Err(e);
            }
        };
        shutdown?;

        self.transition(ProcessorState::Done)?;
        tracing::info!(
            "Finish vendor {}: {} products saved",
            self.config.vendor.name,
            summary.products_saved
        );
        Ok(summary)
    }

    async fn execute(&mut self) -> Result<RunSummary> {
        let mut downloader =
            Downloader::from_config(&self.config, self.proxy_source.take()).await?;

        self.transition(ProcessorState::Seeding)?;
        self.seed();

        self.transition(ProcessorState::Crawling)?;
        let mut summary = RunSummary {
            batches: self.crawl(&mut downloader).await?,
            ..RunSummary::default()
        };

        self.transition(ProcessorState::Draining)?;
        self.hooks.after_process();
        tracing::info!("Crawl finished, {} links seen", self.frontier.count());

        self.transition(ProcessorState::Merging)?;
        let records = self.merged_records();

        if self.dev {
            self.transition(ProcessorState::Validating)?;
            summary.report = Some(self.validate(&records));
        }

        self.transition(ProcessorState::Persisting)?;
        self.persist(&records)?;

        match self.storage.mode() {
            StorageMode::Batch => {
                summary.records_saved = records.len();
                summary.products_saved = count_products(&records);
            }
            StorageMode::Streaming => {
                summary.records_saved = self.streamed.len();
                summary.products_saved = count_products(&self.streamed);
            }
        }
        Ok(summary)
    }

    fn transition(&mut self, next: ProcessorState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(FeedError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Processor state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Seeds are category links; a development product list replaces them
    fn seed(&mut self) {
        self.frontier
            .add_links(self.config.crawl.seeds.iter().map(String::as_str), LinkKind::Category);

        if self.dev && !self.config.debug.custom_products.is_empty() {
            tracing::info!(
                "Crawl {} custom products only",
                self.config.debug.custom_products.len()
            );
            self.frontier.clear();
            self.frontier.add_links(
                self.config.debug.custom_products.iter().map(String::as_str),
                LinkKind::Product,
            );
        }

        self.hooks.before_process(&mut self.frontier);
        tracing::info!("Frontier seeded with {} links", self.frontier.count());
    }

    async fn crawl(&mut self, downloader: &mut Downloader) -> Result<usize> {
        let chunk_size = self.config.crawl.chunk_size.max(1);
        let mut batches = 0;

        loop {
            let batch = self.frontier.next(None, chunk_size);
            if batch.is_empty() {
                break;
            }

            let output = self.fetch_batch(downloader, &batch).await?;
            batches += 1;
            tracing::info!(
                "Batch {}: fetched {} pages, {} links pending",
                batches,
                output.len(),
                self.frontier.pending()
            );

            for (url, data) in output.into_pairs() {
                self.dispatch(&url, &data)?;
                self.hooks.after_item(&url);
            }
            self.frontier.mark_visited(batch.iter().map(Link::url));

            if self.product_cap_reached() {
                tracing::info!("Debug product limit reached");
                break;
            }
            self.limit_discovery();
        }

        Ok(batches)
    }

    /// Fetches a batch, pausing and retrying the same batch on failure
    async fn fetch_batch(&self, downloader: &mut Downloader, batch: &[Link]) -> Result<FetchOutput> {
        let mut attempts = 0;
        loop {
            match downloader.fetch(batch, true).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    attempts += 1;
                    tracing::warn!("Batch fetch failed (attempt {}): {}", attempts, e);
                    if let Some(max) = self.config.crawl.max_batch_retries {
                        if attempts >= max {
                            return Err(FeedError::BatchRetriesExhausted { attempts });
                        }
                    }
                    tokio::time::sleep(BATCH_RETRY_PAUSE).await;
                }
            }
        }
    }

    fn dispatch(&mut self, url: &str, data: &Data) -> Result<()> {
        match self.frontier.kind_of(url) {
            Some(LinkKind::Category) => {
                let found = self.discovery.discover(data, url, self.hooks.as_ref());
                tracing::debug!(
                    "{}: {} category links, {} product links",
                    url,
                    found.categories.len(),
                    found.products.len()
                );
                self.frontier.add_links(found.categories, LinkKind::Category);
                self.frontier.add_links(found.products, LinkKind::Product);
                Ok(())
            }
            Some(LinkKind::Product) => self.parse_product(url, data),
            None => {
                tracing::debug!("Fetched {} is not in the frontier", url);
                Ok(())
            }
        }
    }

    fn parse_product(&mut self, url: &str, data: &Data) -> Result<()> {
        let ctx = ParseContext::new(
            url,
            self.config.vendor.prefix.as_str(),
            self.config.vendor.name.as_str(),
        );
        let records = match self.adapter.parse(data, &ctx) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Skip {}: {}", url, e);
                return Ok(());
            }
        };

        for record in records {
            match self.storage.mode() {
                StorageMode::Batch => self.buffer(record),
                StorageMode::Streaming => self.stream(record)?,
            }
        }
        Ok(())
    }

    /// Keeps the first record seen for a key
    fn buffer(&mut self, record: ProductRecord) {
        let key = record_key(&record);
        if self.records.contains_key(&key) {
            tracing::debug!("Duplicate record {} ignored", key);
            return;
        }
        self.records.insert(key, record);
    }

    fn stream(&mut self, record: ProductRecord) -> Result<()> {
        let mut records = [record];
        let hooks = self.hooks.as_ref();
        merge(&mut records, &self.price_items, &mut |record: &mut ProductRecord| {
            hooks.after_merge(record)
        });

        let [record] = records;
        if !self.hooks.is_valid(&record) {
            tracing::debug!("Record {} dropped by vendor filter", record.mpn);
            return Ok(());
        }
        self.storage.save_feed(&self.run, std::slice::from_ref(&record))?;
        self.streamed.push(record);
        Ok(())
    }

    fn collected(&self) -> usize {
        match self.storage.mode() {
            StorageMode::Batch => self.records.len(),
            StorageMode::Streaming => self.streamed.len(),
        }
    }

    fn product_cap_reached(&self) -> bool {
        match self.debug_cap() {
            Some(cap) => self.collected() >= cap,
            None => false,
        }
    }

    /// Stops category discovery once enough product links are queued
    fn limit_discovery(&mut self) {
        if let Some(cap) = self.debug_cap() {
            if self.frontier.count_kind(LinkKind::Product) >= cap {
                self.frontier.visit_all(LinkKind::Category);
            }
        }
    }

    fn debug_cap(&self) -> Option<usize> {
        if self.dev {
            self.config.debug.max_products
        } else {
            None
        }
    }

    /// Buffered records reconciled with the price list, vendor filter applied
    fn merged_records(&mut self) -> Vec<ProductRecord> {
        let mut records: Vec<ProductRecord> = std::mem::take(&mut self.records).into_values().collect();
        let hooks = self.hooks.as_ref();
        merge(&mut records, &self.price_items, &mut |record: &mut ProductRecord| {
            hooks.after_merge(record)
        });

        let before = records.len();
        records.retain(|record| self.hooks.is_valid(record));
        if records.len() < before {
            tracing::info!("{} records dropped by vendor filter", before - records.len());
        }
        records
    }

    /// QA pass; a report that cannot be written is only logged
    fn validate(&self, records: &[ProductRecord]) -> ValidationReport {
        let validated: &[ProductRecord] = match self.storage.mode() {
            StorageMode::Batch => records,
            StorageMode::Streaming => &self.streamed,
        };
        let report = FeedValidator::run(validated);
        let path = error_log_path(Path::new(&self.config.output.log_dir), &self.config.vendor.prefix);
        if let Err(e) = report.persist(&path) {
            tracing::warn!("Failed to write validation report {}: {}", path.display(), e);
        }
        report
    }

    fn persist(&mut self, records: &[ProductRecord]) -> Result<()> {
        if self.storage.mode() == StorageMode::Batch {
            self.storage.save_feed(&self.run, records)?;
        }
        Ok(())
    }
}

/// Buffer key of a record: its mpn, or a fresh key for a group
fn record_key(record: &ProductRecord) -> String {
    if record.is_group {
        format!("group-{:016x}", fastrand::u64(..))
    } else {
        record.mpn.clone()
    }
}
