//! Storage module for persisting finished feeds
//!
//! This module handles:
//! - The run facts every feed document carries
//! - Projecting records to feed rows (full or inventory subset)
//! - The JSON feed file sink and the streaming JSON-lines sink

mod file;
mod jsonl;
mod traits;

pub use file::FileStorage;
pub use jsonl::JsonLinesStorage;
pub use traits::{StorageError, StorageMode, StorageResult, StorageSink};

use crate::config::{FeedSource, FeedType, VendorConfig};
use crate::feed::ProductRecord;
use chrono::{DateTime, Local};
use serde_json::{Map, Value};

/// Fields an inventory feed keeps from each record
pub const INVENTORY_FIELDS: &[&str] = &[
    "cost_to_us",
    "new_map_price",
    "productcode",
    "r_avail",
    "min_amount",
    "forsale",
    "eta_date_mm_dd_yyyy",
    "upc",
];

/// Facts about the current run that end up in the feed document
#[derive(Debug, Clone)]
pub struct RunContext {
    pub supplier_id: u32,
    pub supplier_name: String,
    /// Vendor storefront root
    pub source: String,
    pub feed_type: FeedType,
    /// Where the records came from
    pub feed_source: FeedSource,
    pub feed_date: DateTime<Local>,
    pub started_at: DateTime<Local>,
    pub dev: bool,
    pub dont_update_fields: Vec<String>,
    pub feed_file_name: Option<String>,
}

impl RunContext {
    pub fn from_config(config: &VendorConfig, dev: bool) -> Self {
        let now = Local::now();
        Self {
            supplier_id: config.vendor.supplier_id,
            supplier_name: config.vendor.name.clone(),
            source: config.vendor.source.clone(),
            feed_type: config.vendor.feed_type,
            feed_source: config.vendor.feed_source,
            feed_date: now,
            started_at: now,
            dev,
            dont_update_fields: config.vendor.dont_update_fields.clone(),
            feed_file_name: config.vendor.feed_file_name.clone(),
        }
    }

    /// Whole seconds since the run started
    pub fn process_time(&self) -> i64 {
        (Local::now() - self.started_at).num_seconds()
    }
}

/// Feed rows for a record set
///
/// Inventory feeds keep only [`INVENTORY_FIELDS`]. An empty brand is replaced
/// by the supplier name in both kinds of feed.
pub fn product_rows(run: &RunContext, records: &[ProductRecord]) -> StorageResult<Vec<Value>> {
    records.iter().map(|record| product_row(run, record)).collect()
}

fn product_row(run: &RunContext, record: &ProductRecord) -> StorageResult<Value> {
    let Value::Object(mut row) = serde_json::to_value(record)? else {
        return Err(StorageError::Unsupported(format!(
            "record {} did not serialize to an object",
            record.productcode
        )));
    };

    if run.feed_type == FeedType::Inventory {
        let mut subset = Map::new();
        for field in INVENTORY_FIELDS {
            if let Some(value) = row.remove(*field) {
                subset.insert(field.to_string(), value);
            }
        }
        row = subset;
    }

    let brand_missing = record.brand_name.as_deref().map_or(true, str::is_empty);
    let brand = if brand_missing {
        Value::String(run.supplier_name.clone())
    } else {
        Value::String(record.brand_name.clone().unwrap_or_default())
    };
    row.insert("brand_name".to_string(), brand);

    Ok(Value::Object(row))
}

/// Products a record set stands for; groups count their children
pub fn count_products(records: &[ProductRecord]) -> usize {
    records.iter().map(ProductRecord::product_count).sum()
}
