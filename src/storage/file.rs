//! JSON feed file sink

use crate::config::{FeedSource, FeedType};
use crate::feed::ProductRecord;
use crate::storage::{count_products, product_rows, RunContext, StorageMode, StorageResult, StorageSink};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const FEED_FILE_EXTENSION: &str = "json";
const CHECKSUM_EXTENSION: &str = "sha256";
const MD5_EXTENSION: &str = "md5";

/// Import defaults sent with every product feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedDefaults {
    pub dim_x: u32,
    pub dim_y: u32,
    pub dim_z: u32,
    pub weight: u32,
    pub min_amount: u32,
    pub mult_order_quantity: &'static str,
    pub shipping_freight: f64,
    pub discount_avail: &'static str,
    pub low_avail_limit: u32,
    pub free_tax: &'static str,
    pub discount_slope: f64,
    pub discount_table: &'static str,
    pub free_ship_zone: i32,
    pub free_ship_text: &'static str,
    pub lead_time_message: &'static str,
    pub pc_classify_status: &'static str,
    pub provider: &'static str,
    pub product_type: &'static str,
    pub update_search_index: &'static str,
}

impl Default for FeedDefaults {
    fn default() -> Self {
        Self {
            dim_x: 0,
            dim_y: 0,
            dim_z: 0,
            weight: 0,
            min_amount: 1,
            mult_order_quantity: "N",
            shipping_freight: 0.01,
            discount_avail: "Y",
            low_avail_limit: 1000,
            free_tax: "Y",
            discount_slope: 0.6,
            discount_table: "2,3,4,6,8,12",
            free_ship_zone: -1,
            free_ship_text: "",
            lead_time_message: "",
            pc_classify_status: "NC",
            provider: "feed",
            product_type: "N",
            update_search_index: "Y",
        }
    }
}

/// The document written to the feed file
#[derive(Debug, Serialize)]
pub struct FeedDocument {
    pub supplier_id: u32,
    pub supplier_name: String,
    pub original_url: String,
    pub create_date: String,
    pub feed_source: FeedSource,
    pub feed_source_date: String,
    pub feed_type: &'static str,
    pub process_time: i64,
    pub products_in_feed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<FeedDefaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dont_update_fields: Option<Vec<String>>,
    pub products: Vec<Value>,
}

impl FeedDocument {
    pub fn build(run: &RunContext, records: &[ProductRecord]) -> StorageResult<Self> {
        let product_feed = run.feed_type == FeedType::Product;
        Ok(Self {
            supplier_id: run.supplier_id,
            supplier_name: run.supplier_name.clone(),
            original_url: run.source.clone(),
            create_date: chrono::Local::now().format("%m-%d-%Y-%H-%M-%S").to_string(),
            feed_source: run.feed_source,
            feed_source_date: run.feed_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            feed_type: run.feed_type.as_str(),
            process_time: run.process_time(),
            products_in_feed: count_products(records),
            defaults: product_feed.then(FeedDefaults::default),
            dont_update_fields: product_feed.then(|| run.dont_update_fields.clone()),
            products: product_rows(run, records)?,
        })
    }
}

/// Writes the whole feed as one JSON file plus checksum files
///
/// Next to `<stem>.json` go `<stem>.sha256` and `<stem>.md5`, each holding the
/// lowercase hex digest of the feed file. Importers that only know the md5
/// sidecar keep working.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Feed file path for a run with the given extension
    ///
    /// The configured file name stem wins; otherwise
    /// `feed<supplier id><feed type initial>`.
    pub fn file_path(&self, run: &RunContext, extension: &str) -> PathBuf {
        let stem = run
            .feed_file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| {
                let initial = run.feed_type.as_str().chars().next().unwrap_or('p');
                format!("feed{}{}", run.supplier_id, initial)
            });
        self.dir.join(format!("{}.{}", stem, extension))
    }
}

impl StorageSink for FileStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Batch
    }

    fn save_feed(&mut self, run: &RunContext, records: &[ProductRecord]) -> StorageResult<()> {
        if records.is_empty() {
            tracing::info!("No products to save");
            return Ok(());
        }

        let document = FeedDocument::build(run, records)?;
        let json = if run.dev {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };

        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_path(run, FEED_FILE_EXTENSION);
        std::fs::write(&path, &json)?;

        let checksum = hex::encode(Sha256::digest(json.as_bytes()));
        std::fs::write(self.file_path(run, CHECKSUM_EXTENSION), checksum)?;
        let md5 = format!("{:x}", md5::compute(json.as_bytes()));
        std::fs::write(self.file_path(run, MD5_EXTENSION), md5)?;

        tracing::info!(
            "Saved {} products to {}",
            document.products_in_feed,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{record, run_context};

    #[test]
    fn test_file_name() {
        let storage = FileStorage::new("/tmp/feeds");
        let mut run = run_context(FeedType::Product);
        assert_eq!(
            storage.file_path(&run, "json"),
            PathBuf::from("/tmp/feeds/feed42p.json")
        );

        run.feed_type = FeedType::Inventory;
        assert_eq!(
            storage.file_path(&run, "sha256"),
            PathBuf::from("/tmp/feeds/feed42i.sha256")
        );

        run.feed_file_name = Some("hot_stuff.csv".to_string());
        assert_eq!(
            storage.file_path(&run, "json"),
            PathBuf::from("/tmp/feeds/hot_stuff.json")
        );
    }

    #[test]
    fn test_save_feed_writes_document_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let run = run_context(FeedType::Product);

        let group = ProductRecord {
            is_group: true,
            product: "Sauce Set".to_string(),
            child_products: vec![record("A", 1.0), record("B", 2.0)],
            ..ProductRecord::default()
        };
        storage
            .save_feed(&run, &[group, record("C", 3.0)])
            .unwrap();

        let json = std::fs::read_to_string(dir.path().join("feed42p.json")).unwrap();
        let document: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(document["supplier_id"], 42);
        assert_eq!(document["feed_type"], "product");
        assert_eq!(document["feed_source"], "site");
        assert_eq!(document["products_in_feed"], 3);
        assert_eq!(document["products"].as_array().unwrap().len(), 2);
        assert_eq!(document["defaults"]["discount_table"], "2,3,4,6,8,12");
        assert_eq!(document["dont_update_fields"][0], "images");
        assert_eq!(document["create_date"].as_str().unwrap().len(), 19);

        let checksum = std::fs::read_to_string(dir.path().join("feed42p.sha256")).unwrap();
        assert_eq!(checksum, hex::encode(Sha256::digest(json.as_bytes())));
        let md5 = std::fs::read_to_string(dir.path().join("feed42p.md5")).unwrap();
        assert_eq!(md5, format!("{:x}", md5::compute(json.as_bytes())));
        assert_eq!(md5.len(), 32);
    }

    #[test]
    fn test_inventory_document_has_no_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let run = run_context(FeedType::Inventory);
        storage.save_feed(&run, &[record("A", 1.0)]).unwrap();

        let json = std::fs::read_to_string(dir.path().join("feed42i.json")).unwrap();
        let document: Value = serde_json::from_str(&json).unwrap();
        assert!(document.get("defaults").is_none());
        assert!(document.get("dont_update_fields").is_none());
        assert!(document["products"][0].get("fulldescr").is_none());
    }

    #[test]
    fn test_empty_record_set_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("out"));
        storage
            .save_feed(&run_context(FeedType::Product), &[])
            .unwrap();
        assert!(!dir.path().join("out").exists());
    }
}
