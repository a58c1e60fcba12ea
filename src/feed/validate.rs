//! Feed QA pass
//!
//! Checks every record (group children first, then the group) against the
//! importer's expectations and collects failures per rule category. The
//! report is written next to the logs so a developer can fix the adapter.

use crate::feed::item::{ProductRecord, DEFAULT_PRODUCT_NAME};
use crate::feed::text::{description_blocks, find_money, strip_tags};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

static NUMERIC_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+|\.\d+|\d+)").unwrap());

const MAX_CATEGORIES: usize = 5;
const MAX_ATTRIBUTE_LEN: usize = 500;

/// Failures grouped by rule category, in the order they were first seen
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationReport {
    fails: IndexMap<&'static str, Vec<String>>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.fails.is_empty()
    }

    pub fn failures(&self) -> &IndexMap<&'static str, Vec<String>> {
        &self.fails
    }

    /// Failure lines of one category
    pub fn category(&self, name: &str) -> &[String] {
        self.fails.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn failure_count(&self) -> usize {
        self.fails.values().map(Vec::len).sum()
    }

    /// Text of the error log: a header per category followed by its lines
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for (category, fails) in &self.fails {
            lines.push(format!("\nFail validate {} {} in products:", fails.len(), category));
            lines.extend(fails.iter().cloned());
        }
        lines.join("\n")
    }

    /// Writes the report on failure, removes a stale one on success
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        if self.passed() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            tracing::info!("Validate complete");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        tracing::warn!(
            "Validate fail: {} problems. Check {} for more information",
            self.failure_count(),
            path.display()
        );
        Ok(())
    }
}

/// `<log_dir>/<prefix without trailing dashes>_error.log`
pub fn error_log_path(log_dir: &Path, prefix: &str) -> PathBuf {
    log_dir.join(format!("{}_error.log", prefix.trim_end_matches('-')))
}

/// Runs the QA rules over a record set
#[derive(Debug, Default)]
pub struct FeedValidator {
    report: ValidationReport,
    current_mpn: String,
}

impl FeedValidator {
    /// Validates every record; group children come before their group
    pub fn run(records: &[ProductRecord]) -> ValidationReport {
        let mut validator = Self::default();
        for record in records {
            if record.is_group {
                for child in &record.child_products {
                    validator.validate_record(child);
                }
            }
            validator.validate_record(record);
        }
        validator.report
    }

    fn fail(&mut self, category: &'static str, message: impl AsRef<str>) {
        let who = if self.current_mpn.is_empty() {
            String::new()
        } else {
            format!("mpn product: {}", self.current_mpn)
        };
        self.report
            .fails
            .entry(category)
            .or_default()
            .push(format!("{} - {}", who, message.as_ref()));
    }

    fn validate_record(&mut self, record: &ProductRecord) {
        self.current_mpn = record.mpn.clone();
        let group = record.is_group;

        self.product_name(&record.product, group);
        if !group && record.cost_to_us <= 0.0 {
            self.fail("cost_to_us", "Cost to us cannot be less than or equal to zero");
        }
        if !group && record.list_price.map_or(false, |price| price <= 0.0) {
            self.fail("list_price", "List price cannot be less than or equal to zero");
        }
        self.categories(&record.supplier_categories);
        self.short_description(record.descr.as_deref());
        self.description(&record.fulldescr);
        self.images(&record.images, group);
        if record.r_avail.is_none() {
            self.fail("avail", "Avail is null");
        }
        if !group && record.mpn.is_empty() {
            self.fail("mpn", "Mpn must not be empty");
        }
        self.attributes(record.attributes.as_ref());
        self.product_files(&record.product_files);
        self.videos(&record.videos);
        self.options(&record.options);

        if group && record.child_products.is_empty() {
            self.fail("child_products", "The group product does not have any children");
        }
    }

    fn product_name(&mut self, name: &str, group: bool) {
        if group {
            if name == DEFAULT_PRODUCT_NAME {
                self.fail("product_name", "Group product name is \"Dummy\"");
            }
        } else if name.is_empty() || name == DEFAULT_PRODUCT_NAME {
            self.fail("product_name", "Empty product name or product name is \"Dummy\"");
        } else if let Some(money) = find_money(name) {
            self.fail("product_name", format!("Product name contains {}", money));
        } else if strip_tags(name) != name {
            self.fail("product_name", "Product name contains html tags");
        }
    }

    fn categories(&mut self, categories: &[String]) {
        if categories.iter().any(|c| c.is_empty() || c == "0") {
            self.fail("categories", "The category array contains empty values");
        }
        if categories.len() > MAX_CATEGORIES {
            self.fail("categories", "The number of categories can not be more than 5");
        }
    }

    fn short_description(&mut self, descr: Option<&str>) {
        let Some(descr) = descr else {
            return;
        };
        if let Some(money) = find_money(descr) {
            self.fail("short_desc", format!("The product short description contains {}", money));
        }
        if descr.matches("<ul>").count() > 1 {
            self.fail("short_desc", "The product short description contains extra html tags");
        }
    }

    fn description(&mut self, fulldescr: &str) {
        let blocks = description_blocks(fulldescr);
        if blocks.attributes.is_some() {
            self.fail("description", "The product description contains a set of specifications");
        }
        if !blocks.short_description.is_empty() {
            self.fail("description", "The product description contains a set of features");
        }
        if let Some(money) = find_money(&blocks.description) {
            self.fail("description", format!("The product description contains {}", money));
        }
        if blocks.description == DEFAULT_PRODUCT_NAME {
            self.fail("description", "Product description is \"Dummy\"");
        }
    }

    fn images(&mut self, images: &[String], group: bool) {
        if !group && images.is_empty() {
            self.fail("images", "The product has no images");
            return;
        }
        if images.iter().any(|image| image.is_empty() || image == "0") {
            self.fail("images", "The image array contains empty values");
            return;
        }

        let unique: HashSet<&String> = images.iter().collect();
        if unique.len() != images.len() {
            self.fail("images", "The product contains duplicate images");
        }

        for image in images {
            let after_http: String = image.chars().skip(5).collect();
            let after_https: String = image.chars().skip(6).collect();

            if !image.contains("http:/") && !image.contains("https:/") {
                self.fail("images", "The image link address must contain the http or https protocol");
            } else if image.contains("youtube") || image.contains("vimeo") {
                self.fail("images", "The image link address points to the video file");
            } else if image == "http://" || image == "https://" {
                self.fail("images", "The image link address contain only http or https protocol");
            } else if after_http.contains("http:/") || after_https.contains("https:/") {
                self.fail("images", "The image link address contain many http or https protocols");
            }
        }
    }

    fn attributes(&mut self, attributes: Option<&IndexMap<String, Value>>) {
        let Some(attributes) = attributes else {
            return;
        };
        if attributes.is_empty() {
            self.fail("attributes", "The attribute array must not be empty");
            return;
        }

        if attributes.values().any(is_blank_text) {
            self.fail("attributes", "The attribute array contains empty values");
            return;
        }

        for (key, value) in attributes {
            if value.is_array() || value.is_object() {
                self.fail("attributes", "The attribute value must not be an array");
            }
            if value.is_null() {
                self.fail("attributes", "The attribute value must not be an null");
            }
            let text = scalar_text(value);
            if let Some(money) = find_money(&text) {
                self.fail("attributes", format!("The attribute value contains {}", money));
            }
            if key.trim().is_empty() {
                self.fail("attributes", "The length of the attribute key is zero");
            }
            if text.trim().is_empty() || text.chars().count() > MAX_ATTRIBUTE_LEN {
                self.fail(
                    "attributes",
                    "The length of the attribute value is zero or exceeds 500 characters",
                );
            }
        }
    }

    fn product_files(&mut self, files: &[Value]) {
        for file in files {
            let valid = match file.as_object() {
                Some(map) => map.len() == 2 && map.contains_key("name") && map.contains_key("link"),
                None => false,
            };
            if !valid {
                self.fail("product_files", "The file array has an invalid format");
            }
        }
    }

    fn videos(&mut self, videos: &[Value]) {
        for video in videos {
            let map = video.as_object();
            if map.map_or(true, |m| m.len() != 3) {
                self.fail("videos", "The video array has an invalid format");
            }
            let has_keys = map.map_or(false, |m| {
                ["name", "video", "provider"].iter().all(|key| m.contains_key(*key))
            });
            if !has_keys {
                self.fail("videos", "The video array has an invalid format");
            }
        }
    }

    fn options(&mut self, options: &IndexMap<String, Value>) {
        if options.is_empty() {
            return;
        }
        if options.values().any(is_falsy) {
            self.fail("options", "The options array contains empty values");
            return;
        }

        for (name, values) in options {
            let numeric = NUMERIC_NAME
                .find(name)
                .map_or(false, |m| m.as_str() == name.trim());
            if numeric {
                self.fail("options", "The options name has a numeric format");
            }
            let trimmed = name.trim();
            if trimmed.is_empty()
                || trimmed == "0"
                || name.contains(':')
                || name.to_lowercase().contains("required")
            {
                self.fail(
                    "options",
                    "The option name contains an empty value or forbidden characters",
                );
            }

            let empty_value = match values {
                Value::Array(items) => items.iter().any(is_falsy),
                other => {
                    let text = scalar_text(other);
                    let text = text.trim();
                    text.is_empty() || text == "0"
                }
            };
            if empty_value {
                self.fail("options", "Option value is empty");
            }
        }
    }
}

/// Loose falsiness: null, false, zero, `""`, `"0"`, empty list or map
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn is_blank_text(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(_) | Value::Object(_) => false,
        other => scalar_text(other).trim().is_empty(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean_record(mpn: &str) -> ProductRecord {
        let mut record = ProductRecord {
            mpn: mpn.to_string(),
            productcode: format!("HSD-{}", mpn),
            product: "Ghost Pepper Sauce".to_string(),
            fulldescr: "<p>Smoky and hot.</p>".to_string(),
            cost_to_us: 9.5,
            list_price: Some(12.0),
            r_avail: Some(4),
            images: vec!["https://e.com/a.jpg".to_string()],
            supplier_categories: vec!["Sauces".to_string()],
            ..ProductRecord::default()
        };
        record.refresh_hash();
        record
    }

    #[test]
    fn test_clean_record_passes() {
        let report = FeedValidator::run(&[clean_record("GP-1")]);
        assert!(report.passed());
        assert_eq!(report.render(), "");
    }

    #[test]
    fn test_failures_in_six_categories() {
        let mut record = clean_record("GP-2");
        record.product = "Sauce $5.99".to_string();
        record.cost_to_us = 0.0;
        record.list_price = Some(-1.0);
        record.images.clear();
        record.r_avail = None;
        record.supplier_categories = (1..=6).map(|i| format!("Cat {}", i)).collect();

        let report = FeedValidator::run(&[record]);
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 6);
        assert_eq!(
            report.category("product_name"),
            ["mpn product: GP-2 - Product name contains $5.99"]
        );
        assert_eq!(
            report.category("images"),
            ["mpn product: GP-2 - The product has no images"]
        );
        assert_eq!(
            report.category("categories"),
            ["mpn product: GP-2 - The number of categories can not be more than 5"]
        );
        assert_eq!(report.category("avail").len(), 1);
        assert_eq!(report.category("cost_to_us").len(), 1);
        assert_eq!(report.category("list_price").len(), 1);
    }

    #[test]
    fn test_empty_mpn_has_no_prefix() {
        let record = clean_record("");
        let report = FeedValidator::run(&[record]);
        assert_eq!(report.category("mpn"), [" - Mpn must not be empty"]);
    }

    #[test]
    fn test_render_format() {
        let mut record = clean_record("GP-3");
        record.r_avail = None;
        let report = FeedValidator::run(&[record]);
        assert_eq!(
            report.render(),
            "\nFail validate 1 avail in products:\nmpn product: GP-3 - Avail is null"
        );
    }

    #[test]
    fn test_group_rules() {
        let group = ProductRecord {
            is_group: true,
            product: "Dummy".to_string(),
            r_avail: Some(0),
            ..ProductRecord::default()
        };
        let report = FeedValidator::run(&[group]);
        assert_eq!(report.category("product_name"), [" - Group product name is \"Dummy\""]);
        assert_eq!(
            report.category("child_products"),
            [" - The group product does not have any children"]
        );
        assert!(report.category("images").is_empty());
        assert!(report.category("mpn").is_empty());
        assert!(report.category("cost_to_us").is_empty());
    }

    #[test]
    fn test_group_children_validated_first() {
        let mut child = clean_record("C-1");
        child.r_avail = None;
        let group = ProductRecord {
            is_group: true,
            product: "Sauce Set".to_string(),
            r_avail: None,
            child_products: vec![child],
            ..ProductRecord::default()
        };
        let report = FeedValidator::run(&[group]);
        assert_eq!(
            report.category("avail"),
            ["mpn product: C-1 - Avail is null", " - Avail is null"]
        );
    }

    #[test]
    fn test_image_rules() {
        let mut record = clean_record("GP-4");
        record.images = vec![
            "e.com/a.jpg".to_string(),
            "https://youtube.com/v/1".to_string(),
            "https://".to_string(),
            "https://e.com/https://e.com/b.jpg".to_string(),
            "https://e.com/ok.jpg".to_string(),
            "https://e.com/ok.jpg".to_string(),
        ];
        let report = FeedValidator::run(&[record]);
        let messages: Vec<&str> = report
            .category("images")
            .iter()
            .map(|line| line.trim_start_matches("mpn product: GP-4 - "))
            .collect();
        assert_eq!(
            messages,
            vec![
                "The product contains duplicate images",
                "The image link address must contain the http or https protocol",
                "The image link address points to the video file",
                "The image link address contain only http or https protocol",
                "The image link address contain many http or https protocols",
            ]
        );
    }

    #[test]
    fn test_description_rules() {
        let mut record = clean_record("GP-5");
        record.fulldescr =
            "<p>Only $4.99!</p><p>Features</p><ul><li>Vegan</li><li>Heat: 10</li></ul>".to_string();
        let report = FeedValidator::run(&[record]);
        let lines = report.category("description");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("contains a set of specifications"));
        assert!(lines[1].ends_with("contains a set of features"));
        assert!(lines[2].ends_with("contains $4.99"));
    }

    #[test]
    fn test_short_description_rules() {
        let mut record = clean_record("GP-6");
        record.descr = Some("<ul><li>a</li></ul><ul><li>b $3</li></ul>".to_string());
        let report = FeedValidator::run(&[record]);
        assert_eq!(report.category("short_desc").len(), 2);
    }

    #[test]
    fn test_attribute_rules() {
        let mut record = clean_record("GP-7");
        let mut attributes = IndexMap::new();
        attributes.insert("Heat".to_string(), json!("Extreme"));
        attributes.insert("Sizes".to_string(), json!(["5oz", "10oz"]));
        attributes.insert("Price".to_string(), json!("$3"));
        attributes.insert("Note".to_string(), json!("x".repeat(501)));
        record.attributes = Some(attributes);

        let report = FeedValidator::run(&[record]);
        let lines = report.category("attributes");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("must not be an array"));
        assert!(lines[1].ends_with("contains $3"));
        assert!(lines[2].ends_with("exceeds 500 characters"));

        let mut record = clean_record("GP-8");
        record.attributes = Some(IndexMap::new());
        let report = FeedValidator::run(&[record]);
        assert_eq!(report.category("attributes").len(), 1);

        let mut record = clean_record("GP-9");
        let mut attributes = IndexMap::new();
        attributes.insert("Heat".to_string(), json!(" "));
        attributes.insert("Origin".to_string(), Value::Null);
        record.attributes = Some(attributes);
        let report = FeedValidator::run(&[record]);
        assert_eq!(
            report.category("attributes"),
            ["mpn product: GP-9 - The attribute array contains empty values"]
        );
    }

    #[test]
    fn test_files_videos_options() {
        let mut record = clean_record("GP-10");
        record.product_files = vec![
            json!({"name": "Manual", "link": "https://e.com/m.pdf"}),
            json!({"name": "Manual"}),
            json!("https://e.com/x.pdf"),
        ];
        record.videos = vec![
            json!({"name": "Demo", "video": "https://youtu.be/x", "provider": "youtube"}),
            json!({"name": "Demo", "video": "https://youtu.be/x"}),
        ];
        record.options.insert("42".to_string(), json!("Red"));
        record.options.insert("Size:".to_string(), json!(["5oz", ""]));

        let report = FeedValidator::run(&[record]);
        assert_eq!(report.category("product_files").len(), 2);
        assert_eq!(report.category("videos").len(), 2);
        let options: Vec<&str> = report
            .category("options")
            .iter()
            .map(|line| line.trim_start_matches("mpn product: GP-10 - "))
            .collect();
        assert_eq!(
            options,
            vec![
                "The options name has a numeric format",
                "The option name contains an empty value or forbidden characters",
                "Option value is empty",
            ]
        );

        let mut record = clean_record("GP-11");
        record.options.insert("Color".to_string(), json!(""));
        let report = FeedValidator::run(&[record]);
        assert_eq!(
            report.category("options"),
            ["mpn product: GP-11 - The options array contains empty values"]
        );
    }

    #[test]
    fn test_persist_writes_and_removes_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = error_log_path(dir.path(), "HSD-");
        assert!(path.ends_with("HSD_error.log"));

        let mut record = clean_record("GP-12");
        record.r_avail = None;
        FeedValidator::run(&[record]).persist(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Avail is null"));

        FeedValidator::run(&[clean_record("GP-12")]).persist(&path).unwrap();
        assert!(!path.exists());
    }
}
