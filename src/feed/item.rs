//! Normalized product record
//!
//! Field names are the keys of the output feed. Records are built from a
//! [`ProductSource`] and are plain data afterwards: merge, validation and
//! storage read and adjust the public fields directly.

use crate::feed::source::{ParseContext, ParseError, ProductSource};
use crate::feed::text::{
    calculate_upc, clean_description, clean_short_description, cleaning, decode_entities,
    nl2br, normalize_float, remove_spaces, round2, ucfirst, ucwords,
};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Name given to products whose page has none
pub const DEFAULT_PRODUCT_NAME: &str = "Dummy";

/// One product of the feed, or a group with its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    pub productcode: String,
    #[serde(rename = "ASIN")]
    pub asin: Option<String>,
    pub product: String,
    pub cost_to_us: f64,
    pub list_price: Option<f64>,
    /// Feature bullets as a `<ul>` list
    pub descr: Option<String>,
    pub fulldescr: String,
    pub brand_name: Option<String>,
    /// Brand already present in the product name
    pub brand_normalized: bool,
    /// `Y` or `N`
    pub forsale: String,
    pub eta_date_mm_dd_yyyy: Option<String>,
    pub upc: Option<String>,
    pub supplier_categories: Vec<String>,
    pub supplier_internal_id: String,
    pub hash_product: String,
    pub images: Vec<String>,
    pub alt_names: Vec<String>,
    pub dim_x: Option<f64>,
    pub dim_y: Option<f64>,
    pub dim_z: Option<f64>,
    pub shipping_weight: Option<f64>,
    pub shipping_dim_x: Option<f64>,
    pub shipping_dim_y: Option<f64>,
    pub shipping_dim_z: Option<f64>,
    pub weight: Option<f64>,
    pub min_amount: u32,
    pub mult_order_quantity: Option<String>,
    pub is_group: bool,
    pub child_products: Vec<ProductRecord>,
    /// Shared name part of a group's children
    pub group_mask: Option<String>,
    pub new_map_price: Option<f64>,
    pub r_avail: Option<i64>,
    pub mpn: String,
    pub lead_time_message: Option<String>,
    pub attributes: Option<IndexMap<String, Value>>,
    pub product_files: Vec<Value>,
    pub options: IndexMap<String, Value>,
    pub videos: Vec<Value>,
}

impl Default for ProductRecord {
    fn default() -> Self {
        Self {
            productcode: String::new(),
            asin: None,
            product: String::new(),
            cost_to_us: 0.0,
            list_price: None,
            descr: None,
            fulldescr: String::new(),
            brand_name: None,
            brand_normalized: false,
            forsale: "Y".to_string(),
            eta_date_mm_dd_yyyy: None,
            upc: None,
            supplier_categories: Vec::new(),
            supplier_internal_id: String::new(),
            hash_product: String::new(),
            images: Vec::new(),
            alt_names: Vec::new(),
            dim_x: None,
            dim_y: None,
            dim_z: None,
            shipping_weight: None,
            shipping_dim_x: None,
            shipping_dim_y: None,
            shipping_dim_z: None,
            weight: None,
            min_amount: 1,
            mult_order_quantity: None,
            is_group: false,
            child_products: Vec::new(),
            group_mask: None,
            new_map_price: None,
            r_avail: None,
            mpn: String::new(),
            lead_time_message: None,
            attributes: None,
            product_files: Vec::new(),
            options: IndexMap::new(),
            videos: Vec::new(),
        }
    }
}

impl ProductRecord {
    /// Builds a normalized record from a parsed product page
    ///
    /// # Arguments
    ///
    /// * `source` - Field accessors of the page
    /// * `ctx` - Page URL, code prefix and supplier name
    ///
    /// # Returns
    ///
    /// The finished record with its content hash, or the error that stopped
    /// the page from being read.
    pub fn from_source(source: &dyn ProductSource, ctx: &ParseContext) -> Result<Self, ParseError> {
        source.before_parse()?;

        let mut record = Self {
            mpn: source.mpn(),
            asin: source.asin(),
            ..Self::default()
        };

        let code = source.product_code().unwrap_or_else(|| {
            if record.mpn.is_empty() {
                String::new()
            } else {
                format!("{}{}", ctx.prefix, record.mpn)
            }
        });
        record.set_product_code(&code);

        let name = source.product();
        record.set_product(if name.trim().is_empty() {
            DEFAULT_PRODUCT_NAME
        } else {
            name.as_str()
        });
        record.set_fulldescr(&source.description());
        record.set_short_description(&source.short_description());
        record.set_brand(source.brand().as_deref());
        record.set_list_price(source.list_price());
        record.cost_to_us = round2(source.cost());
        record.set_new_map_price(source.min_price());
        if let Some(upc) = source.upc() {
            record.upc = Some(calculate_upc(upc.trim()));
        }
        record.set_images(source.images());
        record.alt_names = source.alt_names();
        record.min_amount = source.min_amount().unwrap_or(1);
        record.set_categories(&source.categories());
        record.supplier_internal_id = source.internal_id().unwrap_or_else(|| ctx.url.clone());
        record.brand_normalized = source.brand_normalized();

        record.weight = normalize_float(source.weight(), None);
        record.shipping_weight = normalize_float(source.shipping_weight(), None);
        record.dim_x = normalize_float(source.dim_x(), None);
        record.dim_y = normalize_float(source.dim_y(), None);
        record.dim_z = normalize_float(source.dim_z(), None);
        record.shipping_dim_x = normalize_float(source.shipping_dim_x(), None);
        record.shipping_dim_y = normalize_float(source.shipping_dim_y(), None);
        record.shipping_dim_z = normalize_float(source.shipping_dim_z(), None);

        record.set_eta_date(source.eta_date());
        record.lead_time_message = source.lead_time_message();
        record.set_attributes(source.attributes());
        record.options = source.options();
        record.videos = source.videos();
        record.product_files = source.product_files();

        if source.is_group() {
            let children = source.child_products(&record, ctx)?;

            record.mpn.clear();
            record.is_group = true;
            record.list_price = None;
            record.cost_to_us = 0.0;
            record.new_map_price = None;
            record.r_avail = Some(0);
            record.forsale = "Y".to_string();
            record.images.clear();

            record.child_products = record.adopt_children(children, ctx);
        } else {
            record.is_group = false;
            record.r_avail = source.avail();
            record.forsale = source.forsale();
            record.child_products.clear();
        }

        record.mult_order_quantity = Some(mult_order_flag(record.min_amount));
        record.refresh_hash();

        source.after_parse(&mut record);
        Ok(record)
    }

    /// Deduplicates children by mpn (first wins) and fills inherited fields
    fn adopt_children(&self, children: Vec<ProductRecord>, ctx: &ParseContext) -> Vec<ProductRecord> {
        let mut seen = HashSet::new();
        let mut adopted = Vec::with_capacity(children.len());

        for mut child in children {
            if !seen.insert(child.mpn.clone()) {
                continue;
            }
            if child.group_mask.is_none() {
                child.group_mask = Some(self.product.clone());
            }
            child.mult_order_quantity = Some(mult_order_flag(child.min_amount));
            if child.brand_name.as_deref().map_or(true, str::is_empty) {
                child.brand_name = Some(ctx.supplier_name.clone());
            }
            child.productcode = format!("{}{}", ctx.prefix, child.mpn).to_uppercase();
            if child.supplier_internal_id.is_empty() {
                child.supplier_internal_id = self.supplier_internal_id.clone();
            }
            child.refresh_hash();
            adopted.push(child);
        }
        adopted
    }

    /// Name with junk removed, lower-cased then word-capitalised
    pub fn set_product(&mut self, name: &str) {
        let cleaned = cleaning(name, &[], true);
        self.product = ucwords(&cleaned.trim().to_lowercase());
    }

    /// Upper-cased code with inner spaces turned into dashes
    pub fn set_product_code(&mut self, code: &str) {
        self.productcode = remove_spaces(code.trim()).replace(' ', "-").to_uppercase();
    }

    pub fn set_fulldescr(&mut self, description: &str) {
        self.fulldescr = nl2br(&clean_description(description));
    }

    /// Wraps cleaned bullets in a list; leaves `descr` untouched when none remain
    pub fn set_short_description(&mut self, items: &[String]) {
        let items = clean_short_description(items);
        if !items.is_empty() {
            self.descr = Some(format!(
                "<ul><li>{}</li></ul>",
                decode_entities(&items.join("</li><li>"))
            ));
        }
    }

    pub fn set_brand(&mut self, brand: Option<&str>) {
        self.brand_name = Some(ucwords(&brand.unwrap_or("").trim().to_lowercase()));
    }

    /// Zero or missing list price means none
    pub fn set_list_price(&mut self, price: Option<f64>) {
        self.list_price = price.filter(|p| *p != 0.0).map(round2);
    }

    pub fn set_new_map_price(&mut self, price: Option<f64>) {
        self.new_map_price = price.filter(|p| *p != 0.0).map(round2);
    }

    /// Keeps the first occurrence of every image URL
    pub fn set_images(&mut self, images: Vec<String>) {
        let mut seen = HashSet::new();
        self.images = images
            .into_iter()
            .filter(|image| seen.insert(image.clone()))
            .collect();
    }

    pub fn set_categories(&mut self, categories: &[String]) {
        self.supplier_categories = categories
            .iter()
            .map(|category| ucfirst(&category.to_lowercase()))
            .collect();
    }

    pub fn set_eta_date(&mut self, eta: Option<NaiveDate>) {
        if let Some(eta) = eta {
            self.eta_date_mm_dd_yyyy = Some(eta.format("%m/%d/%Y").to_string());
        }
    }

    /// Decodes entities in string values and normalizes keys
    /// (`heat_level` becomes `Heat level`)
    pub fn set_attributes(&mut self, attributes: Option<IndexMap<String, Value>>) {
        self.attributes = attributes.map(|attributes| {
            if attributes.is_empty() {
                return attributes;
            }
            attributes
                .into_iter()
                .map(|(key, value)| {
                    let key = ucfirst(&key.replace('_', " ").to_lowercase());
                    let value = match value {
                        Value::String(s) => Value::String(decode_entities(&s)),
                        other => other,
                    };
                    (key, value)
                })
                .collect()
        });
    }

    /// Hex digest of every field except `images` and the hash itself
    ///
    /// Object keys are serialised in sorted order, so the digest does not
    /// depend on field declaration order.
    pub fn content_hash(&self) -> String {
        let mut value = match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize {} for hashing: {}", self.productcode, e);
                return String::new();
            }
        };
        if let Value::Object(map) = &mut value {
            map.remove("images");
            map.remove("hash_product");
        }
        let canonical = sorted(value).to_string();
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }

    pub fn refresh_hash(&mut self) {
        self.hash_product = self.content_hash();
    }

    /// Number of feed products this record stands for: a group counts its children
    pub fn product_count(&self) -> usize {
        if self.is_group {
            self.child_products.len()
        } else {
            1
        }
    }
}

fn mult_order_flag(min_amount: u32) -> String {
    let flag = if min_amount > 1 { "Y" } else { "N" };
    flag.to_string()
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key, sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
